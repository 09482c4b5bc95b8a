use actix_web::{HttpResponse, web};
use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{payment::PaymentStatus, salary::SalaryStatus},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentMonthSummary {
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub month: NaiveDate,
    pub tasks_created: i64,
    #[schema(value_type = String)]
    pub task_amount: Decimal,
    #[schema(value_type = String)]
    pub payments_completed: Decimal,
    #[schema(value_type = String)]
    pub salaries_paid: Decimal,
    #[schema(value_type = String)]
    pub expenses: Decimal,
    /// Payments, salaries and expenses together
    #[schema(value_type = String)]
    pub total_outflow: Decimal,
}

/// `[first instant of this month, first instant of next month)` in UTC.
pub fn month_window(now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    let start = Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0)?);
    let end = Utc.from_utc_datetime(&next.and_hms_opt(0, 0, 0)?);
    Some((start, end))
}

async fn sum_between<'a>(
    pool: &MySqlPool,
    sql: &'a str,
    status: Option<&'a str>,
    (start, end): (DateTime<Utc>, DateTime<Utc>),
) -> Result<Decimal, sqlx::Error> {
    let mut query = sqlx::query_scalar::<_, Decimal>(sql);
    if let Some(status) = status {
        query = query.bind(status);
    }
    query.bind(start).bind(end).fetch_one(pool).await
}

#[utoipa::path(
    get,
    path = "/api/dashboard/current-month",
    responses(
        (status = 200, body = CurrentMonthSummary),
        (status = 403, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn current_month(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let window = month_window(Utc::now())
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("current month out of range")))?;
    let pool = pool.get_ref();

    debug!(start = %window.0, end = %window.1, "Summarising current month");

    let (tasks_created, task_amount) = sqlx::query_as::<_, (i64, Decimal)>(
        r#"
        SELECT COUNT(*), COALESCE(SUM(amount), 0)
        FROM tasks
        WHERE is_deleted = 0 AND created_at >= ? AND created_at < ?
        "#,
    )
    .bind(window.0)
    .bind(window.1)
    .fetch_one(pool)
    .await?;

    let payments_completed = sum_between(
        pool,
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE status = ? AND created_at >= ? AND created_at < ?",
        Some(PaymentStatus::Completed.as_ref()),
        window,
    )
    .await?;

    // Salaries count toward the month they cover, not the day they were entered.
    let salaries_paid = sum_between(
        pool,
        "SELECT COALESCE(SUM(amount), 0) FROM salaries WHERE status = ? AND month >= DATE(?) AND month < DATE(?)",
        Some(SalaryStatus::Paid.as_ref()),
        window,
    )
    .await?;

    let expenses = sum_between(
        pool,
        "SELECT COALESCE(SUM(amount), 0) FROM expenses WHERE created_at >= ? AND created_at < ?",
        None,
        window,
    )
    .await?;

    Ok(HttpResponse::Ok().json(CurrentMonthSummary {
        month: window.0.date_naive(),
        tasks_created,
        task_amount,
        payments_completed,
        salaries_paid,
        expenses,
        total_outflow: payments_completed + salaries_paid + expenses,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_month_window_mid_month() {
        let (start, end) = month_window(at("2026-10-15T09:30:00Z")).unwrap();
        assert_eq!(start, at("2026-10-01T00:00:00Z"));
        assert_eq!(end, at("2026-11-01T00:00:00Z"));
    }

    #[test]
    fn test_month_window_rolls_over_year() {
        let (start, end) = month_window(at("2026-12-31T23:59:59Z")).unwrap();
        assert_eq!(start, at("2026-12-01T00:00:00Z"));
        assert_eq!(end, at("2027-01-01T00:00:00Z"));
    }
}
