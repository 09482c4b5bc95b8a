//! Payments against tasks.
//!
//! The completed payments of a task never add up to more than the task's
//! amount. Every write that could break that runs in one transaction that
//! first locks the task row, so two concurrent payments for the same task
//! are checked one after the other and the second sees the first.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{Executor, FromRow, MySql, MySqlPool};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    api::tasks::{LockedTask, lock_task},
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{
        payment::{PAYMENT_COLUMNS, Payment, PaymentStatus, PaymentType},
        user::UserStatus,
    },
    utils::{
        db_utils::{SqlValue, UpdateBuilder, execute_update, nullable},
        invalidation::{MutationResponse, PAYMENT_CHANGED},
        listing::{ListQuery, ListSource, ListSql, Paginated, SqlFilter, fetch_page},
        validation::Validator,
    },
};

const PAYMENT_FROM: &str =
    "payments p JOIN tasks t ON t.id = p.task_id JOIN users u ON u.id = p.user_id";

const PAYMENT_SOURCE: ListSource = ListSource {
    columns: PAYMENT_COLUMNS,
    from: PAYMENT_FROM,
    created_at: "p.created_at",
    id: "p.id",
};

#[derive(Deserialize, ToSchema)]
pub struct CreatePayment {
    #[schema(example = 1)]
    pub task_id: u64,
    /// Defaults to the task's assignee
    #[schema(example = 7)]
    pub user_id: Option<u64>,
    #[schema(example = "200.00", value_type = String)]
    pub amount: Decimal,
    pub payment_type: PaymentType,
    /// Defaults to PENDING
    pub status: Option<PaymentStatus>,
    #[schema(example = "TRX-88231")]
    pub reference: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePayment {
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    pub payment_type: Option<PaymentType>,
    pub status: Option<PaymentStatus>,
    /// `null` clears it
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub reference: Option<Option<String>>,
}

#[derive(Debug, FromRow)]
struct LockedPayment {
    amount: Decimal,
    status: String,
}

pub fn remaining_balance(task_amount: Decimal, completed: Decimal) -> Decimal {
    (task_amount - completed).max(Decimal::ZERO)
}

/// Returns what would be left on the task after `amount` is paid.
pub fn ensure_within_balance(
    task_amount: Decimal,
    completed: Decimal,
    amount: Decimal,
) -> AppResult<Decimal> {
    let remaining = remaining_balance(task_amount, completed);
    if amount > remaining {
        return Err(AppError::Overpayment { remaining });
    }
    Ok(remaining - amount)
}

/// Checks an edited payment against its task. Only a payment that ends up
/// COMPLETED counts toward the balance; `completed_others` leaves the payment
/// itself out so its previous amount is not counted twice.
pub fn ensure_update_fits(
    task_amount: Decimal,
    completed_others: Decimal,
    current_amount: Decimal,
    current_status: PaymentStatus,
    body: &UpdatePayment,
) -> AppResult<()> {
    let amount = body.amount.unwrap_or(current_amount);
    if body.status.unwrap_or(current_status) != PaymentStatus::Completed {
        return Ok(());
    }
    ensure_within_balance(task_amount, completed_others, amount).map(|_| ())
}

/// Deleted and missing tasks both lock as `None`.
pub fn payable_task(task: Option<LockedTask>) -> AppResult<LockedTask> {
    task.ok_or_else(|| AppError::invalid("task_id", "Task does not exist"))
}

pub fn payee_for(requested: Option<u64>, assignee: Option<u64>) -> AppResult<u64> {
    requested
        .or(assignee)
        .ok_or_else(|| AppError::invalid("user_id", "Task has no assignee, user_id is required"))
}

/// Sum of COMPLETED payments for a task, optionally leaving one payment out.
pub async fn completed_total<'c, E>(
    executor: E,
    task_id: u64,
    excluding: Option<u64>,
) -> Result<Decimal, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM payments
        WHERE task_id = ? AND status = ? AND id <> ?
        "#,
    )
    .bind(task_id)
    .bind(PaymentStatus::Completed.as_ref())
    .bind(excluding.unwrap_or(0))
    .fetch_one(executor)
    .await
}

pub fn payment_filter(query: &ListQuery, user: Option<u64>) -> AppResult<SqlFilter> {
    let status = query.status_filter::<PaymentStatus>()?;

    Ok(SqlFilter::new()
        .eq_opt("p.user_id", user)
        .eq_opt("p.status", status.map(|s| s.to_string()))
        .search(&["t.title"], query.search_term())
        .created_since("p.created_at", query.bucket().lower_bound(Utc::now())))
}

pub async fn fetch_payments(
    pool: &MySqlPool,
    query: &ListQuery,
    user: Option<u64>,
) -> AppResult<Paginated<Payment>> {
    let filter = payment_filter(query, user)?;
    fetch_page(pool, ListSql::new(PAYMENT_SOURCE, filter, query.page())).await
}

async fn fetch_payment(pool: &MySqlPool, payment_id: u64) -> AppResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM {PAYMENT_FROM} WHERE p.id = ?"
    ))
    .bind(payment_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound)
}

#[utoipa::path(
    get,
    path = "/api/payments",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated payments, newest first", body = PaymentPage),
        (status = 400, description = "Unknown status")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_payments(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    let page = fetch_payments(pool.get_ref(), &query, auth.scope()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/payments/{payment_id}",
    params(("payment_id" = u64, Path, description = "Payment ID")),
    responses(
        (status = 200, body = Payment),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let payment = fetch_payment(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or_admin(payment.user_id)
        .map_err(|_| AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(payment))
}

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = CreatePayment,
    responses(
        (status = 201, description = "Payment recorded"),
        (status = 400, description = "Validation failed"),
        (status = 422, description = "Payment exceeds the remaining task balance")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePayment>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    Validator::new().amount("amount", payload.amount).finish()?;

    let mut tx = pool.begin().await?;

    let task = payable_task(lock_task(&mut tx, payload.task_id).await?)?;
    let user_id = payee_for(payload.user_id, task.assignee_id)?;

    let active = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ? AND status = ?")
        .bind(user_id)
        .bind(UserStatus::Active.as_ref())
        .fetch_one(&mut *tx)
        .await?;
    if active == 0 {
        return Err(AppError::invalid("user_id", "User does not exist or is inactive"));
    }

    let completed = completed_total(&mut *tx, task.id, None).await?;
    let left = match ensure_within_balance(task.amount, completed, payload.amount) {
        Ok(left) => left,
        Err(e) => {
            warn!(task_id = task.id, %completed, amount = %payload.amount, "Overpayment rejected");
            return Err(e);
        }
    };

    let status = payload.status.unwrap_or(PaymentStatus::Pending);

    let result = sqlx::query(
        r#"
        INSERT INTO payments (task_id, user_id, amount, payment_type, status, reference)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(task.id)
    .bind(user_id)
    .bind(payload.amount)
    .bind(payload.payment_type.as_ref())
    .bind(status.as_ref())
    .bind(payload.reference.as_deref())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let payment_id = result.last_insert_id();
    info!(payment_id, task_id = task.id, remaining = %left, "Payment recorded");

    let payment = fetch_payment(pool.get_ref(), payment_id).await?;
    Ok(HttpResponse::Created().json(MutationResponse::new(
        "Payment recorded",
        Some(payment),
        PAYMENT_CHANGED,
    )))
}

#[utoipa::path(
    put,
    path = "/api/payments/{payment_id}",
    params(("payment_id" = u64, Path, description = "Payment ID")),
    request_body = UpdatePayment,
    responses(
        (status = 200, description = "Payment updated"),
        (status = 404, description = "Access Denied"),
        (status = 422, description = "Payment exceeds the remaining task balance")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn update_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdatePayment>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let payment_id = path.into_inner();

    Validator::new().amount_opt("amount", body.amount).finish()?;

    let mut tx = pool.begin().await?;

    // Task first, then the payment: the same lock order as inserts.
    let task_id = sqlx::query_scalar::<_, u64>("SELECT task_id FROM payments WHERE id = ?")
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

    let task = lock_task(&mut tx, task_id).await?.ok_or(AppError::NotFound)?;

    let current = sqlx::query_as::<_, LockedPayment>(
        "SELECT amount, status FROM payments WHERE id = ? FOR UPDATE",
    )
    .bind(payment_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound)?;

    let current_status: PaymentStatus = current.status.parse().map_err(|_| {
        anyhow::anyhow!("payment {payment_id} has unknown status {:?}", current.status)
    })?;

    let completed_others = completed_total(&mut *tx, task_id, Some(payment_id)).await?;
    if let Err(e) = ensure_update_fits(
        task.amount,
        completed_others,
        current.amount,
        current_status,
        &body,
    ) {
        warn!(payment_id, task_id, %completed_others, "Payment update would overpay the task");
        return Err(e);
    }

    let update = UpdateBuilder::new("payments")
        .set_opt("amount", body.amount)
        .set_opt("payment_type", body.payment_type.map(|t| t.to_string()))
        .set_opt("status", body.status.map(|s| s.to_string()))
        .set_nullable("reference", body.reference.clone())
        .build("id = ?", vec![SqlValue::U64(payment_id)])?;

    execute_update(&mut *tx, update).await?;
    tx.commit().await?;

    info!(payment_id, task_id, "Payment updated");

    let payment = fetch_payment(pool.get_ref(), payment_id).await?;
    Ok(HttpResponse::Ok().json(MutationResponse::new(
        "Payment updated",
        Some(payment),
        PAYMENT_CHANGED,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/payments/{payment_id}",
    params(("payment_id" = u64, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment deleted"),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn delete_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let payment_id = path.into_inner();

    let result = sqlx::query("DELETE FROM payments WHERE id = ?")
        .bind(payment_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    info!(payment_id, admin_id = auth.user_id, "Payment deleted");

    Ok(HttpResponse::Ok().json(MutationResponse::<Payment>::new(
        "Payment deleted",
        None,
        PAYMENT_CHANGED,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn edit(body: serde_json::Value) -> UpdatePayment {
        serde_json::from_value(body).unwrap()
    }

    fn locked(assignee_id: Option<u64>) -> LockedTask {
        LockedTask {
            id: 1,
            amount: d(1000),
            status: "PENDING".into(),
            assignee_id,
            start_date: None,
            due_date: None,
        }
    }

    fn invalid_field(result: AppResult<impl std::fmt::Debug>) -> String {
        match result {
            Err(AppError::Validation(errors)) => errors[0].field.clone(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_overpayment_rejected_with_remaining_balance() {
        match ensure_within_balance(d(1000), d(800), d(300)) {
            Err(AppError::Overpayment { remaining }) => assert_eq!(remaining, d(200)),
            other => panic!("expected overpayment, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_remaining_payment_clears_balance() {
        let left = ensure_within_balance(d(1000), d(800), d(200)).unwrap();
        assert_eq!(left, Decimal::ZERO);
        assert_eq!(remaining_balance(d(1000), d(1000)), Decimal::ZERO);
    }

    #[test]
    fn test_fully_paid_task_accepts_nothing_more() {
        assert!(ensure_within_balance(d(500), d(500), Decimal::new(1, 2)).is_err());
    }

    #[test]
    fn test_remaining_never_negative() {
        assert_eq!(remaining_balance(d(100), d(150)), Decimal::ZERO);
    }

    #[test]
    fn test_cents_are_exact() {
        let amount = Decimal::new(100_00, 2);
        let completed = Decimal::new(33_33, 2) + Decimal::new(33_33, 2);
        let left = ensure_within_balance(amount, completed, Decimal::new(33_34, 2)).unwrap();
        assert_eq!(left, Decimal::ZERO);
    }

    #[test]
    fn test_failing_a_pending_payment_on_a_fully_paid_task() {
        let body = edit(serde_json::json!({ "status": "FAILED" }));
        assert!(ensure_update_fits(d(1000), d(1000), d(100), PaymentStatus::Pending, &body).is_ok());

        let body = edit(serde_json::json!({ "reference": "TRX-1" }));
        assert!(ensure_update_fits(d(1000), d(1000), d(100), PaymentStatus::Pending, &body).is_ok());
    }

    #[test]
    fn test_completing_a_payment_is_checked() {
        let body = edit(serde_json::json!({ "status": "COMPLETED" }));
        match ensure_update_fits(d(1000), d(800), d(300), PaymentStatus::Pending, &body) {
            Err(AppError::Overpayment { remaining }) => assert_eq!(remaining, d(200)),
            other => panic!("expected overpayment, got {other:?}"),
        }
        assert!(ensure_update_fits(d(1000), d(800), d(200), PaymentStatus::Pending, &body).is_ok());
    }

    #[test]
    fn test_completed_payment_excludes_its_own_amount() {
        // The only payment, already COMPLETED for the full amount.
        let body = edit(serde_json::json!({ "reference": "TRX-2" }));
        assert!(ensure_update_fits(d(1000), d(0), d(1000), PaymentStatus::Completed, &body).is_ok());

        let body = edit(serde_json::json!({ "amount": "1000.01" }));
        assert!(ensure_update_fits(d(1000), d(0), d(1000), PaymentStatus::Completed, &body).is_err());

        let body = edit(serde_json::json!({ "amount": "600" }));
        assert!(ensure_update_fits(d(1000), d(500), d(400), PaymentStatus::Completed, &body).is_err());
    }

    #[test]
    fn test_null_reference_clears_it() {
        let body = edit(serde_json::json!({ "reference": null }));
        assert_eq!(body.reference, Some(None));
        assert_eq!(edit(serde_json::json!({})).reference, None);
    }

    #[test]
    fn test_deleted_task_cannot_be_paid() {
        assert_eq!(invalid_field(payable_task(None)), "task_id");
        assert_eq!(payable_task(Some(locked(None))).unwrap().id, 1);
    }

    #[test]
    fn test_payee_defaults_to_assignee() {
        assert_eq!(payee_for(None, Some(7)).unwrap(), 7);
        assert_eq!(payee_for(Some(9), Some(7)).unwrap(), 9);
        assert_eq!(invalid_field(payee_for(None, None)), "user_id");
    }

    #[test]
    fn test_user_scope_filter() {
        let query = ListQuery {
            status: Some("COMPLETED".into()),
            search: Some("logo".into()),
            ..Default::default()
        };
        let filter = payment_filter(&query, Some(7)).unwrap();
        assert_eq!(
            filter.where_clause(),
            "WHERE p.user_id = ? AND p.status = ? AND (LOWER(t.title) LIKE ?)"
        );
    }
}
