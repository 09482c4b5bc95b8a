use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{
        salary::{SALARY_COLUMNS, Salary, SalaryStatus, SalaryType},
        user::UserStatus,
    },
    utils::{
        db_utils::{SqlValue, UpdateBuilder, execute_update, nullable},
        invalidation::{MutationResponse, SALARY_CHANGED},
        listing::{ListQuery, ListSource, ListSql, Paginated, SqlFilter, fetch_page},
        validation::Validator,
    },
};

const SALARY_FROM: &str = "salaries s JOIN users u ON u.id = s.user_id";

const SALARY_SOURCE: ListSource = ListSource {
    columns: SALARY_COLUMNS,
    from: SALARY_FROM,
    created_at: "s.created_at",
    id: "s.id",
};

#[derive(Deserialize, ToSchema)]
pub struct CreateSalary {
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "25000.00", value_type = String)]
    pub amount: Decimal,
    pub salary_type: SalaryType,
    /// Defaults to PENDING
    pub status: Option<SalaryStatus>,
    /// Any day of the month; stored as the first
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub month: NaiveDate,
    pub note: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSalary {
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    pub salary_type: Option<SalaryType>,
    pub status: Option<SalaryStatus>,
    #[schema(value_type = Option<String>, format = "date")]
    pub month: Option<NaiveDate>,
    /// `null` clears it
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub note: Option<Option<String>>,
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn salary_filter(query: &ListQuery, user: Option<u64>) -> AppResult<SqlFilter> {
    let status = query.status_filter::<SalaryStatus>()?;

    Ok(SqlFilter::new()
        .eq_opt("s.user_id", user)
        .eq_opt("s.status", status.map(|s| s.to_string()))
        .search(&["u.name"], query.search_term())
        .created_since("s.created_at", query.bucket().lower_bound(Utc::now())))
}

pub async fn fetch_salaries(
    pool: &MySqlPool,
    query: &ListQuery,
    user: Option<u64>,
) -> AppResult<Paginated<Salary>> {
    let filter = salary_filter(query, user)?;
    fetch_page(pool, ListSql::new(SALARY_SOURCE, filter, query.page())).await
}

async fn fetch_salary(pool: &MySqlPool, salary_id: u64) -> AppResult<Salary> {
    sqlx::query_as::<_, Salary>(&format!(
        "SELECT {SALARY_COLUMNS} FROM {SALARY_FROM} WHERE s.id = ?"
    ))
    .bind(salary_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound)
}

#[utoipa::path(
    get,
    path = "/api/salaries",
    params(ListQuery),
    responses((status = 200, description = "Paginated salary records, newest first", body = SalaryPage)),
    security(("bearer_auth" = [])),
    tag = "Salaries"
)]
pub async fn list_salaries(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    let page = fetch_salaries(pool.get_ref(), &query, auth.scope()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/salaries/{salary_id}",
    params(("salary_id" = u64, Path, description = "Salary ID")),
    responses(
        (status = 200, body = Salary),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Salaries"
)]
pub async fn get_salary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let salary = fetch_salary(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or_admin(salary.user_id)
        .map_err(|_| AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(salary))
}

#[utoipa::path(
    post,
    path = "/api/salaries",
    request_body = CreateSalary,
    responses(
        (status = 201, description = "Salary recorded"),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Salaries"
)]
pub async fn create_salary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSalary>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    Validator::new().amount("amount", payload.amount).finish()?;

    let active = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ? AND status = ?")
        .bind(payload.user_id)
        .bind(UserStatus::Active.as_ref())
        .fetch_one(pool.get_ref())
        .await?;
    if active == 0 {
        return Err(AppError::invalid("user_id", "User does not exist or is inactive"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO salaries (user_id, amount, salary_type, status, month, note)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.user_id)
    .bind(payload.amount)
    .bind(payload.salary_type.as_ref())
    .bind(payload.status.unwrap_or(SalaryStatus::Pending).as_ref())
    .bind(first_of_month(payload.month))
    .bind(payload.note.as_deref())
    .execute(pool.get_ref())
    .await?;

    let salary_id = result.last_insert_id();
    info!(salary_id, user_id = payload.user_id, "Salary recorded");

    let salary = fetch_salary(pool.get_ref(), salary_id).await?;
    Ok(HttpResponse::Created().json(MutationResponse::new(
        "Salary recorded",
        Some(salary),
        SALARY_CHANGED,
    )))
}

#[utoipa::path(
    put,
    path = "/api/salaries/{salary_id}",
    params(("salary_id" = u64, Path, description = "Salary ID")),
    request_body = UpdateSalary,
    responses(
        (status = 200, description = "Salary updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Salaries"
)]
pub async fn update_salary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateSalary>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let salary_id = path.into_inner();

    Validator::new().amount_opt("amount", body.amount).finish()?;

    let update = UpdateBuilder::new("salaries")
        .set_opt("amount", body.amount)
        .set_opt("salary_type", body.salary_type.map(|t| t.to_string()))
        .set_opt("status", body.status.map(|s| s.to_string()))
        .set_opt("month", body.month.map(first_of_month))
        .set_nullable("note", body.note.clone())
        .build("id = ?", vec![SqlValue::U64(salary_id)])?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM salaries WHERE id = ?")
        .bind(salary_id)
        .fetch_one(pool.get_ref())
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound);
    }

    execute_update(pool.get_ref(), update).await?;
    info!(salary_id, admin_id = auth.user_id, "Salary updated");

    let salary = fetch_salary(pool.get_ref(), salary_id).await?;
    Ok(HttpResponse::Ok().json(MutationResponse::new(
        "Salary updated",
        Some(salary),
        SALARY_CHANGED,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/salaries/{salary_id}",
    params(("salary_id" = u64, Path, description = "Salary ID")),
    responses(
        (status = 200, description = "Salary deleted"),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Salaries"
)]
pub async fn delete_salary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let salary_id = path.into_inner();

    let result = sqlx::query("DELETE FROM salaries WHERE id = ?")
        .bind(salary_id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    info!(salary_id, admin_id = auth.user_id, "Salary deleted");

    Ok(HttpResponse::Ok().json(MutationResponse::<Salary>::new(
        "Salary deleted",
        None,
        SALARY_CHANGED,
    )))
}
