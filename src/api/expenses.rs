use actix_web::{HttpResponse, web};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::expense::{EXPENSE_COLUMNS, Expense},
    utils::{
        db_utils::{SqlValue, UpdateBuilder, execute_update, nullable},
        invalidation::{EXPENSE_CHANGED, MutationResponse},
        listing::{ListQuery, ListSource, ListSql, Paginated, SqlFilter, fetch_page},
        validation::Validator,
    },
};

const EXPENSE_SOURCE: ListSource = ListSource {
    columns: EXPENSE_COLUMNS,
    from: "expenses",
    created_at: "created_at",
    id: "id",
};

#[derive(Deserialize, ToSchema)]
pub struct CreateExpense {
    #[schema(example = "Office internet")]
    pub title: String,
    #[schema(example = "1500.00", value_type = String)]
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateExpense {
    pub title: Option<String>,
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    /// `null` clears it
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

/// Expenses carry no status; a `status` in the query string is ignored.
pub fn expense_filter(query: &ListQuery) -> SqlFilter {
    SqlFilter::new()
        .search(&["title"], query.search_term())
        .created_since("created_at", query.bucket().lower_bound(Utc::now()))
}

pub async fn fetch_expenses(pool: &MySqlPool, query: &ListQuery) -> AppResult<Paginated<Expense>> {
    fetch_page(pool, ListSql::new(EXPENSE_SOURCE, expense_filter(query), query.page())).await
}

async fn fetch_expense(pool: &MySqlPool, expense_id: u64) -> AppResult<Expense> {
    sqlx::query_as::<_, Expense>(&format!(
        "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?"
    ))
    .bind(expense_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound)
}

#[utoipa::path(
    get,
    path = "/api/expenses",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated expenses, newest first", body = ExpensePage),
        (status = 403, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Expenses"
)]
pub async fn list_expenses(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let page = fetch_expenses(pool.get_ref(), &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = u64, Path, description = "Expense ID")),
    responses(
        (status = 200, body = Expense),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Expenses"
)]
pub async fn get_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let expense = fetch_expense(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(expense))
}

#[utoipa::path(
    post,
    path = "/api/expenses",
    request_body = CreateExpense,
    responses(
        (status = 201, description = "Expense recorded"),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Expenses"
)]
pub async fn create_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateExpense>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    Validator::new()
        .title("title", &payload.title)
        .amount("amount", payload.amount)
        .finish()?;

    let result = sqlx::query("INSERT INTO expenses (title, amount, description) VALUES (?, ?, ?)")
        .bind(payload.title.trim())
        .bind(payload.amount)
        .bind(payload.description.as_deref())
        .execute(pool.get_ref())
        .await?;

    let expense_id = result.last_insert_id();
    info!(expense_id, admin_id = auth.user_id, "Expense recorded");

    let expense = fetch_expense(pool.get_ref(), expense_id).await?;
    Ok(HttpResponse::Created().json(MutationResponse::new(
        "Expense recorded",
        Some(expense),
        EXPENSE_CHANGED,
    )))
}

#[utoipa::path(
    put,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = u64, Path, description = "Expense ID")),
    request_body = UpdateExpense,
    responses(
        (status = 200, description = "Expense updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Expenses"
)]
pub async fn update_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateExpense>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let expense_id = path.into_inner();

    Validator::new()
        .title_opt("title", body.title.as_deref())
        .amount_opt("amount", body.amount)
        .finish()?;

    let update = UpdateBuilder::new("expenses")
        .set_opt("title", body.title.as_deref().map(str::trim))
        .set_opt("amount", body.amount)
        .set_nullable("description", body.description.clone())
        .build("id = ?", vec![SqlValue::U64(expense_id)])?;

    // Existence first: MySQL reports zero affected rows for a no-op update.
    fetch_expense(pool.get_ref(), expense_id).await?;
    execute_update(pool.get_ref(), update).await?;

    info!(expense_id, admin_id = auth.user_id, "Expense updated");

    let expense = fetch_expense(pool.get_ref(), expense_id).await?;
    Ok(HttpResponse::Ok().json(MutationResponse::new(
        "Expense updated",
        Some(expense),
        EXPENSE_CHANGED,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = u64, Path, description = "Expense ID")),
    responses(
        (status = 200, description = "Expense deleted"),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Expenses"
)]
pub async fn delete_expense(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let expense_id = path.into_inner();

    let result = sqlx::query("DELETE FROM expenses WHERE id = ?")
        .bind(expense_id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    info!(expense_id, admin_id = auth.user_id, "Expense deleted");

    Ok(HttpResponse::Ok().json(MutationResponse::<Expense>::new(
        "Expense deleted",
        None,
        EXPENSE_CHANGED,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::listing::DateBucket;

    #[test]
    fn test_status_is_ignored_for_expenses() {
        let query = ListQuery {
            search: Some("rent".into()),
            status: Some("WHATEVER".into()),
            date: Some(DateBucket::LastDay),
            page: None,
        };
        let filter = expense_filter(&query);
        assert_eq!(
            filter.where_clause(),
            "WHERE (LOWER(title) LIKE ?) AND created_at >= ?"
        );
    }
}
