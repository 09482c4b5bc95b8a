use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::{
    api::payments::{completed_total, remaining_balance},
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{
        task::{TASK_COLUMNS, Task, TaskStatus},
        user::UserStatus,
    },
    utils::{
        db_utils::{SqlValue, UpdateBuilder, bind_values, execute_update, nullable},
        invalidation::{MutationResponse, TASK_CHANGED},
        listing::{ListQuery, ListSource, ListSql, Paginated, SqlFilter, fetch_page},
        validation::Validator,
    },
};

const TASK_SOURCE: ListSource = ListSource {
    columns: TASK_COLUMNS,
    from: "tasks t LEFT JOIN users u ON u.id = t.assignee_id",
    created_at: "t.created_at",
    id: "t.id",
};

#[derive(Deserialize, ToSchema)]
pub struct CreateTask {
    #[schema(example = "Landing page copy")]
    pub title: String,
    #[schema(example = "Write the hero and pricing sections")]
    pub description: Option<String>,
    #[schema(example = "1000.00", value_type = String)]
    pub amount: Decimal,
    #[schema(example = 7)]
    pub assignee_id: Option<u64>,
    #[schema(example = "2026-01-01", value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-01-10", value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTask {
    pub title: Option<String>,
    /// `null` clears it
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    pub status: Option<TaskStatus>,
    /// `null` unassigns the task
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<u64>)]
    pub assignee_id: Option<Option<u64>>,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTaskStatus {
    #[schema(example = "SUBMITTED")]
    pub status: TaskStatus,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct TaskCalculation {
    pub total_tasks: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub submitted: i64,
    pub completed: i64,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    #[sqlx(skip)]
    #[schema(value_type = String)]
    pub total_paid: Decimal,
    #[sqlx(skip)]
    #[schema(value_type = String)]
    pub remaining: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskBalance {
    pub task_id: u64,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub completed: Decimal,
    #[schema(value_type = String)]
    pub remaining: Decimal,
}

/// Task row locked for the rest of a transaction.
#[derive(Debug, FromRow)]
pub struct LockedTask {
    pub id: u64,
    pub amount: Decimal,
    pub status: String,
    pub assignee_id: Option<u64>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

pub async fn lock_task(
    conn: &mut sqlx::MySqlConnection,
    task_id: u64,
) -> Result<Option<LockedTask>, sqlx::Error> {
    sqlx::query_as::<_, LockedTask>(
        r#"
        SELECT id, amount, status, assignee_id, start_date, due_date
        FROM tasks
        WHERE id = ? AND is_deleted = 0
        FOR UPDATE
        "#,
    )
    .bind(task_id)
    .fetch_optional(conn)
    .await
}

/// A task amount may never drop below what has already been paid out on it.
pub fn ensure_amount_covers(amount: Decimal, completed: Decimal) -> AppResult<()> {
    if amount < completed {
        return Err(AppError::Conflict(format!(
            "Task amount cannot be lower than its completed payments ({completed})"
        )));
    }
    Ok(())
}

pub fn ensure_deletable(completed: Decimal) -> AppResult<()> {
    if completed > Decimal::ZERO {
        return Err(AppError::Conflict(
            "Task has completed payments and cannot be deleted".into(),
        ));
    }
    Ok(())
}

/// Deleted tasks are excluded whatever else the query asks for.
pub fn task_filter(query: &ListQuery, assignee: Option<u64>) -> AppResult<SqlFilter> {
    let status = query.status_filter::<TaskStatus>()?;

    Ok(SqlFilter::new()
        .raw("t.is_deleted = 0")
        .eq_opt("t.assignee_id", assignee)
        .eq_opt("t.status", status.map(|s| s.to_string()))
        .search(&["t.title"], query.search_term())
        .created_since("t.created_at", query.bucket().lower_bound(Utc::now())))
}

pub async fn fetch_tasks(
    pool: &MySqlPool,
    query: &ListQuery,
    assignee: Option<u64>,
) -> AppResult<Paginated<Task>> {
    let filter = task_filter(query, assignee)?;
    fetch_page(pool, ListSql::new(TASK_SOURCE, filter, query.page())).await
}

pub async fn fetch_task(pool: &MySqlPool, task_id: u64) -> AppResult<Task> {
    sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks t LEFT JOIN users u ON u.id = t.assignee_id \
         WHERE t.id = ? AND t.is_deleted = 0"
    ))
    .bind(task_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound)
}

/// Users only ever see tasks assigned to them.
async fn visible_task(pool: &MySqlPool, auth: &AuthUser, task_id: u64) -> AppResult<Task> {
    let task = fetch_task(pool, task_id).await?;
    match auth.scope() {
        Some(user_id) if task.assignee_id != Some(user_id) => Err(AppError::NotFound),
        _ => Ok(task),
    }
}

async fn ensure_active_user(pool: &MySqlPool, user_id: u64, field: &str) -> AppResult<()> {
    let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ? AND status = ?")
        .bind(user_id)
        .bind(UserStatus::Active.as_ref())
        .fetch_one(pool)
        .await?;

    if found == 0 {
        return Err(AppError::invalid(field, "User does not exist or is inactive"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated tasks, newest first", body = TaskPage),
        (status = 400, description = "Unknown status"),
        (status = 401, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn list_tasks(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    let page = fetch_tasks(pool.get_ref(), &query, auth.scope()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, body = Task),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn get_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let task = visible_task(pool.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(task))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created"),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTask>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    Validator::new()
        .title("title", &payload.title)
        .amount("amount", payload.amount)
        .date_order(payload.start_date, payload.due_date)
        .finish()?;

    if let Some(assignee_id) = payload.assignee_id {
        ensure_active_user(pool.get_ref(), assignee_id, "assignee_id").await?;
    }

    let result = sqlx::query(
        r#"
        INSERT INTO tasks (title, description, amount, status, assignee_id, start_date, due_date)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(payload.description.as_deref())
    .bind(payload.amount)
    .bind(TaskStatus::Pending.as_ref())
    .bind(payload.assignee_id)
    .bind(payload.start_date)
    .bind(payload.due_date)
    .execute(pool.get_ref())
    .await?;

    let task_id = result.last_insert_id();
    info!(task_id, admin_id = auth.user_id, "Task created");

    let task = fetch_task(pool.get_ref(), task_id).await?;
    Ok(HttpResponse::Created().json(MutationResponse::new("Task created", Some(task), TASK_CHANGED)))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = UpdateTask,
    responses(
        (status = 200, description = "Task updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Access Denied"),
        (status = 409, description = "Amount below completed payments")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateTask>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let task_id = path.into_inner();

    Validator::new()
        .title_opt("title", body.title.as_deref())
        .amount_opt("amount", body.amount)
        .finish()?;

    if let Some(Some(assignee_id)) = body.assignee_id {
        ensure_active_user(pool.get_ref(), assignee_id, "assignee_id").await?;
    }

    let mut tx = pool.begin().await?;

    let current = lock_task(&mut tx, task_id).await?.ok_or(AppError::NotFound)?;

    Validator::new()
        .date_order(
            body.start_date.or(current.start_date),
            body.due_date.or(current.due_date),
        )
        .finish()?;

    if let Some(amount) = body.amount {
        let completed = completed_total(&mut *tx, task_id, None).await?;
        ensure_amount_covers(amount, completed)?;
    }

    let update = UpdateBuilder::new("tasks")
        .set_opt("title", body.title.as_deref().map(str::trim))
        .set_nullable("description", body.description.clone())
        .set_opt("amount", body.amount)
        .set_opt("status", body.status.map(|s| s.to_string()))
        .set_nullable("assignee_id", body.assignee_id)
        .set_opt("start_date", body.start_date)
        .set_opt("due_date", body.due_date)
        .build("id = ? AND is_deleted = 0", vec![SqlValue::U64(task_id)])?;

    execute_update(&mut *tx, update).await?;
    tx.commit().await?;

    debug!(task_id, previous_status = %current.status, "Task updated");

    let task = fetch_task(pool.get_ref(), task_id).await?;
    Ok(HttpResponse::Ok().json(MutationResponse::new("Task updated", Some(task), TASK_CHANGED)))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}/status",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = UpdateTaskStatus,
    responses(
        (status = 200, description = "Status changed"),
        (status = 404, description = "Access Denied"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_task_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateTaskStatus>,
) -> AppResult<HttpResponse> {
    let task_id = path.into_inner();
    let task = visible_task(pool.get_ref(), &auth, task_id).await?;

    let from: TaskStatus = task
        .status
        .parse()
        .map_err(|_| anyhow::anyhow!("task {task_id} has unknown status {:?}", task.status))?;

    if !from.can_transition(body.status, auth.role) {
        return Err(AppError::InvalidTransition(format!(
            "Cannot move a task from {from} to {}",
            body.status
        )));
    }

    // Compare-and-set on the status we validated against.
    let result = sqlx::query(
        "UPDATE tasks SET status = ? WHERE id = ? AND status = ? AND is_deleted = 0",
    )
    .bind(body.status.as_ref())
    .bind(task_id)
    .bind(from.as_ref())
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Task was changed by someone else, reload and try again".into(),
        ));
    }

    info!(task_id, user_id = auth.user_id, %from, to = %body.status, "Task status changed");

    let task = fetch_task(pool.get_ref(), task_id).await?;
    Ok(HttpResponse::Ok().json(MutationResponse::new(
        "Task status updated",
        Some(task),
        TASK_CHANGED,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task deleted"),
        (status = 404, description = "Access Denied"),
        (status = 409, description = "Task has completed payments")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn delete_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let task_id = path.into_inner();

    let mut tx = pool.begin().await?;
    lock_task(&mut tx, task_id).await?.ok_or(AppError::NotFound)?;

    let completed = completed_total(&mut *tx, task_id, None).await?;
    ensure_deletable(completed)?;

    sqlx::query("UPDATE tasks SET is_deleted = 1 WHERE id = ?")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(task_id, admin_id = auth.user_id, "Task soft-deleted");

    Ok(HttpResponse::Ok().json(MutationResponse::<Task>::new("Task deleted", None, TASK_CHANGED)))
}

#[utoipa::path(
    get,
    path = "/api/tasks/calculation",
    responses((status = 200, body = TaskCalculation)),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn task_calculation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    let scope = SqlFilter::new()
        .raw("t.is_deleted = 0")
        .eq_opt("t.assignee_id", auth.scope());

    let counts_sql = format!(
        r#"
        SELECT
            COUNT(*) AS total_tasks,
            CAST(COALESCE(SUM(CASE WHEN t.status = 'PENDING' THEN 1 ELSE 0 END), 0) AS SIGNED) AS pending,
            CAST(COALESCE(SUM(CASE WHEN t.status = 'IN_PROGRESS' THEN 1 ELSE 0 END), 0) AS SIGNED) AS in_progress,
            CAST(COALESCE(SUM(CASE WHEN t.status = 'SUBMITTED' THEN 1 ELSE 0 END), 0) AS SIGNED) AS submitted,
            CAST(COALESCE(SUM(CASE WHEN t.status = 'COMPLETED' THEN 1 ELSE 0 END), 0) AS SIGNED) AS completed,
            COALESCE(SUM(t.amount), 0) AS total_amount
        FROM tasks t
        {}
        "#,
        scope.where_clause()
    );

    let mut calculation = bind_values!(
        sqlx::query_as::<_, TaskCalculation>(&counts_sql),
        scope.values()
    )
    .fetch_one(pool.get_ref())
    .await?;

    let paid_sql = format!(
        "SELECT COALESCE(SUM(p.amount), 0) FROM payments p JOIN tasks t ON t.id = p.task_id \
         {} AND p.status = 'COMPLETED'",
        scope.where_clause()
    );

    calculation.total_paid = bind_values!(
        sqlx::query_scalar::<_, Decimal>(&paid_sql),
        scope.values()
    )
    .fetch_one(pool.get_ref())
    .await?;
    calculation.remaining = calculation.total_amount - calculation.total_paid;

    Ok(HttpResponse::Ok().json(calculation))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}/balance",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, body = TaskBalance),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn task_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let task = visible_task(pool.get_ref(), &auth, path.into_inner()).await?;
    let completed = completed_total(pool.get_ref(), task.id, None).await?;

    Ok(HttpResponse::Ok().json(TaskBalance {
        task_id: task.id,
        amount: task.amount,
        completed,
        remaining: remaining_balance(task.amount, completed),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::listing::DateBucket;

    #[test]
    fn test_deleted_tasks_always_filtered() {
        let queries = [
            ListQuery::default(),
            ListQuery {
                search: Some("logo".into()),
                status: Some("ALL".into()),
                date: Some(DateBucket::LastYear),
                page: Some(4),
            },
        ];
        for query in &queries {
            for scope in [None, Some(7)] {
                let filter = task_filter(query, scope).unwrap();
                assert!(filter.where_clause().starts_with("WHERE t.is_deleted = 0"));
            }
        }
    }

    #[test]
    fn test_user_scope_and_status_binding() {
        let query = ListQuery {
            status: Some("submitted".into()),
            ..Default::default()
        };
        let filter = task_filter(&query, Some(7)).unwrap();
        assert_eq!(
            filter.where_clause(),
            "WHERE t.is_deleted = 0 AND t.assignee_id = ? AND t.status = ?"
        );
        assert_eq!(
            filter.values(),
            &[SqlValue::U64(7), SqlValue::String("SUBMITTED".into())]
        );
    }

    #[test]
    fn test_amount_cannot_drop_below_completed_payments() {
        let paid = Decimal::new(800, 0);
        assert!(matches!(
            ensure_amount_covers(Decimal::new(799_99, 2), paid),
            Err(AppError::Conflict(_))
        ));
        assert!(ensure_amount_covers(paid, paid).is_ok());
        assert!(ensure_amount_covers(Decimal::new(1200, 0), paid).is_ok());
    }

    #[test]
    fn test_task_with_completed_payments_is_not_deleted() {
        assert!(matches!(
            ensure_deletable(Decimal::new(1, 2)),
            Err(AppError::Conflict(_))
        ));
        assert!(ensure_deletable(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_null_assignee_unassigns() {
        let body: UpdateTask = serde_json::from_value(serde_json::json!({ "assignee_id": null })).unwrap();
        let update = UpdateBuilder::new("tasks")
            .set_nullable("assignee_id", body.assignee_id)
            .set_nullable("description", body.description)
            .build("id = ? AND is_deleted = 0", vec![SqlValue::U64(4)])
            .unwrap();
        assert_eq!(update.sql, "UPDATE tasks SET assignee_id = ? WHERE id = ? AND is_deleted = 0");
        assert_eq!(update.values, vec![SqlValue::Null, SqlValue::U64(4)]);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let query = ListQuery {
            status: Some("ARCHIVED".into()),
            ..Default::default()
        };
        assert!(matches!(task_filter(&query, None), Err(AppError::Validation(_))));
    }
}
