use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    auth::{
        auth::AuthUser, handlers::CREDENTIAL_COLUMNS, jwt::issue_session,
        password::hash_password, session::session_cookie,
    },
    config::Config,
    error::{AppError, AppResult},
    model::{
        role::Role,
        user::{USER_COLUMNS, User, UserStatus},
    },
    models::UserSql,
    utils::{
        db_utils::{SqlUpdate, SqlValue, UpdateBuilder, execute_update},
        invalidation::{MutationResponse, PROFILE_CHANGED, USER_CHANGED},
        listing::{ListQuery, ListSource, ListSql, Paginated, SqlFilter, fetch_page},
        validation::Validator,
    },
};

pub const MIN_PASSWORD_LEN: usize = 6;

const USER_SOURCE: ListSource = ListSource {
    columns: USER_COLUMNS,
    from: "users",
    created_at: "created_at",
    id: "id",
};

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "Rahim Uddin")]
    pub name: String,
    #[schema(example = "rahim@taskbit.io")]
    pub email: String,
    #[schema(example = "secret123")]
    pub password: String,
    /// Defaults to USER
    pub role: Option<Role>,
    pub phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub wallet_a_number: Option<String>,
    pub wallet_b_number: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub wallet_a_number: Option<String>,
    pub wallet_b_number: Option<String>,
}

/// Self-service profile edit. `role` and `status` are accepted on the wire
/// only so they can be refused.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub wallet_a_number: Option<String>,
    pub wallet_b_number: Option<String>,
    #[schema(value_type = Option<String>)]
    pub role: Option<serde_json::Value>,
    #[schema(value_type = Option<String>)]
    pub status: Option<serde_json::Value>,
}

impl UpdateProfile {
    fn touches_privileges(&self) -> bool {
        self.role.is_some() || self.status.is_some()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Builds the profile UPDATE, refusing any attempt to change role or status.
pub fn profile_update(user_id: u64, body: &UpdateProfile) -> AppResult<SqlUpdate> {
    if body.touches_privileges() {
        return Err(AppError::AccessDenied);
    }

    Validator::new()
        .title_opt("name", body.name.as_deref())
        .finish()?;

    UpdateBuilder::new("users")
        .set_opt("name", body.name.as_deref().map(str::trim))
        .set_opt("phone", body.phone.clone())
        .set_opt("bank_name", body.bank_name.clone())
        .set_opt("bank_account_number", body.bank_account_number.clone())
        .set_opt("wallet_a_number", body.wallet_a_number.clone())
        .set_opt("wallet_b_number", body.wallet_b_number.clone())
        .build("id = ?", vec![SqlValue::U64(user_id)])
}

pub fn user_filter(query: &ListQuery) -> AppResult<SqlFilter> {
    let status = query.status_filter::<UserStatus>()?;

    Ok(SqlFilter::new()
        .eq_opt("status", status.map(|s| s.to_string()))
        .search(&["name", "email"], query.search_term())
        .created_since("created_at", query.bucket().lower_bound(Utc::now())))
}

pub async fn fetch_users(pool: &MySqlPool, query: &ListQuery) -> AppResult<Paginated<User>> {
    let filter = user_filter(query)?;
    fetch_page(pool, ListSql::new(USER_SOURCE, filter, query.page())).await
}

fn map_duplicate_email(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::invalid("email", "Email is already registered")
        }
        _ => AppError::Database(e),
    }
}

pub async fn fetch_user(pool: &MySqlPool, user_id: u64) -> AppResult<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)
}

async fn email_taken(pool: &MySqlPool, email: &str, except: Option<u64>) -> AppResult<bool> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ? AND id <> ?")
        .bind(email)
        .bind(except.unwrap_or(0))
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

fn hash(password: &str) -> AppResult<String> {
    hash_password(password)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated users, newest first", body = UserPage),
        (status = 403, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let page = fetch_users(pool.get_ref(), &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, body = User),
        (status = 404, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let user = fetch_user(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created"),
        (status = 400, description = "Validation failed or email already registered")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let email = normalize_email(&payload.email);

    Validator::new()
        .title("name", &payload.name)
        .email("email", &email)
        .min_len("password", &payload.password, MIN_PASSWORD_LEN)
        .finish()?;

    if email_taken(pool.get_ref(), &email, None).await? {
        return Err(AppError::invalid("email", "Email is already registered"));
    }

    let hashed = hash(&payload.password)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password, role, status, phone, bank_name,
            bank_account_number, wallet_a_number, wallet_b_number)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&email)
    .bind(&hashed)
    .bind(payload.role.unwrap_or(Role::User).as_ref())
    .bind(UserStatus::Active.as_ref())
    .bind(payload.phone.as_deref())
    .bind(payload.bank_name.as_deref())
    .bind(payload.bank_account_number.as_deref())
    .bind(payload.wallet_a_number.as_deref())
    .bind(payload.wallet_b_number.as_deref())
    .execute(pool.get_ref())
    .await
    .map_err(map_duplicate_email)?;

    let user_id = result.last_insert_id();
    info!(user_id, admin_id = auth.user_id, "User created");

    let user = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Created().json(MutationResponse::new("User created", Some(user), USER_CHANGED)))
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Access Denied"),
        (status = 409, description = "Admins cannot deactivate themselves")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateUser>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    if user_id == auth.user_id && body.status == Some(UserStatus::Inactive) {
        return Err(AppError::Conflict("You cannot deactivate your own account".into()));
    }

    let email = body.email.as_deref().map(normalize_email);

    let mut validator = Validator::new().title_opt("name", body.name.as_deref());
    if let Some(email) = &email {
        validator = validator.email("email", email);
    }
    if let Some(password) = &body.password {
        validator = validator.min_len("password", password, MIN_PASSWORD_LEN);
    }
    validator.finish()?;

    fetch_user(pool.get_ref(), user_id).await?;

    if let Some(email) = &email {
        if email_taken(pool.get_ref(), email, Some(user_id)).await? {
            return Err(AppError::invalid("email", "Email is already registered"));
        }
    }

    let hashed = body.password.as_deref().map(hash).transpose()?;

    let update = UpdateBuilder::new("users")
        .set_opt("name", body.name.as_deref().map(str::trim))
        .set_opt("email", email)
        .set_opt("password", hashed)
        .set_opt("role", body.role.map(|r| r.to_string()))
        .set_opt("status", body.status.map(|s| s.to_string()))
        .set_opt("phone", body.phone.clone())
        .set_opt("bank_name", body.bank_name.clone())
        .set_opt("bank_account_number", body.bank_account_number.clone())
        .set_opt("wallet_a_number", body.wallet_a_number.clone())
        .set_opt("wallet_b_number", body.wallet_b_number.clone())
        .build("id = ?", vec![SqlValue::U64(user_id)])?;

    execute_update(pool.get_ref(), update)
        .await
        .map_err(map_duplicate_email)?;

    info!(user_id, admin_id = auth.user_id, "User updated");

    let user = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(MutationResponse::new("User updated", Some(user), USER_CHANGED)))
}

/// Users are never removed; deleting one marks the account INACTIVE.
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated"),
        (status = 404, description = "Access Denied"),
        (status = 409, description = "Admins cannot deactivate themselves")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    if user_id == auth.user_id {
        warn!(user_id, "Admin tried to deactivate own account");
        return Err(AppError::Conflict("You cannot deactivate your own account".into()));
    }

    fetch_user(pool.get_ref(), user_id).await?;

    sqlx::query("UPDATE users SET status = ? WHERE id = ?")
        .bind(UserStatus::Inactive.as_ref())
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    info!(user_id, admin_id = auth.user_id, "User deactivated");

    let user = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(MutationResponse::new(
        "User deactivated",
        Some(user),
        USER_CHANGED,
    )))
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses((status = 200, body = User)),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_profile(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let user = fetch_user(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Updates the caller's own profile and re-issues the session so the token
/// carries the new values.
#[utoipa::path(
    put,
    path = "/api/me",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated"),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Access Denied")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Json<UpdateProfile>,
) -> AppResult<HttpResponse> {
    let update = match profile_update(auth.user_id, &body) {
        Err(AppError::AccessDenied) => {
            warn!(user_id = auth.user_id, "Profile update tried to change role or status");
            return Err(AppError::AccessDenied);
        }
        other => other?,
    };

    execute_update(pool.get_ref(), update).await?;

    let record = sqlx::query_as::<_, UserSql>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(auth.user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(AppError::NotFound)?;

    let (token, _) = issue_session(&record, &config.jwt_secret, config.session_ttl)?;

    info!(user_id = auth.user_id, "Profile updated");

    let user = fetch_user(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok()
        .cookie(session_cookie(&config, token))
        .json(MutationResponse::new("Profile updated", Some(user), PROFILE_CHANGED)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(json: serde_json::Value) -> UpdateProfile {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_profile_cannot_change_role_or_status() {
        let body = profile(serde_json::json!({ "name": "Rahim", "role": "ADMIN" }));
        assert!(matches!(profile_update(7, &body), Err(AppError::AccessDenied)));

        let body = profile(serde_json::json!({ "status": "ACTIVE" }));
        assert!(matches!(profile_update(7, &body), Err(AppError::AccessDenied)));
    }

    #[test]
    fn test_profile_update_touches_only_sent_fields() {
        let body = profile(serde_json::json!({ "phone": "+8801700000000", "wallet_b_number": "01800000000" }));
        let update = profile_update(7, &body).unwrap();
        assert_eq!(update.sql, "UPDATE users SET phone = ?, wallet_b_number = ? WHERE id = ?");
        assert_eq!(update.values.last(), Some(&SqlValue::U64(7)));
    }

    #[test]
    fn test_empty_profile_update_is_invalid() {
        let body = profile(serde_json::json!({}));
        assert!(matches!(profile_update(7, &body), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_user_search_covers_name_and_email() {
        let query = ListQuery {
            search: Some("Rahim@".into()),
            status: Some("inactive".into()),
            ..Default::default()
        };
        let filter = user_filter(&query).unwrap();
        assert_eq!(
            filter.where_clause(),
            "WHERE status = ? AND (LOWER(name) LIKE ? OR LOWER(email) LIKE ?)"
        );
        assert_eq!(filter.values().len(), 3);
    }
}
