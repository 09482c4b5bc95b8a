use crate::{
    auth::{
        jwt::{issue_session, verify_token},
        password::verify_password,
        session::{removal_cookie, session_cookie, token_from_request},
    },
    config::Config,
    error::{AppError, AppResult},
    model::user::UserStatus,
    models::{SessionResponse, SignInReqDto, UserSql},
};
use actix_web::{HttpRequest, HttpResponse, web};
use sqlx::MySqlPool;
use tracing::{debug, info, instrument};

pub(crate) const CREDENTIAL_COLUMNS: &str = "id, name, email, password, role, status, phone, bank_name, \
     bank_account_number, wallet_a_number, wallet_b_number";

/// The stored profile of `user_id`, if the account is still active.
pub(crate) async fn load_active_user(
    pool: &MySqlPool,
    user_id: u64,
) -> Result<Option<UserSql>, sqlx::Error> {
    sqlx::query_as::<_, UserSql>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE id = ? AND status = ?"
    ))
    .bind(user_id)
    .bind(UserStatus::Active.as_ref())
    .fetch_optional(pool)
    .await
}

/// Fails closed: an absent, inactive or mismatching account yields no user.
pub fn authenticate(record: Option<UserSql>, password: &str) -> Option<UserSql> {
    let user = record?;

    if user.status != UserStatus::Active.as_ref() {
        info!(user_id = user.id, "Sign-in refused: inactive account");
        return None;
    }

    if let Err(e) = verify_password(password, &user.password) {
        info!(user_id = user.id, error = %e, "Sign-in refused: password mismatch");
        return None;
    }

    Some(user)
}

fn session_response(config: &Config, user: &UserSql) -> AppResult<HttpResponse> {
    let (token, claims) = issue_session(user, &config.jwt_secret, config.session_ttl)?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(config, token.clone()))
        .json(SessionResponse {
            token,
            expires_at: claims.exp,
            user: claims,
        }))
}

#[utoipa::path(
    post,
    path = "/auth/sign-in",
    request_body = SignInReqDto,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_sign_in",
    skip(pool, config, body),
    fields(email = %body.email)
)]
pub async fn sign_in(
    body: web::Json<SignInReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Sign-in request received");

    let email = body.email.trim().to_lowercase();
    if email.is_empty() || body.password.is_empty() {
        return Err(AppError::invalid("email", "Email and password are required"));
    }

    debug!("Fetching user from database");

    let record = sqlx::query_as::<_, UserSql>(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE email = ? AND status = ?"
    ))
    .bind(&email)
    .bind(UserStatus::Active.as_ref())
    .fetch_optional(pool.get_ref())
    .await?;

    let Some(user) = authenticate(record, &body.password) else {
        return Err(AppError::Unauthenticated);
    };

    if let Some(selected) = body.role.as_deref() {
        if selected != user.role {
            debug!(selected, stored = %user.role, "Ignoring role picked on sign-in form");
        }
    }

    info!(user_id = user.id, "Sign-in successful");
    session_response(&config, &user)
}

/// Re-issues the session from the stored profile so role or status changes
/// made by an admin take effect.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Session renewed", body = SessionResponse),
        (status = 401, description = "Missing, invalid or inactive session")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let claims = token_from_request(&req, &config.session_cookie_name)
        .and_then(|token| verify_token(&token, &config.jwt_secret).ok())
        .ok_or(AppError::Unauthenticated)?;

    let user = load_active_user(pool.get_ref(), claims.user_id)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    debug!(user_id = user.id, "Session refreshed");
    session_response(&config, &user)
}

#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Decoded session profile", body = Claims),
        (status = 401, description = "No valid session")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn session(req: HttpRequest, config: web::Data<Config>) -> AppResult<HttpResponse> {
    let claims = token_from_request(&req, &config.session_cookie_name)
        .and_then(|token| verify_token(&token, &config.jwt_secret).ok())
        .filter(|c| c.status == UserStatus::Active)
        .ok_or(AppError::Unauthenticated)?;

    Ok(HttpResponse::Ok().json(claims))
}

#[utoipa::path(
    post,
    path = "/auth/sign-out",
    responses((status = 204, description = "Session cookie cleared")),
    tag = "Auth"
)]
pub async fn sign_out(config: web::Data<Config>) -> HttpResponse {
    HttpResponse::NoContent()
        .cookie(removal_cookie(&config))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::user_row;
    use crate::auth::password::hash_password;
    use actix_web::App;
    use actix_web::test::{TestRequest, call_service, init_service};

    fn stored(status: &str, password: &str) -> UserSql {
        let mut user = user_row("USER", status);
        user.password = hash_password(password).unwrap();
        user
    }

    #[test]
    fn test_correct_credentials_authenticate() {
        let user = authenticate(Some(stored("ACTIVE", "secret123")), "secret123");
        assert_eq!(user.map(|u| u.id), Some(7));
    }

    #[test]
    fn test_wrong_password_yields_no_session() {
        assert!(authenticate(Some(stored("ACTIVE", "secret123")), "secret124").is_none());
    }

    #[test]
    fn test_absent_or_inactive_yield_no_session() {
        assert!(authenticate(None, "secret123").is_none());
        assert!(authenticate(Some(stored("INACTIVE", "secret123")), "secret123").is_none());
    }

    #[test]
    fn test_session_response_sets_cookie_and_body() {
        let config = Config::for_tests();
        let resp = session_response(&config, &stored("ACTIVE", "x")).unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.cookies().any(|c| c.name() == "taskbit_session"));
    }

    #[actix_web::test]
    async fn test_sign_out_clears_cookie() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/auth/sign-out", web::post().to(sign_out)),
        )
        .await;
        let req = TestRequest::post().uri("/auth/sign-out").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 204);

        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == "taskbit_session")
            .expect("removal cookie");
        assert_eq!(cookie.value(), "");
    }

    #[actix_web::test]
    async fn test_session_endpoint_requires_token() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/auth/session", web::get().to(session)),
        )
        .await;
        let req = TestRequest::get().uri("/auth/session").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }
}
