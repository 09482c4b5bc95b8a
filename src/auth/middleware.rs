use crate::auth::auth::AuthUser;
use crate::auth::handlers::load_active_user;
use crate::auth::jwt::{issue_session, needs_refresh, now, verify_token};
use crate::auth::session::{removal_cookie, session_cookie, token_from_request};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Claims, UserSql};
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::{BoxBody, MessageBody},
    cookie::Cookie,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use sqlx::MySqlPool;

/// Decodes the session for `/api` requests and renews it once it is older
/// than the configured update age.
pub async fn auth_middleware<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: MessageBody + 'static,
{
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let claims = match token_from_request(req.request(), &config.session_cookie_name)
        .and_then(|token| verify_token(&token, &config.jwt_secret).ok())
    {
        Some(c) => c,
        None => {
            tracing::debug!(path = %req.path(), "Rejected request without a valid session");
            let resp = AppError::Unauthenticated.error_response();
            return Ok(req.into_response(resp));
        }
    };

    let auth_user = match AuthUser::from_claims(&claims) {
        Some(user) => user,
        None => {
            let resp = AppError::Unauthenticated.error_response();
            return Ok(req.into_response(resp));
        }
    };

    req.extensions_mut().insert(auth_user);
    let pool = req.app_data::<Data<MySqlPool>>().cloned();

    let mut res = next.call(req).await?.map_into_boxed_body();

    if needs_refresh(&claims, now(), config.session_update_age) {
        match pool {
            Some(pool) => renew_from_store(&mut res, &claims, &config, &pool).await,
            None => tracing::warn!("No database pool, session not renewed"),
        }
    }
    Ok(res)
}

/// Cookie that replaces a stale session: a fresh one built from the stored
/// profile, or a removal cookie once the account is gone or inactive.
pub fn renewal_cookie(config: &Config, stored: Option<&UserSql>) -> AppResult<Cookie<'static>> {
    match stored {
        Some(user) => {
            let (token, _) = issue_session(user, &config.jwt_secret, config.session_ttl)?;
            Ok(session_cookie(config, token))
        }
        None => Ok(removal_cookie(config)),
    }
}

async fn renew_from_store(
    res: &mut ServiceResponse<BoxBody>,
    claims: &Claims,
    config: &Config,
    pool: &MySqlPool,
) {
    let stored = match load_active_user(pool, claims.user_id).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!(user_id = claims.user_id, error = %e, "Failed to reload user for renewal");
            return;
        }
    };

    let cookie = match renewal_cookie(config, stored.as_ref()) {
        Ok(cookie) => cookie,
        Err(e) => {
            tracing::error!(user_id = claims.user_id, error = %e, "Failed to renew session");
            return;
        }
    };

    if let Err(e) = res.response_mut().add_cookie(&cookie) {
        tracing::error!(error = %e, "Failed to attach session cookie");
    } else if stored.is_some() {
        tracing::debug!(user_id = claims.user_id, "Session renewed");
    } else {
        tracing::info!(user_id = claims.user_id, "Session dropped: account inactive or removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{claims_for, encode_claims, tests::user_row};
    use crate::model::role::Role;
    use actix_web::test::{TestRequest, call_service, init_service};
    use actix_web::{App, HttpResponse, middleware::from_fn, web};

    async fn ok(auth: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(auth.user_id.to_string())
    }

    fn token_issued_at(issued_at: usize) -> String {
        let config = Config::for_tests();
        let claims = claims_for(&user_row("USER", "ACTIVE"), issued_at, config.session_ttl).unwrap();
        encode_claims(&claims, &config.jwt_secret).unwrap()
    }

    macro_rules! api_app {
        () => {
            init_service(
                App::new().app_data(Data::new(Config::for_tests())).service(
                    web::scope("/api")
                        .wrap(from_fn(auth_middleware))
                        .route("/me", web::get().to(ok)),
                ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_missing_session_is_unauthorized() {
        let app = api_app!();
        let resp = call_service(&app, TestRequest::get().uri("/api/me").to_request()).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_fresh_session_passes_without_renewal() {
        let app = api_app!();
        let req = TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token_issued_at(now()))))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert!(resp.response().cookies().next().is_none());
    }

    #[actix_web::test]
    async fn test_stale_session_is_not_extended_without_the_store() {
        let app = api_app!();
        let two_days_ago = now() - 2 * 24 * 60 * 60;
        let req = TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token_issued_at(two_days_ago))))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert!(resp.response().cookies().next().is_none());
    }

    #[test]
    fn test_renewal_takes_role_from_stored_profile() {
        let config = Config::for_tests();
        let demoted = user_row("USER", "ACTIVE");
        let cookie = renewal_cookie(&config, Some(&demoted)).unwrap();
        assert_eq!(cookie.name(), "taskbit_session");

        let renewed = verify_token(cookie.value(), &config.jwt_secret).unwrap();
        assert_eq!(renewed.role, Role::User);
        assert!(renewed.iat >= now() - 5);
    }

    #[test]
    fn test_inactive_account_loses_its_cookie() {
        let config = Config::for_tests();
        let cookie = renewal_cookie(&config, None).unwrap();
        assert_eq!(cookie.name(), "taskbit_session");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(actix_web::cookie::time::Duration::ZERO));
    }
}
