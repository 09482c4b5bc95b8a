//! Route guard for the `/dashboard` pages.
//!
//! Runs before any page handler and only looks at the signed session token.
//! It never touches the database, so it does not renew sessions either; the
//! `/api` middleware does that against the stored profile.
//! Admins pass everywhere; users are confined to their own views and sent to
//! `/dashboard/my-tasks` otherwise; requests without a usable session go to
//! the sign-in page.

use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::auth::session::token_from_request;
use crate::config::Config;
use crate::model::role::Role;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::{BoxBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    web::Data,
};

pub const USER_HOME: &str = "/dashboard/my-tasks";
pub const SIGN_IN: &str = "/sign-in";

pub const ADMIN_ONLY_PREFIXES: &[&str] = &[
    "/dashboard/tasks",
    "/dashboard/payments",
    "/dashboard/users",
    "/dashboard/clients",
];

pub const USER_ALLOWED_PREFIXES: &[&str] = &[
    "/dashboard/my-tasks",
    "/dashboard/my-payments",
    "/dashboard/profile",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    SignIn { callback: String },
    Redirect(&'static str),
}

/// `prefix` matches itself and anything below it, never a sibling sharing
/// the same leading characters.
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn decide(role: Option<Role>, path: &str) -> GuardDecision {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    match role {
        None => GuardDecision::SignIn {
            callback: path.to_string(),
        },
        Some(Role::Admin) => GuardDecision::Allow,
        Some(Role::User) => {
            if ADMIN_ONLY_PREFIXES.iter().any(|p| under(path, p)) {
                return GuardDecision::Redirect(USER_HOME);
            }
            if USER_ALLOWED_PREFIXES.iter().any(|p| under(path, p)) {
                GuardDecision::Allow
            } else {
                GuardDecision::Redirect(USER_HOME)
            }
        }
    }
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn sign_in_location(callback: &str) -> String {
    let encoded: String = callback
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect();
    format!("{SIGN_IN}?callbackUrl={encoded}")
}

pub async fn dashboard_guard<B>(
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

    let auth_user = token_from_request(req.request(), &config.session_cookie_name)
        .and_then(|token| verify_token(&token, &config.jwt_secret).ok())
        .as_ref()
        .and_then(AuthUser::from_claims);

    match decide(auth_user.as_ref().map(|u| u.role), req.path()) {
        GuardDecision::Allow => {}
        GuardDecision::SignIn { callback } => {
            tracing::debug!(path = %req.path(), "No session, redirecting to sign-in");
            let resp = redirect(&sign_in_location(&callback));
            return Ok(req.into_response(resp));
        }
        GuardDecision::Redirect(to) => {
            tracing::debug!(path = %req.path(), to, "Path not allowed for role");
            let resp = redirect(to);
            return Ok(req.into_response(resp));
        }
    }

    // Allow implies a decoded, active session.
    let Some(auth_user) = auth_user else {
        return Ok(req.into_response(redirect(SIGN_IN)));
    };

    req.extensions_mut().insert(auth_user);

    Ok(next.call(req).await?.map_into_boxed_body())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{claims_for, encode_claims, now, tests::user_row};
    use actix_web::test::{TestRequest, call_service, init_service};
    use actix_web::{App, cookie::Cookie, middleware::from_fn, web};

    #[test]
    fn test_user_redirected_from_every_admin_prefix() {
        for prefix in ADMIN_ONLY_PREFIXES {
            assert_eq!(decide(Some(Role::User), prefix), GuardDecision::Redirect(USER_HOME));
            let nested = format!("{prefix}/42/edit");
            assert_eq!(decide(Some(Role::User), &nested), GuardDecision::Redirect(USER_HOME));
        }
    }

    #[test]
    fn test_user_allowed_set() {
        assert_eq!(decide(Some(Role::User), "/dashboard/my-tasks"), GuardDecision::Allow);
        assert_eq!(decide(Some(Role::User), "/dashboard/my-payments/"), GuardDecision::Allow);
        assert_eq!(decide(Some(Role::User), "/dashboard/profile"), GuardDecision::Allow);
    }

    #[test]
    fn test_user_outside_allowed_set_goes_home() {
        assert_eq!(decide(Some(Role::User), "/dashboard"), GuardDecision::Redirect(USER_HOME));
        assert_eq!(decide(Some(Role::User), "/dashboard/expenses"), GuardDecision::Redirect(USER_HOME));
        assert_eq!(
            decide(Some(Role::User), "/dashboard/my-tasks-archive"),
            GuardDecision::Redirect(USER_HOME)
        );
    }

    #[test]
    fn test_admin_unrestricted() {
        for path in ["/dashboard", "/dashboard/users", "/dashboard/my-tasks", "/dashboard/clients/3"] {
            assert_eq!(decide(Some(Role::Admin), path), GuardDecision::Allow);
        }
    }

    #[test]
    fn test_no_session_goes_to_sign_in() {
        assert_eq!(
            decide(None, "/dashboard/tasks"),
            GuardDecision::SignIn {
                callback: "/dashboard/tasks".into()
            }
        );
        assert_eq!(
            sign_in_location("/dashboard/tasks"),
            "/sign-in?callbackUrl=%2Fdashboard%2Ftasks"
        );
    }

    fn cookie_for(role: &str, status: &str) -> Cookie<'static> {
        let config = Config::for_tests();
        let claims = claims_for(&user_row(role, status), now(), 3600).unwrap();
        Cookie::new("taskbit_session", encode_claims(&claims, &config.jwt_secret).unwrap())
    }

    async fn page(auth: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(auth.name)
    }

    macro_rules! dashboard_app {
        () => {
            init_service(
                App::new().app_data(Data::new(Config::for_tests())).service(
                    web::scope("/dashboard")
                        .wrap(from_fn(dashboard_guard))
                        .default_service(web::to(page)),
                ),
            )
            .await
        };
    }

    fn location<B>(resp: &ServiceResponse<B>) -> String {
        resp.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[actix_web::test]
    async fn test_user_session_is_redirected_before_render() {
        let app = dashboard_app!();
        let req = TestRequest::get()
            .uri("/dashboard/payments")
            .cookie(cookie_for("USER", "ACTIVE"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert_eq!(location(&resp), USER_HOME);
    }

    #[actix_web::test]
    async fn test_admin_session_renders() {
        let app = dashboard_app!();
        let req = TestRequest::get()
            .uri("/dashboard/users")
            .cookie(cookie_for("ADMIN", "ACTIVE"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_stale_session_renders_without_a_new_cookie() {
        let app = dashboard_app!();
        let config = Config::for_tests();
        let claims = claims_for(&user_row("USER", "ACTIVE"), now() - 3 * 24 * 60 * 60, config.session_ttl).unwrap();
        let stale = Cookie::new("taskbit_session", encode_claims(&claims, &config.jwt_secret).unwrap());
        let req = TestRequest::get().uri("/dashboard/profile").cookie(stale).to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert!(resp.response().cookies().next().is_none());
    }

    #[actix_web::test]
    async fn test_inactive_or_missing_session_goes_to_sign_in() {
        let app = dashboard_app!();
        let req = TestRequest::get()
            .uri("/dashboard/my-tasks")
            .cookie(cookie_for("USER", "INACTIVE"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert!(location(&resp).starts_with(SIGN_IN));

        let req = TestRequest::get().uri("/dashboard/tasks").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert!(location(&resp).starts_with(SIGN_IN));
    }
}
