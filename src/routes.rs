use crate::{
    api::{dashboard, expenses, pages, payments, salaries, tasks, users},
    auth::{guard::dashboard_guard, handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Result, anyhow};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiters, built once and shared by every worker.
#[derive(Clone)]
pub struct Limiters {
    pub sign_in: Limiter,
    pub api: Limiter,
}

fn build_limiter(requests_per_min: u32) -> Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min} per minute"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

impl Limiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            sign_in: build_limiter(config.rate_sign_in_per_min)?,
            api: build_limiter(config.rate_api_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/sign-in")
                    .wrap(limiters.sign_in.clone())
                    .route(web::post().to(handlers::sign_in)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.sign_in.clone())
                    .route(web::post().to(handlers::refresh)),
            )
            .service(web::resource("/sign-out").route(web::post().to(handlers::sign_out)))
            .service(web::resource("/session").route(web::get().to(handlers::session))),
    );

    // Protected JSON API
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(limiters.api.clone())
            .service(
                web::resource("/me")
                    .route(web::get().to(users::get_profile))
                    .route(web::put().to(users::update_profile)),
            )
            .service(
                web::scope("/tasks")
                    .service(
                        web::resource("")
                            .route(web::get().to(tasks::list_tasks))
                            .route(web::post().to(tasks::create_task)),
                    )
                    // before /{id}
                    .service(
                        web::resource("/calculation").route(web::get().to(tasks::task_calculation)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(tasks::get_task))
                            .route(web::put().to(tasks::update_task))
                            .route(web::delete().to(tasks::delete_task)),
                    )
                    .service(
                        web::resource("/{id}/status").route(web::put().to(tasks::update_task_status)),
                    )
                    .service(
                        web::resource("/{id}/balance").route(web::get().to(tasks::task_balance)),
                    ),
            )
            .service(
                web::scope("/payments")
                    .service(
                        web::resource("")
                            .route(web::get().to(payments::list_payments))
                            .route(web::post().to(payments::create_payment)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payments::get_payment))
                            .route(web::put().to(payments::update_payment))
                            .route(web::delete().to(payments::delete_payment)),
                    ),
            )
            .service(
                web::scope("/salaries")
                    .service(
                        web::resource("")
                            .route(web::get().to(salaries::list_salaries))
                            .route(web::post().to(salaries::create_salary)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(salaries::get_salary))
                            .route(web::put().to(salaries::update_salary))
                            .route(web::delete().to(salaries::delete_salary)),
                    ),
            )
            .service(
                web::scope("/expenses")
                    .service(
                        web::resource("")
                            .route(web::get().to(expenses::list_expenses))
                            .route(web::post().to(expenses::create_expense)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(expenses::get_expense))
                            .route(web::put().to(expenses::update_expense))
                            .route(web::delete().to(expenses::delete_expense)),
                    ),
            )
            .service(
                web::scope("/users")
                    .service(
                        web::resource("")
                            .route(web::get().to(users::list_users))
                            .route(web::post().to(users::create_user)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(users::get_user))
                            .route(web::put().to(users::update_user))
                            .route(web::delete().to(users::delete_user)),
                    ),
            )
            .service(
                web::resource("/dashboard/current-month")
                    .route(web::get().to(dashboard::current_month)),
            ),
    );

    // Guarded dashboard views
    cfg.service(
        web::scope("/dashboard")
            .wrap(from_fn(dashboard_guard))
            .service(web::resource("").route(web::get().to(pages::home)))
            .service(web::resource("/tasks").route(web::get().to(pages::tasks_page)))
            .service(web::resource("/payments").route(web::get().to(pages::payments_page)))
            .service(web::resource("/users").route(web::get().to(pages::users_page)))
            .service(web::resource("/salaries").route(web::get().to(pages::salaries_page)))
            .service(web::resource("/expenses").route(web::get().to(pages::expenses_page)))
            .service(web::resource("/my-tasks").route(web::get().to(pages::my_tasks_page)))
            .service(web::resource("/my-payments").route(web::get().to(pages::my_payments_page)))
            .service(web::resource("/profile").route(web::get().to(pages::profile_page))),
    );

    cfg.service(web::resource("/access-denied").route(web::get().to(pages::access_denied)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{claims_for, encode_claims, now, tests::user_row};
    use actix_web::test::{TestRequest, call_and_read_body_json, call_service, init_service};
    use actix_web::{App, http::StatusCode, http::header, web::Data};
    use sqlx::mysql::MySqlPoolOptions;
    use std::net::SocketAddr;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn bearer(role: &str) -> (&'static str, String) {
        let config = Config::for_tests();
        let claims = claims_for(&user_row(role, "ACTIVE"), now(), 3600).unwrap();
        let token = encode_claims(&claims, &config.jwt_secret).unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    macro_rules! taskbit_app {
        () => {{
            let config = Config::for_tests();
            let limiters = Limiters::from_config(&config).unwrap();
            // Never connects: these requests are answered before any query runs.
            let pool = MySqlPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap();
            init_service(
                App::new()
                    .app_data(Data::new(pool))
                    .app_data(Data::new(config.clone()))
                    .configure(|cfg| configure(cfg, &config, &limiters)),
            )
            .await
        }};
    }

    #[test]
    fn test_zero_rate_still_builds_a_limiter() {
        assert!(build_limiter(0).is_ok());
        assert!(build_limiter(100_000).is_ok());
    }

    #[actix_web::test]
    async fn test_api_requires_session() {
        let app = taskbit_app!();
        let req = TestRequest::get()
            .uri("/api/tasks")
            .peer_addr(peer())
            .to_request();
        let res = call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_user_is_refused_admin_api() {
        let app = taskbit_app!();
        let req = TestRequest::get()
            .uri("/api/expenses")
            .insert_header(bearer("USER"))
            .peer_addr(peer())
            .to_request();
        let res = call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_user_redirected_from_admin_dashboard() {
        let app = taskbit_app!();
        let req = TestRequest::get()
            .uri("/dashboard/payments")
            .insert_header(bearer("USER"))
            .to_request();
        let res = call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(
            res.headers().get(header::LOCATION).unwrap(),
            "/dashboard/my-tasks"
        );
    }

    #[actix_web::test]
    async fn test_dashboard_home_lists_sections() {
        let app = taskbit_app!();
        let req = TestRequest::get()
            .uri("/dashboard")
            .insert_header(bearer("ADMIN"))
            .to_request();
        let body: serde_json::Value = call_and_read_body_json(&app, req).await;
        assert_eq!(body["role"], "ADMIN");
        assert_eq!(body["sections"][0], "/dashboard/tasks");
    }
}
