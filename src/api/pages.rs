//! `/dashboard` views. Every request here has already passed the route guard,
//! which put the caller's [`AuthUser`] into the request extensions.

use actix_web::{HttpResponse, ResponseError, web};
use serde::Serialize;
use sqlx::MySqlPool;

use crate::{
    api::{
        expenses::fetch_expenses, payments::fetch_payments, salaries::fetch_salaries,
        tasks::fetch_tasks, users::{fetch_user, fetch_users},
    },
    auth::{
        auth::AuthUser,
        guard::{GuardDecision, decide},
    },
    error::{AppError, AppResult},
    model::role::Role,
    utils::listing::ListQuery,
};

pub const SECTIONS: &[&str] = &[
    "/dashboard/tasks",
    "/dashboard/payments",
    "/dashboard/users",
    "/dashboard/salaries",
    "/dashboard/expenses",
    "/dashboard/my-tasks",
    "/dashboard/my-payments",
    "/dashboard/profile",
];

#[derive(Debug, Serialize)]
pub struct DashboardHome {
    pub name: String,
    pub role: Role,
    pub sections: Vec<&'static str>,
}

/// Sections the guard would let `role` open.
pub fn sections_for(role: Role) -> Vec<&'static str> {
    SECTIONS
        .iter()
        .copied()
        .filter(|path| decide(Some(role), path) == GuardDecision::Allow)
        .collect()
}

pub async fn home(auth: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(DashboardHome {
        sections: sections_for(auth.role),
        name: auth.name,
        role: auth.role,
    })
}

pub async fn tasks_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(fetch_tasks(pool.get_ref(), &query, None).await?))
}

pub async fn payments_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(fetch_payments(pool.get_ref(), &query, None).await?))
}

pub async fn users_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(fetch_users(pool.get_ref(), &query).await?))
}

pub async fn salaries_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(fetch_salaries(pool.get_ref(), &query, None).await?))
}

pub async fn expenses_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(fetch_expenses(pool.get_ref(), &query).await?))
}

/// Always the caller's own tasks, admins included.
pub async fn my_tasks_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch_tasks(pool.get_ref(), &query, Some(auth.user_id)).await?))
}

pub async fn my_payments_page(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch_payments(pool.get_ref(), &query, Some(auth.user_id)).await?))
}

pub async fn profile_page(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch_user(pool.get_ref(), auth.user_id).await?))
}

pub async fn access_denied() -> HttpResponse {
    AppError::AccessDenied.error_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ACCESS_DENIED;
    use actix_web::test::{TestRequest, call_service, init_service, read_body_json};
    use actix_web::{App, http::StatusCode};

    #[test]
    fn test_user_sections_are_only_their_own_views() {
        assert_eq!(
            sections_for(Role::User),
            vec!["/dashboard/my-tasks", "/dashboard/my-payments", "/dashboard/profile"]
        );
        assert_eq!(sections_for(Role::Admin).len(), SECTIONS.len());
    }

    #[actix_web::test]
    async fn test_access_denied_page_body() {
        let app = init_service(
            App::new().route("/access-denied", web::get().to(access_denied)),
        )
        .await;
        let req = TestRequest::get().uri("/access-denied").to_request();
        let res = call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let body: serde_json::Value = read_body_json(res).await;
        assert_eq!(body["message"], ACCESS_DENIED);
    }
}
