use crate::{
    auth::{jwt::verify_token, session::token_from_request},
    config::Config,
    error::AppError,
    model::{role::Role, user::UserStatus},
    models::Claims,
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    /// Inactive accounts hold no session even while their token is unexpired.
    pub fn from_claims(claims: &Claims) -> Option<Self> {
        if claims.status != UserStatus::Active {
            return None;
        }
        Some(AuthUser {
            user_id: claims.user_id,
            email: claims.sub.clone(),
            name: claims.name.clone(),
            role: claims.role,
        })
    }

    fn resolve(req: &HttpRequest) -> Result<Self, AppError> {
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return Ok(user.clone());
        }

        let config = req
            .app_data::<Data<Config>>()
            .ok_or_else(|| anyhow::anyhow!("Config missing"))?;

        let token = token_from_request(req, &config.session_cookie_name)
            .ok_or(AppError::Unauthenticated)?;

        let claims =
            verify_token(&token, &config.jwt_secret).map_err(|_| AppError::Unauthenticated)?;

        AuthUser::from_claims(&claims).ok_or(AppError::Unauthenticated)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::AccessDenied)
        }
    }

    pub fn require_self_or_admin(&self, user_id: u64) -> Result<(), AppError> {
        if self.is_admin() || self.user_id == user_id {
            Ok(())
        } else {
            Err(AppError::AccessDenied)
        }
    }

    /// Listing scope: admins see every row, users only their own.
    pub fn scope(&self) -> Option<u64> {
        if self.is_admin() {
            None
        } else {
            Some(self.user_id)
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(AuthUser::resolve(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{claims_for, encode_claims, now, tests::user_row};
    use actix_web::test::{TestRequest, call_and_read_body, call_service, init_service};
    use actix_web::{App, HttpResponse, web};

    async fn whoami(auth: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(auth.role.to_string())
    }

    fn token(role: &str, status: &str) -> String {
        let config = Config::for_tests();
        let claims = claims_for(&user_row(role, status), now(), 3600).unwrap();
        encode_claims(&claims, &config.jwt_secret).unwrap()
    }

    #[actix_web::test]
    async fn test_extractor_reads_bearer_token() {
        let app = init_service(
            App::new()
                .app_data(Data::new(Config::for_tests()))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token("ADMIN", "ACTIVE"))))
            .to_request();
        let body = call_and_read_body(&app, req).await;
        assert_eq!(body, web::Bytes::from_static(b"ADMIN"));
    }

    #[actix_web::test]
    async fn test_extractor_rejects_missing_and_inactive() {
        let app = init_service(
            App::new()
                .app_data(Data::new(Config::for_tests()))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = TestRequest::get().uri("/whoami").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 401);

        let req = TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token("USER", "INACTIVE"))))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[test]
    fn test_role_checks() {
        let user = AuthUser {
            user_id: 7,
            email: "u@taskbit.io".into(),
            name: "U".into(),
            role: Role::User,
        };
        assert!(user.require_admin().is_err());
        assert!(user.require_self_or_admin(7).is_ok());
        assert!(user.require_self_or_admin(8).is_err());
        assert_eq!(user.scope(), Some(7));
    }
}
