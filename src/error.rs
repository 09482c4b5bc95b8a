//! Error taxonomy shared by every handler.
//!
//! Validation and domain-rule failures reach the user with their own message.
//! Missing rows and failed authorization both collapse to "Access Denied", and
//! internal failures are logged here and answered with a generic message.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

pub const ACCESS_DENIED: &str = "Access Denied";
pub const GENERIC_FAILURE: &str = "Something went wrong, Contact with system admin";

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {} errors", .0.len())]
    Validation(Vec<FieldError>),

    #[error("Payment exceeds the remaining task balance of {remaining}")]
    Overpayment { remaining: Decimal },

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Forbidden")]
    AccessDenied,

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid(field: &str, message: &str) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Overpayment { .. } => "overpayment",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthenticated | AppError::AccessDenied | AppError::NotFound => {
                "access_denied"
            }
            AppError::Database(_) | AppError::Token(_) | AppError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Overpayment { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidTransition(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Token(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Validation(details) => json!({
                "error": self.code(),
                "message": "Invalid input",
                "details": details,
            }),
            AppError::Overpayment { remaining } => json!({
                "error": self.code(),
                "message": self.to_string(),
                "remaining": remaining,
            }),
            AppError::InvalidTransition(msg) | AppError::Conflict(msg) => json!({
                "error": self.code(),
                "message": msg,
            }),
            AppError::Unauthenticated | AppError::AccessDenied | AppError::NotFound => json!({
                "error": self.code(),
                "message": ACCESS_DENIED,
            }),
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                json!({ "error": self.code(), "message": GENERIC_FAILURE })
            }
            AppError::Token(e) => {
                tracing::error!(error = %e, "Token error");
                json!({ "error": self.code(), "message": GENERIC_FAILURE })
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "Internal error");
                json!({ "error": self.code(), "message": GENERIC_FAILURE })
            }
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_of(err: AppError) -> serde_json::Value {
        let bytes = to_bytes(err.error_response().into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn test_not_found_and_forbidden_collapse_to_access_denied() {
        for err in [AppError::NotFound, AppError::AccessDenied, AppError::Unauthenticated] {
            let body = body_of(err).await;
            assert_eq!(body["error"], "access_denied");
            assert_eq!(body["message"], ACCESS_DENIED);
        }
    }

    #[actix_web::test]
    async fn test_internal_errors_do_not_leak_details() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused to 10.0.0.3:3306"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_of(err).await;
        assert_eq!(body["message"], GENERIC_FAILURE);
        assert!(!body.to_string().contains("10.0.0.3"));
    }

    #[actix_web::test]
    async fn test_overpayment_is_distinguishable() {
        let err = AppError::Overpayment {
            remaining: Decimal::new(200, 0),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_of(err).await;
        assert_eq!(body["error"], "overpayment");
        assert!(body["message"].as_str().unwrap().contains("200"));
    }

    #[test]
    fn test_validation_is_bad_request() {
        let err = AppError::invalid("title", "Title must be at least 3 characters");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
