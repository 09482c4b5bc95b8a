use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::model::{role::Role, user::UserStatus};

#[derive(Deserialize, ToSchema)]
pub struct SignInReqDto {
    #[schema(example = "rahim@taskbit.io")]
    pub email: String,
    #[schema(example = "secret123")]
    pub password: String,
    /// Role picked on the sign-in form. Only used for logging; the stored
    /// profile decides the session role.
    #[schema(example = "USER")]
    pub role: Option<String>,
}

/// Credential row, the only struct that carries the password hash.
#[derive(Debug, Clone, FromRow)]
pub struct UserSql {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub status: String,
    pub phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub wallet_a_number: Option<String>,
    pub wallet_b_number: Option<String>,
}

/// Session token claims. The token carries the whole profile so the route
/// guard never touches the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Claims {
    /// email
    pub sub: String,
    pub user_id: u64,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
    pub phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub wallet_a_number: Option<String>,
    pub wallet_b_number: Option<String>,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: usize,
    pub user: Claims,
}
