use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
}

/// Public user profile. The password hash never leaves the auth module.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 7,
        "name": "Rahim Uddin",
        "email": "rahim@taskbit.io",
        "role": "USER",
        "status": "ACTIVE",
        "phone": "+8801712345678",
        "bank_name": "City Bank",
        "bank_account_number": "1234567890",
        "wallet_a_number": "01712345678",
        "wallet_b_number": null,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z"
    })
)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[schema(example = "USER")]
    pub role: String,
    #[schema(example = "ACTIVE")]
    pub status: String,
    pub phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub wallet_a_number: Option<String>,
    pub wallet_b_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str = "id, name, email, role, status, phone, bank_name, \
     bank_account_number, wallet_a_number, wallet_b_number, created_at, updated_at";
