use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SalaryType {
    Monthly,
    Bonus,
    Overtime,
    Deduction,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SalaryStatus {
    Pending,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Salary {
    pub id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub amount: Decimal,
    #[schema(example = "MONTHLY")]
    pub salary_type: String,
    #[schema(example = "PAID")]
    pub status: String,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub month: NaiveDate,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Selects a [`Salary`] from `salaries s JOIN users u ON u.id = s.user_id`.
pub const SALARY_COLUMNS: &str = "s.id, s.user_id, u.name AS user_name, s.amount, \
     s.salary_type, s.status, s.month, s.note, s.created_at, s.updated_at";
