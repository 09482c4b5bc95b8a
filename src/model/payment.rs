use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    WalletA,
    WalletB,
    BankTransfer,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Payment {
    pub id: u64,
    pub task_id: u64,
    pub task_title: String,
    pub user_id: u64,
    pub user_name: String,
    pub amount: Decimal,
    #[schema(example = "BANK_TRANSFER")]
    pub payment_type: String,
    #[schema(example = "COMPLETED")]
    pub status: String,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Selects a [`Payment`] from `payments p JOIN tasks t ON t.id = p.task_id JOIN users u ON u.id = p.user_id`.
pub const PAYMENT_COLUMNS: &str = "p.id, p.task_id, t.title AS task_title, p.user_id, \
     u.name AS user_name, p.amount, p.payment_type, p.status, p.reference, p.created_at, p.updated_at";

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_payment_type_column_text() {
        assert_eq!(PaymentType::WalletA.as_ref(), "WALLET_A");
        assert_eq!(PaymentType::from_str("BANK_TRANSFER").unwrap(), PaymentType::BankTransfer);
        let parsed: PaymentType = serde_json::from_str("\"WALLET_B\"").unwrap();
        assert_eq!(parsed, PaymentType::WalletB);
    }
}
