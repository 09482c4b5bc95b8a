use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use sqlx::{Executor, MySql};

use crate::error::AppError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Null,
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTime(v)
    }
}

/// Binds every [`SqlValue`] in order onto any sqlx query builder.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                $crate::utils::db_utils::SqlValue::String(v) => query.bind(v.clone()),
                $crate::utils::db_utils::SqlValue::U64(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::Decimal(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::Date(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::DateTime(v) => query.bind(*v),
                $crate::utils::db_utils::SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }};
}
pub(crate) use bind_values;

/// Tells a missing field (`None`) apart from an explicit `null` (`Some(None)`).
/// Use with `#[serde(default, deserialize_with = "nullable")]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Column names are `&'static str` so only code can choose them; request
/// payloads only ever reach the bound values.
#[derive(Debug)]
pub struct UpdateBuilder {
    table: &'static str,
    sets: Vec<(&'static str, SqlValue)>,
}

impl UpdateBuilder {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            sets: Vec::new(),
        }
    }

    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.sets.push((column, value.into()));
        self
    }

    pub fn set_opt<T: Into<SqlValue>>(self, column: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// `Some(None)` writes NULL, `None` leaves the column alone.
    pub fn set_nullable<T: Into<SqlValue>>(
        self,
        column: &'static str,
        value: Option<Option<T>>,
    ) -> Self {
        match value {
            Some(Some(v)) => self.set(column, v),
            Some(None) => self.set(column, SqlValue::Null),
            None => self,
        }
    }

    /// `condition` is the WHERE body; `condition_values` fill its placeholders.
    pub fn build(
        self,
        condition: &str,
        condition_values: Vec<SqlValue>,
    ) -> Result<SqlUpdate, AppError> {
        if self.sets.is_empty() {
            return Err(AppError::invalid("body", "No fields provided for update"));
        }

        let set_clause = self
            .sets
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!("UPDATE {} SET {} WHERE {}", self.table, set_clause, condition);

        let mut values: Vec<SqlValue> = self.sets.into_iter().map(|(_, v)| v).collect();
        values.extend(condition_values);

        Ok(SqlUpdate { sql, values })
    }
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'c, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let query = bind_values!(sqlx::query(&update.sql), &update.values);
    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}
