//! Query-string driven listings: search, status, date bucket and page turn
//! into one COUNT query and one page query sharing the same WHERE clause.

use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, mysql::MySqlRow};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};
use crate::model::{expense::Expense, payment::Payment, salary::Salary, task::Task, user::User};
use crate::utils::db_utils::{SqlValue, bind_values};

pub const PAGE_SIZE: u32 = 10;

/// Relative creation-time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum DateBucket {
    #[serde(rename = "last-day")]
    LastDay,
    #[serde(rename = "last-week")]
    LastWeek,
    #[serde(rename = "last-month")]
    LastMonth,
    #[serde(rename = "last-6months")]
    LastSixMonths,
    #[serde(rename = "last-year")]
    LastYear,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl DateBucket {
    pub fn lower_bound(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            DateBucket::LastDay => Some(now - Duration::days(1)),
            DateBucket::LastWeek => Some(now - Duration::days(7)),
            DateBucket::LastMonth => now.checked_sub_months(Months::new(1)),
            DateBucket::LastSixMonths => now.checked_sub_months(Months::new(6)),
            DateBucket::LastYear => now.checked_sub_months(Months::new(12)),
            DateBucket::All => None,
        }
    }

    pub fn contains(self, now: DateTime<Utc>, created_at: DateTime<Utc>) -> bool {
        self.lower_bound(now).is_none_or(|bound| created_at >= bound)
    }
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive match on the entity's title or name
    pub search: Option<String>,
    /// 1-based page number
    pub page: Option<u32>,
    /// Entity status, or `ALL`
    pub status: Option<String>,
    /// last-day | last-week | last-month | last-6months | last-year | all
    #[param(value_type = Option<String>)]
    pub date: Option<DateBucket>,
}

impl ListQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn bucket(&self) -> DateBucket {
        self.date.unwrap_or_default()
    }

    /// `ALL` and a missing status mean no filter; anything else must parse.
    pub fn status_filter<S: FromStr>(&self) -> AppResult<Option<S>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) if s.eq_ignore_ascii_case("ALL") => Ok(None),
            Some(s) => S::from_str(&s.to_uppercase())
                .map(Some)
                .map_err(|_| AppError::invalid("status", "Unknown status")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub count: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(count: i64, page: u32) -> Self {
        let limit = PAGE_SIZE as i64;
        Self {
            count,
            page,
            limit: PAGE_SIZE,
            total_pages: (count + limit - 1) / limit,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    TaskPage = Paginated<Task>,
    PaymentPage = Paginated<Payment>,
    SalaryPage = Paginated<Salary>,
    ExpensePage = Paginated<Expense>,
    UserPage = Paginated<User>
)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Accumulates WHERE conditions and their bound values.
#[derive(Debug, Default)]
pub struct SqlFilter {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Condition without placeholders, e.g. `t.is_deleted = 0`.
    pub fn raw(mut self, condition: &str) -> Self {
        self.conditions.push(condition.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.conditions.push(format!("{column} = ?"));
        self.values.push(value.into());
        self
    }

    pub fn eq_opt<T: Into<SqlValue>>(self, column: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn search(mut self, columns: &[&str], term: Option<&str>) -> Self {
        let Some(term) = term else {
            return self;
        };
        let like = format!("%{}%", escape_like(&term.to_lowercase()));
        let ors = columns
            .iter()
            .map(|c| format!("LOWER({c}) LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.conditions.push(format!("({ors})"));
        for _ in columns {
            self.values.push(SqlValue::String(like.clone()));
        }
        self
    }

    pub fn created_since(self, column: &str, bound: Option<DateTime<Utc>>) -> Self {
        match bound {
            Some(b) => {
                let mut this = self;
                this.conditions.push(format!("{column} >= ?"));
                this.values.push(SqlValue::DateTime(b));
                this
            }
            None => self,
        }
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// Shape of one listing: what to select, from where, and the newest-first key.
#[derive(Debug, Clone, Copy)]
pub struct ListSource {
    pub columns: &'static str,
    pub from: &'static str,
    pub created_at: &'static str,
    pub id: &'static str,
}

#[derive(Debug)]
pub struct ListSql {
    pub count_sql: String,
    pub data_sql: String,
    pub values: Vec<SqlValue>,
    pub page: u32,
}

impl ListSql {
    pub fn new(source: ListSource, filter: SqlFilter, page: u32) -> Self {
        let where_clause = filter.where_clause();
        let count_sql = format!("SELECT COUNT(*) FROM {} {}", source.from, where_clause);
        let data_sql = format!(
            "SELECT {} FROM {} {} ORDER BY {} DESC, {} DESC LIMIT ? OFFSET ?",
            source.columns, source.from, where_clause, source.created_at, source.id
        );
        Self {
            count_sql,
            data_sql,
            values: filter.values,
            page,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * PAGE_SIZE as u64
    }
}

pub async fn fetch_page<T>(pool: &MySqlPool, list: ListSql) -> AppResult<Paginated<T>>
where
    T: for<'r> sqlx::FromRow<'r, MySqlRow> + Send + Unpin,
{
    debug!(sql = %list.count_sql, bindings = ?list.values, "Counting rows");

    let count = bind_values!(sqlx::query_scalar::<_, i64>(&list.count_sql), &list.values)
        .fetch_one(pool)
        .await?;

    debug!(sql = %list.data_sql, page = list.page, "Fetching page");

    let data = bind_values!(sqlx::query_as::<_, T>(&list.data_sql), &list.values)
        .bind(PAGE_SIZE as u64)
        .bind(list.offset())
        .fetch_all(pool)
        .await?;

    Ok(Paginated {
        data,
        meta: PageMeta::new(count, list.page),
    })
}
