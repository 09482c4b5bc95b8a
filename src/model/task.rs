use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::role::Role;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Submitted,
    Completed,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Submitted => 2,
            TaskStatus::Completed => 3,
        }
    }

    /// Admins may set any status. Assignees may only step forward once and
    /// never close a task themselves.
    pub fn can_transition(self, to: TaskStatus, role: Role) -> bool {
        if role.is_admin() {
            return true;
        }
        to != TaskStatus::Completed && to.rank() == self.rank() + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "title": "Landing page copy",
        "description": "Write the hero and pricing sections",
        "amount": "1000.00",
        "status": "IN_PROGRESS",
        "assignee_id": 7,
        "assignee_name": "Rahim Uddin",
        "start_date": "2026-01-01",
        "due_date": "2026-01-10",
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-02T00:00:00Z"
    })
)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    #[schema(example = "PENDING")]
    pub status: String,
    pub assignee_id: Option<u64>,
    pub assignee_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Selects a [`Task`] from `tasks t LEFT JOIN users u ON u.id = t.assignee_id`.
pub const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.amount, t.status, \
     t.assignee_id, u.name AS assignee_name, t.start_date, t.due_date, t.created_at, t.updated_at";
