use serde::Serialize;
use utoipa::ToSchema;

/// Client-side query groups a mutation makes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QueryGroup {
    Tasks,
    TasksCalculation,
    DashboardForCurrentMonth,
    Payments,
    Salaries,
    Expenses,
    Users,
    Profile,
}

pub const TASK_CHANGED: &[QueryGroup] = &[
    QueryGroup::Tasks,
    QueryGroup::TasksCalculation,
    QueryGroup::DashboardForCurrentMonth,
];

pub const PAYMENT_CHANGED: &[QueryGroup] = &[
    QueryGroup::Payments,
    QueryGroup::Tasks,
    QueryGroup::TasksCalculation,
    QueryGroup::DashboardForCurrentMonth,
];

pub const SALARY_CHANGED: &[QueryGroup] = &[QueryGroup::Salaries, QueryGroup::DashboardForCurrentMonth];

pub const EXPENSE_CHANGED: &[QueryGroup] = &[QueryGroup::Expenses, QueryGroup::DashboardForCurrentMonth];

pub const USER_CHANGED: &[QueryGroup] = &[QueryGroup::Users, QueryGroup::Tasks, QueryGroup::Salaries];

pub const PROFILE_CHANGED: &[QueryGroup] = &[QueryGroup::Profile, QueryGroup::Users];

#[derive(Debug, Serialize)]
pub struct MutationResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub invalidate: Vec<QueryGroup>,
}

impl<T: Serialize> MutationResponse<T> {
    pub fn new(message: &str, data: Option<T>, stale: &[QueryGroup]) -> Self {
        Self {
            message: message.to_string(),
            data,
            invalidate: stale.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_names_on_the_wire() {
        let json = serde_json::to_value(PAYMENT_CHANGED).unwrap();
        assert_eq!(
            json,
            serde_json::json!(["payments", "tasks", "tasks-calculation", "dashboard-for-current-month"])
        );
    }

    #[test]
    fn test_response_shape() {
        let resp = MutationResponse::<()>::new("Expense deleted", None, EXPENSE_CHANGED);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["message"], "Expense deleted");
        assert!(json["data"].is_null());
        assert_eq!(json["invalidate"][0], "expenses");
    }
}
