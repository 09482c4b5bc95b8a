use crate::api::dashboard::CurrentMonthSummary;
use crate::api::expenses::{CreateExpense, UpdateExpense};
use crate::api::payments::{CreatePayment, UpdatePayment};
use crate::api::salaries::{CreateSalary, UpdateSalary};
use crate::api::tasks::{CreateTask, TaskBalance, TaskCalculation, UpdateTask, UpdateTaskStatus};
use crate::api::users::{CreateUser, UpdateProfile, UpdateUser};
use crate::error::FieldError;
use crate::model::{
    expense::Expense,
    payment::{Payment, PaymentStatus, PaymentType},
    role::Role,
    salary::{Salary, SalaryStatus, SalaryType},
    task::{Task, TaskStatus},
    user::{User, UserStatus},
};
use crate::models::{Claims, SessionResponse, SignInReqDto};
use crate::utils::invalidation::QueryGroup;
use crate::utils::listing::{
    DateBucket, ExpensePage, PageMeta, PaymentPage, SalaryPage, TaskPage, UserPage,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Taskbit API",
        version = "1.0.0",
        description = r#"
## Taskbit

Task management backend with role-based dashboards.

### Key Features
- **Tasks**: create, assign, move through PENDING → IN_PROGRESS → SUBMITTED → COMPLETED
- **Payments**: pay assignees against a task, never beyond the task amount
- **Salaries** and **Expenses** bookkeeping
- **Users**: admin-managed accounts with payout details

### Security
Sessions are signed tokens sent as the `taskbit_session` cookie or a
`Authorization: Bearer` header. ADMIN sees everything; USER only their own
tasks, payments and salaries.

### Listings
Every list endpoint takes `search`, `status` (or `ALL`), `date`
(`last-day`, `last-week`, `last-month`, `last-6months`, `last-year`, `all`)
and `page`. Pages hold 10 rows, newest first.

### Mutations
Successful writes answer `{ message, data, invalidate }` where `invalidate`
names the query groups to refetch.
"#,
    ),
    paths(
        crate::auth::handlers::sign_in,
        crate::auth::handlers::refresh,
        crate::auth::handlers::session,
        crate::auth::handlers::sign_out,

        crate::api::tasks::list_tasks,
        crate::api::tasks::get_task,
        crate::api::tasks::create_task,
        crate::api::tasks::update_task,
        crate::api::tasks::update_task_status,
        crate::api::tasks::delete_task,
        crate::api::tasks::task_calculation,
        crate::api::tasks::task_balance,

        crate::api::payments::list_payments,
        crate::api::payments::get_payment,
        crate::api::payments::create_payment,
        crate::api::payments::update_payment,
        crate::api::payments::delete_payment,

        crate::api::salaries::list_salaries,
        crate::api::salaries::get_salary,
        crate::api::salaries::create_salary,
        crate::api::salaries::update_salary,
        crate::api::salaries::delete_salary,

        crate::api::expenses::list_expenses,
        crate::api::expenses::get_expense,
        crate::api::expenses::create_expense,
        crate::api::expenses::update_expense,
        crate::api::expenses::delete_expense,

        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::create_user,
        crate::api::users::update_user,
        crate::api::users::delete_user,
        crate::api::users::get_profile,
        crate::api::users::update_profile,

        crate::api::dashboard::current_month
    ),
    components(
        schemas(
            SignInReqDto,
            SessionResponse,
            Claims,
            Role,
            FieldError,
            QueryGroup,
            DateBucket,
            PageMeta,
            Task,
            TaskStatus,
            CreateTask,
            UpdateTask,
            UpdateTaskStatus,
            TaskCalculation,
            TaskBalance,
            TaskPage,
            Payment,
            PaymentType,
            PaymentStatus,
            CreatePayment,
            UpdatePayment,
            PaymentPage,
            Salary,
            SalaryType,
            SalaryStatus,
            CreateSalary,
            UpdateSalary,
            SalaryPage,
            Expense,
            CreateExpense,
            UpdateExpense,
            ExpensePage,
            User,
            UserStatus,
            CreateUser,
            UpdateUser,
            UpdateProfile,
            UserPage,
            CurrentMonthSummary
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Session issue, refresh and sign-out"),
        (name = "Tasks", description = "Task management APIs"),
        (name = "Payments", description = "Payments against tasks"),
        (name = "Salaries", description = "Salary records"),
        (name = "Expenses", description = "Company expenses"),
        (name = "Users", description = "Accounts and self-service profile"),
        (name = "Dashboard", description = "Aggregates for the admin dashboard"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_core_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in ["/auth/sign-in", "/api/tasks/{task_id}/status", "/api/payments", "/api/me"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
