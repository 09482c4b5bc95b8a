pub mod dashboard;
pub mod expenses;
pub mod pages;
pub mod payments;
pub mod salaries;
pub mod tasks;
pub mod users;
