use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{AppError, FieldError};

pub const MIN_TITLE_LEN: usize = 3;

/// Money columns are `DECIMAL(12,2)`.
pub const MONEY_SCALE: u32 = 2;
pub const MONEY_INTEGER_DIGITS: u32 = 10;

/// Collects every field failure before answering, so a form gets all of its
/// messages at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, ok: bool, field: &str, message: &str) -> Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn title(self, field: &str, value: &str) -> Self {
        let ok = value.trim().chars().count() >= MIN_TITLE_LEN;
        self.check(ok, field, "Must be at least 3 characters")
    }

    pub fn title_opt(self, field: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.title(field, v),
            None => self,
        }
    }

    /// A money amount: greater than 0 and storable without rounding.
    pub fn amount(self, field: &str, value: Decimal) -> Self {
        let value = value.normalize();
        if value <= Decimal::ZERO {
            return self.check(false, field, "Must be greater than 0");
        }
        if value.scale() > MONEY_SCALE {
            return self.check(false, field, "Must have at most 2 decimal places");
        }
        let limit = Decimal::from(10_u64.pow(MONEY_INTEGER_DIGITS));
        self.check(value < limit, field, "Must be less than 10000000000")
    }

    pub fn amount_opt(self, field: &str, value: Option<Decimal>) -> Self {
        match value {
            Some(v) => self.amount(field, v),
            None => self,
        }
    }

    pub fn date_order(self, start: Option<NaiveDate>, due: Option<NaiveDate>) -> Self {
        let ok = match (start, due) {
            (Some(s), Some(d)) => d >= s,
            _ => true,
        };
        self.check(ok, "due_date", "Target date cannot be before the start date")
    }

    pub fn email(self, field: &str, value: &str) -> Self {
        let value = value.trim();
        let ok = match value.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !value.contains(' '),
            None => false,
        };
        self.check(ok, field, "Must be a valid email address")
    }

    pub fn min_len(self, field: &str, value: &str, min: usize) -> Self {
        let ok = value.chars().count() >= min;
        self.check(ok, field, &format!("Must be at least {min} characters"))
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(result: Result<(), AppError>) -> Vec<String> {
        match result {
            Err(AppError::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_title_and_amount_rules() {
        assert!(Validator::new()
            .title("title", "Logo")
            .amount("amount", Decimal::new(1, 2))
            .finish()
            .is_ok());

        let failed = Validator::new()
            .title("title", "  ab  ")
            .amount("amount", Decimal::ZERO)
            .finish();
        assert_eq!(fields(failed), vec!["title", "amount"]);
    }

    #[test]
    fn test_optional_fields_skip_when_absent() {
        assert!(Validator::new()
            .title_opt("title", None)
            .amount_opt("amount", None)
            .finish()
            .is_ok());
        assert_eq!(
            fields(Validator::new().amount_opt("amount", Some(Decimal::new(-5, 0))).finish()),
            vec!["amount"]
        );
    }

    #[test]
    fn test_amount_must_fit_the_money_column() {
        let messages = |value: Decimal| match Validator::new().amount("amount", value).finish() {
            Err(AppError::Validation(errors)) => errors.into_iter().map(|e| e.message).collect(),
            _ => Vec::new(),
        };

        assert_eq!(messages(Decimal::new(1, 3)), vec!["Must have at most 2 decimal places"]);
        assert_eq!(
            messages(Decimal::new(100_000_000_000, 0)),
            vec!["Must be less than 10000000000"]
        );
        assert_eq!(
            messages(Decimal::new(10_000_000_000, 0)),
            vec!["Must be less than 10000000000"]
        );
        assert!(messages(Decimal::new(9_999_999_999_99, 2)).is_empty());
        // Trailing zeros are not extra precision.
        assert!(messages(Decimal::new(12_5000, 4)).is_empty());
    }

    #[test]
    fn test_date_order() {
        let jan1 = NaiveDate::from_ymd_opt(2026, 1, 1);
        let jan9 = NaiveDate::from_ymd_opt(2026, 1, 9);
        assert!(Validator::new().date_order(jan1, jan9).finish().is_ok());
        assert!(Validator::new().date_order(jan9, jan1).finish().is_err());
        assert!(Validator::new().date_order(None, jan1).finish().is_ok());
    }

    #[test]
    fn test_email_shape() {
        assert!(Validator::new().email("email", "a@b.io").finish().is_ok());
        assert!(Validator::new().email("email", "a@b").finish().is_err());
        assert!(Validator::new().email("email", "@b.io").finish().is_err());
    }
}
