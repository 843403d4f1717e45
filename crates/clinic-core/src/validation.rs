//! Field validators shared by the managers.
//!
//! Every check returns a [`ValidationError`] naming the offending field, so
//! the presentation layer can point at the input that needs correcting.
//! Optional fields (`Option<&str>`) accept `None` and blank strings.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

/// A rejected input value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Shortest accepted password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Appointment length bounds, in minutes.
pub const MIN_APPOINTMENT_MINUTES: u32 = 5;
pub const MAX_APPOINTMENT_MINUTES: u32 = 480;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

// Optional country code, then 3-3-4 digits with common separators.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+\d{1,3}\s?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}$").unwrap()
});

static EXTERNAL_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]{3,32}$").unwrap());

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_.-]{2,31}$").unwrap());

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Require a non-blank value; returns it trimmed.
pub fn required<'a>(field: &str, value: &'a str) -> ValidationResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, format!("{} is required", field)));
    }
    Ok(trimmed)
}

/// Limit a value to `max` characters.
pub fn max_length(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max),
        ));
    }
    Ok(())
}

pub fn email(field: &str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(v) if !is_blank(value) && !EMAIL_PATTERN.is_match(v.trim()) => {
            Err(ValidationError::new(field, "invalid email format"))
        }
        _ => Ok(()),
    }
}

pub fn phone(field: &str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(v) if !is_blank(value) && !PHONE_PATTERN.is_match(v.trim()) => {
            Err(ValidationError::new(field, "invalid phone number format"))
        }
        _ => Ok(()),
    }
}

/// Parse an ISO calendar date (`YYYY-MM-DD`).
pub fn iso_date(field: &str, value: &str) -> ValidationResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::new(field, "expected a date in YYYY-MM-DD format"))
}

/// Check that `date` lies within the inclusive bounds.
pub fn date_within(
    field: &str,
    date: NaiveDate,
    min: Option<NaiveDate>,
    max: Option<NaiveDate>,
) -> ValidationResult<()> {
    if let Some(min) = min {
        if date < min {
            return Err(ValidationError::new(field, format!("must not be before {}", min)));
        }
    }
    if let Some(max) = max {
        if date > max {
            return Err(ValidationError::new(field, format!("must not be after {}", max)));
        }
    }
    Ok(())
}

/// Date of birth: not in the future and not before 1900-01-01.
pub fn date_of_birth(field: &str, date: NaiveDate, today: NaiveDate) -> ValidationResult<()> {
    let earliest = NaiveDate::from_ymd_opt(1900, 1, 1);
    date_within(field, date, earliest, Some(today))
}

/// Parse a number and check the optional bounds.
pub fn numeric(field: &str, value: &str, min: Option<f64>, max: Option<f64>) -> ValidationResult<f64> {
    let number = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| ValidationError::new(field, "must be a number"))?;

    if let Some(min) = min {
        if number < min {
            return Err(ValidationError::new(field, format!("must be at least {}", min)));
        }
    }
    if let Some(max) = max {
        if number > max {
            return Err(ValidationError::new(field, format!("must be at most {}", max)));
        }
    }
    Ok(number)
}

/// External identifiers (insurance or national numbers).
pub fn external_id(field: &str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(v) if !is_blank(value) && !EXTERNAL_ID_PATTERN.is_match(v.trim()) => Err(
            ValidationError::new(field, "must be 3-32 letters, digits or '-'"),
        ),
        _ => Ok(()),
    }
}

pub fn username(value: &str) -> ValidationResult<()> {
    if !USERNAME_PATTERN.is_match(value) {
        return Err(ValidationError::new(
            "username",
            "must be 3-32 lowercase letters, digits, '.', '_' or '-', starting with a letter",
        ));
    }
    Ok(())
}

pub fn password(value: &str) -> ValidationResult<()> {
    if value.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
    Ok(())
}

pub fn appointment_duration(minutes: u32) -> ValidationResult<()> {
    if !(MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
        return Err(ValidationError::new(
            "duration_minutes",
            format!(
                "must be between {} and {} minutes",
                MIN_APPOINTMENT_MINUTES, MAX_APPOINTMENT_MINUTES
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_required() {
        assert_eq!(required("name", "  Jane  ").unwrap(), "Jane");
        let err = required("name", "   ").unwrap_err();
        assert_eq!(err.field, "name");
        assert_eq!(err.message, "name is required");
    }

    #[test]
    fn test_email() {
        assert!(email("email", None).is_ok());
        assert!(email("email", Some("")).is_ok());
        assert!(email("email", Some("jane.doe@example.org")).is_ok());
        assert!(email("email", Some("jane.doe@")).is_err());
        assert!(email("email", Some("not an email")).is_err());
    }

    #[test]
    fn test_phone() {
        assert!(phone("phone", None).is_ok());
        assert!(phone("phone", Some("555-123-4567")).is_ok());
        assert!(phone("phone", Some("(555) 123-4567")).is_ok());
        assert!(phone("phone", Some("+1 555.123.4567")).is_ok());
        assert!(phone("phone", Some("12345")).is_err());
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(
            iso_date("dob", "1990-01-01").unwrap(),
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()
        );
        assert!(iso_date("dob", "01/01/1990").is_err());
        assert!(iso_date("dob", "1990-02-30").is_err());
    }

    #[test]
    fn test_date_of_birth_bounds() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(date_of_birth("dob", NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(), today).is_ok());
        assert!(date_of_birth("dob", today, today).is_ok());
        assert!(date_of_birth("dob", NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(), today).is_err());
        assert!(date_of_birth("dob", NaiveDate::from_ymd_opt(1899, 12, 31).unwrap(), today).is_err());
    }

    #[test]
    fn test_numeric() {
        assert_eq!(numeric("value", " 4.5 ", None, None).unwrap(), 4.5);
        assert!(numeric("value", "abc", None, None).is_err());
        assert!(numeric("value", "inf", None, None).is_err());
        assert!(numeric("value", "-1", Some(0.0), None).is_err());
        assert!(numeric("value", "11", None, Some(10.0)).is_err());
    }

    #[test]
    fn test_external_id() {
        assert!(external_id("external_id", None).is_ok());
        assert!(external_id("external_id", Some("INS-12345")).is_ok());
        assert!(external_id("external_id", Some("ab")).is_err());
        assert!(external_id("external_id", Some("has space")).is_err());
    }

    #[test]
    fn test_username_and_password() {
        assert!(username("admin").is_ok());
        assert!(username("dr.smith").is_ok());
        assert!(username("Admin").is_err());
        assert!(username("ab").is_err());
        assert!(password("longenough").is_ok());
        assert!(password("short").is_err());
    }

    #[test]
    fn test_appointment_duration() {
        assert!(appointment_duration(30).is_ok());
        assert!(appointment_duration(5).is_ok());
        assert!(appointment_duration(480).is_ok());
        assert!(appointment_duration(4).is_err());
        assert!(appointment_duration(481).is_err());
    }

    proptest! {
        #[test]
        fn prop_blank_strings_are_rejected(s in "[ \t\n]*") {
            prop_assert!(required("field", &s).is_err());
        }

        #[test]
        fn prop_numeric_accepts_formatted_numbers(n in -1.0e9f64..1.0e9f64) {
            let parsed = numeric("value", &n.to_string(), None, None).unwrap();
            prop_assert_eq!(parsed, n);
        }

        #[test]
        fn prop_iso_date_accepts_formatted_dates(days in 0i64..60_000) {
            let date = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap() + chrono::Duration::days(days);
            let text = date.format("%Y-%m-%d").to_string();
            prop_assert_eq!(iso_date("date", &text).unwrap(), date);
        }

        #[test]
        fn prop_external_ids_match_length_bounds(s in "[A-Za-z0-9-]{0,40}") {
            let ok = external_id("external_id", Some(&s)).is_ok();
            let len = s.len();
            prop_assert_eq!(ok, len == 0 || (3..=32).contains(&len));
        }
    }
}
