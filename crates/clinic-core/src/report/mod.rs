//! Patient reports.
//!
//! A [`ReportDocument`] is a plain serializable tree. Every section is always
//! present, empty when the patient has no matching records.

mod generator;
mod render;

pub use generator::*;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AppointmentStatus, PatientStatus, VisitStatus};
use crate::validation::{ValidationError, ValidationResult};

/// Inclusive calendar-date range. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> ValidationResult<Self> {
        let range = Self { from, to };
        range.validate()?;
        Ok(range)
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> ValidationResult<Self> {
        Self::new(Some(from), Some(to))
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ValidationError::new(
                    "date_range",
                    "start date must not be after end date",
                ));
            }
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// Clinic details printed at the top of every report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClinicHeader {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub clinic: ClinicHeader,
    pub period: DateRange,
    pub as_of: DateTime<Utc>,
    pub patient: PatientSection,
    pub medical_history: Vec<HistoryItem>,
    pub visits: Vec<VisitItem>,
    pub appointments: Vec<AppointmentItem>,
    pub documents: Vec<DocumentItem>,
    pub test_results: Vec<TestResultItem>,
    pub totals: ReportTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientSection {
    pub id: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    /// Whole years at the report's `as_of` date
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub external_id: Option<String>,
    /// Free-text history kept on the patient record (allergies, chronic conditions)
    pub medical_history: Option<String>,
    pub status: PatientStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub date: NaiveDate,
    pub kind: String,
    pub condition: String,
    pub notes: Option<String>,
    pub treatment: Option<String>,
    pub visit_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitItem {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    pub doctor: Option<String>,
    pub reason: Option<String>,
    pub notes: String,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub follow_up: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentItem {
    pub id: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub doctor: Option<String>,
    pub reason: Option<String>,
    pub visit_id: Option<String>,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub visit_id: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResultItem {
    pub id: String,
    pub visit_id: String,
    pub test_name: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub test_date: NaiveDate,
    pub notes: Option<String>,
    pub supersedes: Option<String>,
    /// A later result corrects this one
    pub superseded: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportTotals {
    pub medical_history: usize,
    pub visits: usize,
    pub appointments: usize,
    pub completed_appointments: usize,
    pub cancelled_appointments: usize,
    pub documents: usize,
    pub test_results: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = DateRange::between(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert!(range.contains(date(2024, 1, 1)));
        assert!(range.contains(date(2024, 1, 31)));
        assert!(!range.contains(date(2023, 12, 31)));
        assert!(!range.contains(date(2024, 2, 1)));
    }

    #[test]
    fn test_open_bounds() {
        let range = DateRange::new(Some(date(2024, 1, 1)), None).unwrap();
        assert!(range.contains(date(2099, 1, 1)));
        assert!(!range.contains(date(2023, 1, 1)));
        assert!(DateRange::default().contains(date(1900, 1, 1)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = DateRange::between(date(2024, 2, 1), date(2024, 1, 1)).unwrap_err();
        assert_eq!(err.field, "date_range");
    }
}
