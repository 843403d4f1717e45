//! Test result models (append-only).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Input for recording a test result against a visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResultInput {
    pub test_name: String,
    /// Result value; numeric or free text ("Normal", "Positive")
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    /// Date the sample was taken
    pub test_date: NaiveDate,
    pub notes: Option<String>,
    /// Earlier result this record corrects
    pub supersedes: Option<String>,
}

impl TestResultInput {
    pub fn new(test_name: impl Into<String>, value: impl Into<String>, test_date: NaiveDate) -> Self {
        Self {
            test_name: test_name.into(),
            value: value.into(),
            unit: None,
            reference_range: None,
            test_date,
            notes: None,
            supersedes: None,
        }
    }
}

/// A recorded lab/test result. Never edited or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    /// Generated identifier (`r-N`)
    pub id: String,
    pub visit_id: String,
    pub patient_id: String,
    pub test_name: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub test_date: NaiveDate,
    pub notes: Option<String>,
    pub supersedes: Option<String>,
    /// Username of the recording user
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl TestResult {
    pub fn new(
        id: String,
        visit_id: String,
        patient_id: String,
        input: TestResultInput,
        recorded_by: String,
    ) -> Self {
        Self {
            id,
            visit_id,
            patient_id,
            test_name: input.test_name,
            value: input.value,
            unit: input.unit,
            reference_range: input.reference_range,
            test_date: input.test_date,
            notes: input.notes,
            supersedes: input.supersedes,
            recorded_by,
            recorded_at: Utc::now(),
        }
    }

    /// Value as a number, when it is one.
    pub fn numeric_value(&self) -> Option<f64> {
        crate::validation::numeric("value", &self.value, None, None).ok()
    }
}

/// A numeric data point for trending one test over time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub result_id: String,
    pub test_date: NaiveDate,
    pub value: f64,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(value: &str) -> TestResult {
        TestResult::new(
            "r-1".into(),
            "v-1".into(),
            "p-1".into(),
            TestResultInput::new("Glucose", value, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            "staff".into(),
        )
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(result_with(" 5.4 ").numeric_value(), Some(5.4));
        assert_eq!(result_with("Normal").numeric_value(), None);
        assert_eq!(result_with("NaN").numeric_value(), None);
    }
}
