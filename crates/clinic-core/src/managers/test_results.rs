//! Test results manager. Results are append-only: a correction is a new
//! result that names the one it supersedes.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::{audit, clean, ManagerError, ManagerResult};
use crate::auth::Session;
use crate::db::Database;
use crate::models::{EntityKind, TestResult, TestResultInput, TrendPoint};
use crate::validation::{self, ValidationError};

/// Test results manager.
pub struct TestResultManager<'a> {
    db: &'a Database,
}

impl<'a> TestResultManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn get(&self, id: &str) -> ManagerResult<TestResult> {
        self.db
            .get_test_result(id)?
            .ok_or_else(|| ManagerError::not_found(EntityKind::TestResult, id))
    }

    fn validate_input(input: TestResultInput, today: NaiveDate) -> ManagerResult<TestResultInput> {
        let test_name = validation::required("test_name", &input.test_name)?.to_string();
        validation::max_length("test_name", &test_name, 200)?;
        let value = validation::required("value", &input.value)?.to_string();
        validation::date_within(
            "test_date",
            input.test_date,
            NaiveDate::from_ymd_opt(1900, 1, 1),
            Some(today),
        )?;

        Ok(TestResultInput {
            test_name,
            value,
            unit: clean(input.unit),
            reference_range: clean(input.reference_range),
            test_date: input.test_date,
            notes: clean(input.notes),
            supersedes: clean(input.supersedes),
        })
    }

    /// Record a result on a visit.
    pub fn record(&self, session: &Session, visit_id: &str, input: TestResultInput) -> ManagerResult<TestResult> {
        let input = Self::validate_input(input, Utc::now().date_naive())?;

        self.db.atomically(|db| {
            let visit = db
                .get_visit(visit_id)?
                .ok_or_else(|| ManagerError::not_found(EntityKind::Visit, visit_id))?;

            if let Some(previous_id) = input.supersedes.as_deref() {
                let previous = self.get(previous_id)?;
                if previous.patient_id != visit.patient_id {
                    return Err(ValidationError::new(
                        "supersedes",
                        format!("{} belongs to another patient", previous_id),
                    )
                    .into());
                }
                if let Some(newer) = db.get_superseding_result(previous_id)? {
                    return Err(ManagerError::Duplicate {
                        entity: EntityKind::TestResult,
                        message: format!("{} is already superseded by {}", previous_id, newer.id),
                    });
                }
            }

            let id = db.next_id(EntityKind::TestResult)?;
            let result = TestResult::new(
                id,
                visit.id.clone(),
                visit.patient_id.clone(),
                input,
                session.actor().to_string(),
            );
            db.insert_test_result(&result)?;
            audit(
                db,
                session,
                "test_result.record",
                EntityKind::TestResult,
                &result.id,
                Some(json!({
                    "visit_id": result.visit_id,
                    "test_name": result.test_name,
                    "supersedes": result.supersedes,
                })),
            )?;
            info!(
                result_id = %result.id,
                visit_id,
                actor = session.actor(),
                "Test result recorded"
            );
            Ok(result)
        })
    }

    /// Results cannot be edited; record a superseding result instead.
    pub fn update(&self, session: &Session, id: &str, _input: TestResultInput) -> ManagerResult<TestResult> {
        self.get(id)?;
        warn!(result_id = id, actor = session.actor(), "Attempt to edit a test result");
        Err(ManagerError::ImmutableRecord {
            entity: EntityKind::TestResult,
            id: id.to_string(),
        })
    }

    /// Results cannot be deleted.
    pub fn delete(&self, session: &Session, id: &str) -> ManagerResult<()> {
        self.get(id)?;
        warn!(result_id = id, actor = session.actor(), "Attempt to delete a test result");
        Err(ManagerError::ImmutableRecord {
            entity: EntityKind::TestResult,
            id: id.to_string(),
        })
    }

    pub fn find_by_id(&self, id: &str) -> ManagerResult<Option<TestResult>> {
        Ok(self.db.get_test_result(id)?)
    }

    /// Results of a visit, in recording order.
    pub fn list_for_visit(&self, visit_id: &str) -> ManagerResult<Vec<TestResult>> {
        if self.db.get_visit(visit_id)?.is_none() {
            return Err(ManagerError::not_found(EntityKind::Visit, visit_id));
        }
        Ok(self.db.list_test_results_for_visit(visit_id)?)
    }

    /// All results of a patient, in recording order.
    pub fn list_for_patient(&self, patient_id: &str) -> ManagerResult<Vec<TestResult>> {
        if self.db.get_patient(patient_id)?.is_none() {
            return Err(ManagerError::not_found(EntityKind::Patient, patient_id));
        }
        Ok(self.db.list_test_results_for_patient(patient_id)?)
    }

    /// A patient's results for one test (case-insensitive name match).
    pub fn list_by_test(&self, patient_id: &str, test_name: &str) -> ManagerResult<Vec<TestResult>> {
        let name = test_name.trim();
        Ok(self
            .list_for_patient(patient_id)?
            .into_iter()
            .filter(|r| r.test_name.eq_ignore_ascii_case(name))
            .collect())
    }

    /// The result that corrected `id`, if any.
    pub fn superseded_by(&self, id: &str) -> ManagerResult<Option<TestResult>> {
        self.get(id)?;
        Ok(self.db.get_superseding_result(id)?)
    }

    /// Numeric history of one test, ascending by test date. Superseded and
    /// non-numeric results are left out.
    pub fn trend(&self, patient_id: &str, test_name: &str) -> ManagerResult<Vec<TrendPoint>> {
        let results = self.list_by_test(patient_id, test_name)?;
        let superseded: HashSet<String> = self
            .list_for_patient(patient_id)?
            .into_iter()
            .filter_map(|r| r.supersedes)
            .collect();

        let mut points: Vec<TrendPoint> = results
            .into_iter()
            .filter(|r| !superseded.contains(&r.id))
            .filter_map(|r| {
                let value = r.numeric_value()?;
                Some(TrendPoint {
                    result_id: r.id,
                    test_date: r.test_date,
                    value,
                    unit: r.unit,
                    reference_range: r.reference_range,
                })
            })
            .collect();
        // Stable: same-day results keep recording order.
        points.sort_by_key(|p| p.test_date);
        Ok(points)
    }

    /// Distinct test names on record, sorted.
    pub fn test_types(&self) -> ManagerResult<Vec<String>> {
        Ok(self.db.list_test_types()?)
    }
}
