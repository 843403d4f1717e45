//! Test result database operations (insert and read only).

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::TestResult;

const RESULT_COLUMNS: &str = "id, visit_id, patient_id, test_name, value, unit, reference_range, \
                              test_date, notes, supersedes, recorded_by, recorded_at";

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<TestResult> {
    Ok(TestResult {
        id: row.get(0)?,
        visit_id: row.get(1)?,
        patient_id: row.get(2)?,
        test_name: row.get(3)?,
        value: row.get(4)?,
        unit: row.get(5)?,
        reference_range: row.get(6)?,
        test_date: row.get(7)?,
        notes: row.get(8)?,
        supersedes: row.get(9)?,
        recorded_by: row.get(10)?,
        recorded_at: row.get(11)?,
    })
}

impl Database {
    /// Insert a test result. There is deliberately no update or delete.
    pub fn insert_test_result(&self, result: &TestResult) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO test_results (
                id, visit_id, patient_id, test_name, value, unit, reference_range,
                test_date, notes, supersedes, recorded_by, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                result.id,
                result.visit_id,
                result.patient_id,
                result.test_name,
                result.value,
                result.unit,
                result.reference_range,
                result.test_date,
                result.notes,
                result.supersedes,
                result.recorded_by,
                result.recorded_at,
            ],
        )?;
        Ok(())
    }

    /// Get a test result by ID.
    pub fn get_test_result(&self, id: &str) -> DbResult<Option<TestResult>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM test_results WHERE id = ?", RESULT_COLUMNS),
                [id],
                result_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get the result that corrects `id`, if one was recorded.
    pub fn get_superseding_result(&self, id: &str) -> DbResult<Option<TestResult>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM test_results WHERE supersedes = ?", RESULT_COLUMNS),
                [id],
                result_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List results recorded on a visit, oldest first.
    pub fn list_test_results_for_visit(&self, visit_id: &str) -> DbResult<Vec<TestResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM test_results WHERE visit_id = ? ORDER BY recorded_at, rowid",
            RESULT_COLUMNS
        ))?;
        let rows = stmt.query_map([visit_id], result_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List all results of a patient, oldest first.
    pub fn list_test_results_for_patient(&self, patient_id: &str) -> DbResult<Vec<TestResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM test_results WHERE patient_id = ? ORDER BY recorded_at, rowid",
            RESULT_COLUMNS
        ))?;
        let rows = stmt.query_map([patient_id], result_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Distinct test names across all patients, sorted.
    pub fn list_test_types(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT test_name FROM test_results ORDER BY test_name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Patient, PatientDetails, TestResultInput, Visit, VisitInput};
    use chrono::NaiveDate;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_patient(&Patient::new("p-1".into(), PatientDetails::new("Jane Doe")))
            .unwrap();
        db.insert_visit(&Visit::start("v-1".into(), "p-1".into(), VisitInput::default()))
            .unwrap();
        db
    }

    fn result(id: &str, name: &str, supersedes: Option<&str>) -> TestResult {
        let mut input = TestResultInput::new(name, "5.1", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        input.supersedes = supersedes.map(String::from);
        TestResult::new(id.into(), "v-1".into(), "p-1".into(), input, "staff".into())
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();
        let r = result("r-1", "Glucose", None);
        db.insert_test_result(&r).unwrap();
        assert_eq!(db.get_test_result("r-1").unwrap().unwrap(), r);
        assert_eq!(db.list_test_results_for_visit("v-1").unwrap().len(), 1);
    }

    #[test]
    fn test_supersede_once() {
        let db = setup_db();
        db.insert_test_result(&result("r-1", "Glucose", None)).unwrap();
        db.insert_test_result(&result("r-2", "Glucose", Some("r-1"))).unwrap();

        let newer = db.get_superseding_result("r-1").unwrap().unwrap();
        assert_eq!(newer.id, "r-2");

        // A second correction of the same record violates the unique constraint.
        assert!(db.insert_test_result(&result("r-3", "Glucose", Some("r-1"))).is_err());
    }

    #[test]
    fn test_types_sorted() {
        let db = setup_db();
        db.insert_test_result(&result("r-1", "Glucose", None)).unwrap();
        db.insert_test_result(&result("r-2", "CBC", None)).unwrap();
        assert_eq!(db.list_test_types().unwrap(), vec!["CBC".to_string(), "Glucose".to_string()]);
    }
}
