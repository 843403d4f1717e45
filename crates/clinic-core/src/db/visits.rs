//! Visit and medical history database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::{ActiveVisit, MedicalHistoryEntry, Visit};

const VISIT_COLUMNS: &str = "id, patient_id, started_at, ended_at, status, doctor, reason, \
                             notes, diagnosis, treatment, follow_up";

fn visit_from_row(row: &Row<'_>) -> rusqlite::Result<Visit> {
    Ok(Visit {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        status: row.get(4)?,
        doctor: row.get(5)?,
        reason: row.get(6)?,
        notes: row.get(7)?,
        diagnosis: row.get(8)?,
        treatment: row.get(9)?,
        follow_up: row.get(10)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<MedicalHistoryEntry> {
    Ok(MedicalHistoryEntry {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        visit_id: row.get(2)?,
        recorded_at: row.get(3)?,
        kind: row.get(4)?,
        condition: row.get(5)?,
        notes: row.get(6)?,
        treatment: row.get(7)?,
    })
}

impl Database {
    /// Insert a new visit.
    pub fn insert_visit(&self, visit: &Visit) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO visits (
                id, patient_id, started_at, ended_at, status, doctor, reason,
                notes, diagnosis, treatment, follow_up
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                visit.id,
                visit.patient_id,
                visit.started_at,
                visit.ended_at,
                visit.status,
                visit.doctor,
                visit.reason,
                visit.notes,
                visit.diagnosis,
                visit.treatment,
                visit.follow_up,
            ],
        )?;
        Ok(())
    }

    /// Write back the mutable fields of a visit.
    pub fn update_visit(&self, visit: &Visit) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE visits SET
                ended_at = ?2,
                status = ?3,
                doctor = ?4,
                reason = ?5,
                notes = ?6,
                diagnosis = ?7,
                treatment = ?8,
                follow_up = ?9
            WHERE id = ?1
            "#,
            params![
                visit.id,
                visit.ended_at,
                visit.status,
                visit.doctor,
                visit.reason,
                visit.notes,
                visit.diagnosis,
                visit.treatment,
                visit.follow_up,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a visit by ID.
    pub fn get_visit(&self, id: &str) -> DbResult<Option<Visit>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM visits WHERE id = ?", VISIT_COLUMNS),
                [id],
                visit_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get the active visit of a patient, if any.
    pub fn get_active_visit(&self, patient_id: &str) -> DbResult<Option<Visit>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM visits WHERE patient_id = ? AND status = 'active'",
                    VISIT_COLUMNS
                ),
                [patient_id],
                visit_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List a patient's visits, oldest first.
    pub fn list_visits_for_patient(&self, patient_id: &str) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM visits WHERE patient_id = ? ORDER BY started_at, rowid",
            VISIT_COLUMNS
        ))?;
        let rows = stmt.query_map([patient_id], visit_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List all active visits with patient names, earliest check-in first.
    pub fn list_active_visits(&self) -> DbResult<Vec<ActiveVisit>> {
        let columns = VISIT_COLUMNS
            .split(", ")
            .map(|c| format!("v.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}, p.name
            FROM visits v
            JOIN patients p ON p.id = v.patient_id
            WHERE v.status = 'active'
            ORDER BY v.started_at, v.rowid
            "#,
            columns
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(ActiveVisit {
                visit: visit_from_row(row)?,
                patient_name: row.get(11)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Insert a medical history entry.
    pub fn insert_medical_history(&self, entry: &MedicalHistoryEntry) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO medical_history (
                id, patient_id, visit_id, recorded_at, kind, condition, notes, treatment
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.id,
                entry.patient_id,
                entry.visit_id,
                entry.recorded_at,
                entry.kind,
                entry.condition,
                entry.notes,
                entry.treatment,
            ],
        )?;
        Ok(())
    }

    /// List a patient's medical history, oldest first.
    pub fn list_medical_history(&self, patient_id: &str) -> DbResult<Vec<MedicalHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, patient_id, visit_id, recorded_at, kind, condition, notes, treatment
            FROM medical_history
            WHERE patient_id = ?
            ORDER BY recorded_at, rowid
            "#,
        )?;
        let rows = stmt.query_map([patient_id], history_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Patient, PatientDetails, VisitInput, VisitOutcome};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_patient(&Patient::new("p-1".into(), PatientDetails::new("Jane Doe")))
            .unwrap();
        db
    }

    #[test]
    fn test_insert_and_get_visit() {
        let db = setup_db();
        let visit = Visit::start("v-1".into(), "p-1".into(), VisitInput::default());
        db.insert_visit(&visit).unwrap();

        let retrieved = db.get_visit("v-1").unwrap().unwrap();
        assert_eq!(retrieved, visit);
        assert_eq!(db.get_active_visit("p-1").unwrap().unwrap().id, "v-1");
    }

    #[test]
    fn test_close_visit_and_list() {
        let db = setup_db();
        let mut visit = Visit::start("v-1".into(), "p-1".into(), VisitInput::default());
        db.insert_visit(&visit).unwrap();

        let active = db.list_active_visits().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].patient_name, "Jane Doe");

        visit.close(VisitOutcome::default());
        assert!(db.update_visit(&visit).unwrap());

        assert!(db.get_active_visit("p-1").unwrap().is_none());
        assert!(db.list_active_visits().unwrap().is_empty());
        assert_eq!(db.list_visits_for_patient("p-1").unwrap().len(), 1);
    }

    #[test]
    fn test_medical_history_round_trip() {
        let db = setup_db();
        let entry = MedicalHistoryEntry {
            id: "mh-1".into(),
            patient_id: "p-1".into(),
            visit_id: None,
            recorded_at: chrono::Utc::now(),
            kind: "allergy".into(),
            condition: "Penicillin".into(),
            notes: None,
            treatment: None,
        };
        db.insert_medical_history(&entry).unwrap();
        assert_eq!(db.list_medical_history("p-1").unwrap(), vec![entry]);
    }
}
