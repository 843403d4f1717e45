//! Patient database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::{Patient, PatientCriteria, PatientDetails, PatientStatus};

const PATIENT_COLUMNS: &str = "id, external_id, name, date_of_birth, gender, phone, email, \
                               address, medical_history, status, created_at, updated_at";

/// Counts of records that reference a patient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientDependents {
    pub visits: u32,
    pub active_visits: u32,
    pub appointments: u32,
    pub scheduled_appointments: u32,
    pub documents: u32,
    pub test_results: u32,
}

impl PatientDependents {
    /// Whether anything still references the patient.
    pub fn any(&self) -> bool {
        self.visits + self.appointments + self.documents + self.test_results > 0
    }

    /// Whether open (non-terminal) records reference the patient.
    pub fn any_open(&self) -> bool {
        self.active_visits + self.scheduled_appointments > 0
    }
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        details: PatientDetails {
            external_id: row.get(1)?,
            name: row.get(2)?,
            date_of_birth: row.get(3)?,
            gender: row.get(4)?,
            phone: row.get(5)?,
            email: row.get(6)?,
            address: row.get(7)?,
            medical_history: row.get(8)?,
        },
        status: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        let details = &patient.details;
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, external_id, name, date_of_birth, gender, phone, email,
                address, medical_history, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                patient.id,
                details.external_id,
                details.name,
                details.date_of_birth,
                details.gender,
                details.phone,
                details.email,
                details.address,
                details.medical_history,
                patient.status,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Replace the editable fields of a patient.
    pub fn update_patient_details(
        &self,
        id: &str,
        details: &PatientDetails,
        updated_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                external_id = ?2,
                name = ?3,
                date_of_birth = ?4,
                gender = ?5,
                phone = ?6,
                email = ?7,
                address = ?8,
                medical_history = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                id,
                details.external_id,
                details.name,
                details.date_of_birth,
                details.gender,
                details.phone,
                details.email,
                details.address,
                details.medical_history,
                updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set a patient's lifecycle status.
    pub fn set_patient_status(
        &self,
        id: &str,
        status: PatientStatus,
        updated_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE patients SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, updated_at],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS),
                [id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get a patient by external ID.
    pub fn get_patient_by_external_id(&self, external_id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE external_id = ?", PATIENT_COLUMNS),
                [external_id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Fetch one page of patients matching `criteria`, in registration order.
    ///
    /// `after` is the row cursor returned with the last record of the
    /// previous page (0 for the first page).
    pub fn search_patients_page(
        &self,
        criteria: &PatientCriteria,
        after: i64,
        limit: usize,
    ) -> DbResult<Vec<(i64, Patient)>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}, rowid
            FROM patients
            WHERE rowid > ?1
              AND (?2 IS NULL OR id = ?2)
              AND (?3 IS NULL OR instr(fold_case(name), fold_case(?3)) > 0)
              AND (?4 IS NULL
                   OR instr(fold_case(id), fold_case(?4)) > 0
                   OR instr(fold_case(name), fold_case(?4)) > 0
                   OR instr(fold_case(COALESCE(phone, '')), fold_case(?4)) > 0
                   OR instr(fold_case(COALESCE(email, '')), fold_case(?4)) > 0)
              AND (?5 IS NULL OR date_of_birth >= ?5)
              AND (?6 IS NULL OR date_of_birth <= ?6)
              AND (?7 OR status = 'active')
            ORDER BY rowid
            LIMIT ?8
            "#,
            PATIENT_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![
                after,
                criteria.id,
                criteria.name_contains,
                criteria.term,
                criteria.born_on_or_after,
                criteria.born_on_or_before,
                criteria.include_archived,
                limit as i64,
            ],
            |row| Ok((row.get::<_, i64>(12)?, patient_from_row(row)?)),
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Count records that reference a patient.
    pub fn count_patient_dependents(&self, id: &str) -> DbResult<PatientDependents> {
        self.conn
            .query_row(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM visits WHERE patient_id = ?1),
                    (SELECT COUNT(*) FROM visits WHERE patient_id = ?1 AND status = 'active'),
                    (SELECT COUNT(*) FROM appointments WHERE patient_id = ?1),
                    (SELECT COUNT(*) FROM appointments WHERE patient_id = ?1 AND status = 'scheduled'),
                    (SELECT COUNT(*) FROM documents WHERE patient_id = ?1),
                    (SELECT COUNT(*) FROM test_results WHERE patient_id = ?1)
                "#,
                [id],
                |row| {
                    Ok(PatientDependents {
                        visits: row.get(0)?,
                        active_visits: row.get(1)?,
                        appointments: row.get(2)?,
                        scheduled_appointments: row.get(3)?,
                        documents: row.get(4)?,
                        test_results: row.get(5)?,
                    })
                },
            )
            .map_err(Into::into)
    }

    /// Delete a patient. Medical history entries go with it.
    pub fn delete_patient(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}
