//! Appointment database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::{Appointment, AppointmentFilter};

const APPOINTMENT_COLUMNS: &str = "id, patient_id, scheduled_at, duration_minutes, doctor, \
                                   reason, notes, status, visit_id, cancel_reason, \
                                   created_at, updated_at";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        scheduled_at: row.get(2)?,
        duration_minutes: row.get(3)?,
        doctor: row.get(4)?,
        reason: row.get(5)?,
        notes: row.get(6)?,
        status: row.get(7)?,
        visit_id: row.get(8)?,
        cancel_reason: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl Database {
    /// Insert a new appointment.
    pub fn insert_appointment(&self, appointment: &Appointment) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO appointments (
                id, patient_id, scheduled_at, duration_minutes, doctor, reason,
                notes, status, visit_id, cancel_reason, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                appointment.id,
                appointment.patient_id,
                appointment.scheduled_at,
                appointment.duration_minutes,
                appointment.doctor,
                appointment.reason,
                appointment.notes,
                appointment.status,
                appointment.visit_id,
                appointment.cancel_reason,
                appointment.created_at,
                appointment.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Write back the mutable fields of an appointment.
    pub fn update_appointment(&self, appointment: &Appointment) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments SET
                scheduled_at = ?2,
                duration_minutes = ?3,
                doctor = ?4,
                reason = ?5,
                notes = ?6,
                status = ?7,
                visit_id = ?8,
                cancel_reason = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                appointment.id,
                appointment.scheduled_at,
                appointment.duration_minutes,
                appointment.doctor,
                appointment.reason,
                appointment.notes,
                appointment.status,
                appointment.visit_id,
                appointment.cancel_reason,
                appointment.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: &str) -> DbResult<Option<Appointment>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM appointments WHERE id = ?", APPOINTMENT_COLUMNS),
                [id],
                appointment_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List appointments matching a filter, ordered by scheduled time.
    pub fn list_appointments(&self, filter: &AppointmentFilter) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM appointments
            WHERE (?1 IS NULL OR scheduled_at >= ?1)
              AND (?2 IS NULL OR scheduled_at <= ?2)
              AND (?3 IS NULL OR status = ?3)
              AND (?4 IS NULL OR patient_id = ?4)
              AND (?5 IS NULL OR doctor = ?5)
            ORDER BY scheduled_at, rowid
            "#,
            APPOINTMENT_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![
                filter.from,
                filter.to,
                filter.status,
                filter.patient_id,
                filter.doctor,
            ],
            appointment_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Scheduled appointments booked with a doctor, for conflict checks.
    pub fn list_scheduled_for_doctor(&self, doctor: &str) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM appointments
            WHERE doctor = ? AND status = 'scheduled'
            ORDER BY scheduled_at, rowid
            "#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([doctor], appointment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
