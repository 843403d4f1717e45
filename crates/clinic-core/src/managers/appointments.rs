//! Appointment manager.
//!
//! ```text
//! Scheduled ──complete──▶ Completed
//!     │
//!     └──────cancel─────▶ Cancelled
//! ```
//!
//! Completed and Cancelled are terminal.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::patients::start_visit_in;
use super::{audit, clean, ManagerError, ManagerResult};
use crate::auth::Session;
use crate::db::Database;
use crate::models::{
    Appointment, AppointmentDetails, AppointmentFilter, AppointmentStatus, EntityKind, Visit,
    VisitInput,
};
use crate::validation::{self, ValidationError};

/// Appointment manager.
pub struct AppointmentManager<'a> {
    db: &'a Database,
}

impl<'a> AppointmentManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn get(&self, id: &str) -> ManagerResult<Appointment> {
        self.db
            .get_appointment(id)?
            .ok_or_else(|| ManagerError::not_found(EntityKind::Appointment, id))
    }

    fn ensure_future(scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> ManagerResult<()> {
        if scheduled_at <= now {
            return Err(ValidationError::new("scheduled_at", "must be in the future").into());
        }
        Ok(())
    }

    /// Reject a slot that overlaps another scheduled appointment of the
    /// same doctor.
    fn ensure_no_conflict(
        &self,
        doctor: Option<&str>,
        start: DateTime<Utc>,
        minutes: u32,
        ignore_id: Option<&str>,
    ) -> ManagerResult<()> {
        let Some(doctor) = doctor else {
            return Ok(());
        };
        let clash = self
            .db
            .list_scheduled_for_doctor(doctor)?
            .into_iter()
            .filter(|a| Some(a.id.as_str()) != ignore_id)
            .find(|a| a.overlaps(start, minutes));

        match clash {
            Some(existing) => {
                warn!(doctor, existing = %existing.id, "Schedule conflict");
                Err(ManagerError::ScheduleConflict {
                    doctor: doctor.to_string(),
                    existing: existing.id,
                })
            }
            None => Ok(()),
        }
    }

    fn transition_error(appointment: &Appointment, to: AppointmentStatus) -> ManagerError {
        ManagerError::InvalidStateTransition {
            entity: EntityKind::Appointment,
            id: appointment.id.clone(),
            from: appointment.status.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }

    /// Book an appointment strictly in the future.
    pub fn schedule(
        &self,
        session: &Session,
        patient_id: &str,
        scheduled_at: DateTime<Utc>,
        details: AppointmentDetails,
    ) -> ManagerResult<Appointment> {
        Self::ensure_future(scheduled_at, Utc::now())?;
        validation::appointment_duration(details.duration_minutes)?;
        let details = AppointmentDetails {
            doctor: clean(details.doctor),
            reason: clean(details.reason),
            notes: clean(details.notes),
            ..details
        };

        self.db.atomically(|db| {
            let patient = db
                .get_patient(patient_id)?
                .ok_or_else(|| ManagerError::not_found(EntityKind::Patient, patient_id))?;
            if patient.is_archived() {
                return Err(ValidationError::new("patient_id", "patient is archived").into());
            }
            self.ensure_no_conflict(
                details.doctor.as_deref(),
                scheduled_at,
                details.duration_minutes,
                None,
            )?;

            let id = db.next_id(EntityKind::Appointment)?;
            let appointment = Appointment::new(id, patient_id.to_string(), scheduled_at, details);
            db.insert_appointment(&appointment)?;
            audit(
                db,
                session,
                "appointment.schedule",
                EntityKind::Appointment,
                &appointment.id,
                Some(json!({
                    "patient_id": patient_id,
                    "scheduled_at": scheduled_at.to_rfc3339(),
                })),
            )?;
            info!(
                appointment_id = %appointment.id,
                patient_id,
                actor = session.actor(),
                "Appointment scheduled"
            );
            Ok(appointment)
        })
    }

    /// Move a scheduled appointment to a new future time.
    pub fn reschedule(
        &self,
        session: &Session,
        id: &str,
        new_time: DateTime<Utc>,
    ) -> ManagerResult<Appointment> {
        Self::ensure_future(new_time, Utc::now())?;

        self.db.atomically(|db| {
            let mut appointment = self.get(id)?;
            if appointment.status != AppointmentStatus::Scheduled {
                return Err(Self::transition_error(&appointment, AppointmentStatus::Scheduled));
            }
            self.ensure_no_conflict(
                appointment.doctor.as_deref(),
                new_time,
                appointment.duration_minutes,
                Some(id),
            )?;

            let previous = appointment.scheduled_at;
            appointment.scheduled_at = new_time;
            appointment.updated_at = Utc::now();
            db.update_appointment(&appointment)?;
            audit(
                db,
                session,
                "appointment.reschedule",
                EntityKind::Appointment,
                id,
                Some(json!({
                    "from": previous.to_rfc3339(),
                    "to": new_time.to_rfc3339(),
                })),
            )?;
            info!(appointment_id = id, actor = session.actor(), "Appointment rescheduled");
            Ok(appointment)
        })
    }

    fn complete_in(
        &self,
        db: &Database,
        session: &Session,
        mut appointment: Appointment,
        visit: &Visit,
    ) -> ManagerResult<Appointment> {
        if !appointment.status.can_transition_to(AppointmentStatus::Completed) {
            return Err(Self::transition_error(&appointment, AppointmentStatus::Completed));
        }
        if visit.patient_id != appointment.patient_id {
            return Err(ValidationError::new(
                "visit_id",
                format!(
                    "visit {} belongs to {}, not {}",
                    visit.id, visit.patient_id, appointment.patient_id
                ),
            )
            .into());
        }

        appointment.status = AppointmentStatus::Completed;
        appointment.visit_id = Some(visit.id.clone());
        appointment.updated_at = Utc::now();
        db.update_appointment(&appointment)?;
        audit(
            db,
            session,
            "appointment.complete",
            EntityKind::Appointment,
            &appointment.id,
            Some(json!({ "visit_id": visit.id })),
        )?;
        info!(
            appointment_id = %appointment.id,
            visit_id = %visit.id,
            actor = session.actor(),
            "Appointment completed"
        );
        Ok(appointment)
    }

    /// Mark a scheduled appointment as fulfilled by an existing visit of the
    /// same patient.
    pub fn complete(&self, session: &Session, id: &str, visit_id: &str) -> ManagerResult<Appointment> {
        self.db.atomically(|db| {
            let appointment = self.get(id)?;
            let visit = db
                .get_visit(visit_id)?
                .ok_or_else(|| ManagerError::not_found(EntityKind::Visit, visit_id))?;
            self.complete_in(db, session, appointment, &visit)
        })
    }

    /// Start a visit for the appointment's patient and complete the
    /// appointment with it, in one step.
    pub fn check_in(
        &self,
        session: &Session,
        id: &str,
        input: VisitInput,
    ) -> ManagerResult<(Appointment, Visit)> {
        self.db.atomically(|db| {
            let appointment = self.get(id)?;
            if !appointment.status.can_transition_to(AppointmentStatus::Completed) {
                return Err(Self::transition_error(&appointment, AppointmentStatus::Completed));
            }
            let input = VisitInput {
                doctor: input.doctor.or_else(|| appointment.doctor.clone()),
                reason: input.reason.or_else(|| appointment.reason.clone()),
                notes: input.notes,
            };
            let visit = start_visit_in(db, session, &appointment.patient_id, input)?;
            let appointment = self.complete_in(db, session, appointment, &visit)?;
            Ok((appointment, visit))
        })
    }

    /// Cancel a scheduled appointment.
    pub fn cancel(&self, session: &Session, id: &str, reason: Option<String>) -> ManagerResult<Appointment> {
        self.db.atomically(|db| {
            let mut appointment = self.get(id)?;
            if !appointment.status.can_transition_to(AppointmentStatus::Cancelled) {
                return Err(Self::transition_error(&appointment, AppointmentStatus::Cancelled));
            }

            appointment.status = AppointmentStatus::Cancelled;
            appointment.cancel_reason = clean(reason);
            appointment.updated_at = Utc::now();
            db.update_appointment(&appointment)?;
            audit(
                db,
                session,
                "appointment.cancel",
                EntityKind::Appointment,
                id,
                appointment
                    .cancel_reason
                    .as_ref()
                    .map(|r| json!({ "reason": r })),
            )?;
            info!(appointment_id = id, actor = session.actor(), "Appointment cancelled");
            Ok(appointment)
        })
    }

    pub fn find_by_id(&self, id: &str) -> ManagerResult<Option<Appointment>> {
        Ok(self.db.get_appointment(id)?)
    }

    /// Appointments matching `filter`, ascending by scheduled time.
    pub fn list(&self, filter: &AppointmentFilter) -> ManagerResult<Vec<Appointment>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(ValidationError::new(
                    "scheduled_at",
                    "range start must not be after range end",
                )
                .into());
            }
        }
        Ok(self.db.list_appointments(filter)?)
    }

    /// All appointments of one patient, ascending by scheduled time.
    pub fn list_for_patient(&self, patient_id: &str) -> ManagerResult<Vec<Appointment>> {
        if self.db.get_patient(patient_id)?.is_none() {
            return Err(ManagerError::not_found(EntityKind::Patient, patient_id));
        }
        self.list(&AppointmentFilter::for_patient(patient_id))
    }
}
