//! Patient manager: registration, lifecycle, visits and medical history.

use std::collections::VecDeque;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{audit, clean, ManagerError, ManagerResult};
use crate::auth::Session;
use crate::db::Database;
use crate::models::{
    ActiveVisit, EntityKind, MedicalHistoryEntry, MedicalHistoryInput, Patient, PatientCriteria,
    PatientDetails, PatientStatus, Visit, VisitInput, VisitOutcome,
};
use crate::validation::{self, ValidationError};

const MAX_NAME_LENGTH: usize = 200;
const MAX_TEXT_LENGTH: usize = 10_000;

/// Rows fetched per round trip while iterating a search.
pub const DEFAULT_SEARCH_PAGE_SIZE: usize = 50;

/// History kind recorded when a visit closes with a diagnosis.
pub const DIAGNOSIS_KIND: &str = "diagnosis";

/// Validate and normalize patient fields.
pub fn validate_patient_details(
    details: PatientDetails,
    today: NaiveDate,
) -> ManagerResult<PatientDetails> {
    let name = validation::required("name", &details.name)?.to_string();
    validation::max_length("name", &name, MAX_NAME_LENGTH)?;

    if let Some(dob) = details.date_of_birth {
        validation::date_of_birth("date_of_birth", dob, today)?;
    }

    let details = PatientDetails {
        name,
        date_of_birth: details.date_of_birth,
        gender: clean(details.gender),
        phone: clean(details.phone),
        email: clean(details.email),
        address: clean(details.address),
        external_id: clean(details.external_id),
        medical_history: clean(details.medical_history),
    };

    validation::phone("phone", details.phone.as_deref())?;
    validation::email("email", details.email.as_deref())?;
    validation::external_id("external_id", details.external_id.as_deref())?;
    if let Some(history) = &details.medical_history {
        validation::max_length("medical_history", history, MAX_TEXT_LENGTH)?;
    }

    Ok(details)
}

/// Start a visit inside the caller's transaction.
pub(crate) fn start_visit_in(
    db: &Database,
    session: &Session,
    patient_id: &str,
    input: VisitInput,
) -> ManagerResult<Visit> {
    let patient = db
        .get_patient(patient_id)?
        .ok_or_else(|| ManagerError::not_found(EntityKind::Patient, patient_id))?;
    if patient.is_archived() {
        return Err(ValidationError::new("patient_id", "patient is archived").into());
    }
    if let Some(active) = db.get_active_visit(patient_id)? {
        return Err(ManagerError::Duplicate {
            entity: EntityKind::Visit,
            message: format!("patient {} already has active visit {}", patient_id, active.id),
        });
    }

    let input = VisitInput {
        doctor: clean(input.doctor),
        reason: clean(input.reason),
        notes: clean(input.notes),
    };
    if let Some(notes) = &input.notes {
        validation::max_length("notes", notes, MAX_TEXT_LENGTH)?;
    }

    let id = db.next_id(EntityKind::Visit)?;
    let visit = Visit::start(id, patient_id.to_string(), input);
    db.insert_visit(&visit)?;
    audit(
        db,
        session,
        "visit.start",
        EntityKind::Visit,
        &visit.id,
        Some(json!({ "patient_id": patient_id })),
    )?;
    info!(visit_id = %visit.id, patient_id, actor = session.actor(), "Visit started");
    Ok(visit)
}

/// Patient and visit manager.
pub struct PatientManager<'a> {
    db: &'a Database,
}

impl<'a> PatientManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn get(&self, id: &str) -> ManagerResult<Patient> {
        self.db
            .get_patient(id)?
            .ok_or_else(|| ManagerError::not_found(EntityKind::Patient, id))
    }

    fn ensure_external_id_free(&self, details: &PatientDetails, own_id: Option<&str>) -> ManagerResult<()> {
        let Some(external_id) = details.external_id.as_deref() else {
            return Ok(());
        };
        match self.db.get_patient_by_external_id(external_id)? {
            Some(existing) if Some(existing.id.as_str()) != own_id => Err(ManagerError::Duplicate {
                entity: EntityKind::Patient,
                message: format!("external id {} is already used by {}", external_id, existing.id),
            }),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Patients
    // =========================================================================

    /// Register a patient and assign the next `p-N` identifier.
    pub fn create(&self, session: &Session, details: PatientDetails) -> ManagerResult<Patient> {
        let details = validate_patient_details(details, Utc::now().date_naive())?;

        self.db.atomically(|db| {
            self.ensure_external_id_free(&details, None)?;
            let id = db.next_id(EntityKind::Patient)?;
            let patient = Patient::new(id, details);
            db.insert_patient(&patient)?;
            audit(db, session, "patient.create", EntityKind::Patient, &patient.id, None)?;
            info!(patient_id = %patient.id, actor = session.actor(), "Patient created");
            Ok(patient)
        })
    }

    /// Replace a patient's editable fields.
    pub fn update(&self, session: &Session, id: &str, details: PatientDetails) -> ManagerResult<Patient> {
        let details = validate_patient_details(details, Utc::now().date_naive())?;

        self.db.atomically(|db| {
            let mut patient = self.get(id)?;
            self.ensure_external_id_free(&details, Some(id))?;

            patient.details = details;
            patient.updated_at = Utc::now();
            db.update_patient_details(id, &patient.details, patient.updated_at)?;
            audit(db, session, "patient.update", EntityKind::Patient, id, None)?;
            info!(patient_id = id, actor = session.actor(), "Patient updated");
            Ok(patient)
        })
    }

    /// Archive a patient. Blocked while visits are active or appointments
    /// are still scheduled.
    pub fn archive(&self, session: &Session, id: &str) -> ManagerResult<Patient> {
        self.db.atomically(|db| {
            let mut patient = self.get(id)?;
            if patient.is_archived() {
                return Err(ManagerError::InvalidStateTransition {
                    entity: EntityKind::Patient,
                    id: id.to_string(),
                    from: PatientStatus::Archived.as_str().to_string(),
                    to: PatientStatus::Archived.as_str().to_string(),
                });
            }

            let dependents = db.count_patient_dependents(id)?;
            if dependents.any_open() {
                warn!(patient_id = id, ?dependents, "Archive blocked by open records");
                return Err(ManagerError::ReferentialIntegrity {
                    entity: EntityKind::Patient,
                    id: id.to_string(),
                    reason: format!(
                        "{} active visit(s) and {} scheduled appointment(s) reference it",
                        dependents.active_visits, dependents.scheduled_appointments
                    ),
                });
            }

            patient.status = PatientStatus::Archived;
            patient.updated_at = Utc::now();
            db.set_patient_status(id, patient.status, patient.updated_at)?;
            audit(db, session, "patient.archive", EntityKind::Patient, id, None)?;
            info!(patient_id = id, actor = session.actor(), "Patient archived");
            Ok(patient)
        })
    }

    /// Return an archived patient to active status.
    pub fn restore(&self, session: &Session, id: &str) -> ManagerResult<Patient> {
        self.db.atomically(|db| {
            let mut patient = self.get(id)?;
            if !patient.is_archived() {
                return Err(ManagerError::InvalidStateTransition {
                    entity: EntityKind::Patient,
                    id: id.to_string(),
                    from: patient.status.as_str().to_string(),
                    to: PatientStatus::Active.as_str().to_string(),
                });
            }

            patient.status = PatientStatus::Active;
            patient.updated_at = Utc::now();
            db.set_patient_status(id, patient.status, patient.updated_at)?;
            audit(db, session, "patient.restore", EntityKind::Patient, id, None)?;
            info!(patient_id = id, actor = session.actor(), "Patient restored");
            Ok(patient)
        })
    }

    /// Permanently remove a patient that nothing references.
    pub fn delete(&self, session: &Session, id: &str) -> ManagerResult<()> {
        self.db.atomically(|db| {
            self.get(id)?;
            let dependents = db.count_patient_dependents(id)?;
            if dependents.any() {
                warn!(patient_id = id, ?dependents, "Delete blocked by dependent records");
                return Err(ManagerError::ReferentialIntegrity {
                    entity: EntityKind::Patient,
                    id: id.to_string(),
                    reason: format!(
                        "{} visit(s), {} appointment(s), {} document(s) and {} test result(s) reference it",
                        dependents.visits,
                        dependents.appointments,
                        dependents.documents,
                        dependents.test_results
                    ),
                });
            }

            db.delete_patient(id)?;
            audit(db, session, "patient.delete", EntityKind::Patient, id, None)?;
            info!(patient_id = id, actor = session.actor(), "Patient deleted");
            Ok(())
        })
    }

    pub fn find_by_id(&self, id: &str) -> ManagerResult<Option<Patient>> {
        Ok(self.db.get_patient(id)?)
    }

    /// Search patients. The returned value runs the query lazily and can be
    /// iterated any number of times.
    pub fn search(&self, criteria: PatientCriteria) -> ManagerResult<PatientSearch<'a>> {
        if let (Some(from), Some(to)) = (criteria.born_on_or_after, criteria.born_on_or_before) {
            if from > to {
                return Err(ValidationError::new(
                    "date_of_birth",
                    "range start must not be after range end",
                )
                .into());
            }
        }
        let criteria = PatientCriteria {
            id: clean(criteria.id),
            name_contains: clean(criteria.name_contains),
            term: clean(criteria.term),
            ..criteria
        };
        debug!(?criteria, "Patient search");
        Ok(PatientSearch {
            db: self.db,
            criteria,
            page_size: DEFAULT_SEARCH_PAGE_SIZE,
        })
    }

    // =========================================================================
    // Visits
    // =========================================================================

    /// Check a patient in. A patient has at most one active visit.
    pub fn start_visit(&self, session: &Session, patient_id: &str, input: VisitInput) -> ManagerResult<Visit> {
        self.db
            .atomically(|db| start_visit_in(db, session, patient_id, input))
    }

    /// Check a patient out. A diagnosis, when given, is added to the
    /// patient's medical history.
    pub fn close_visit(&self, session: &Session, visit_id: &str, outcome: VisitOutcome) -> ManagerResult<Visit> {
        self.db.atomically(|db| {
            let mut visit = self.get_visit(visit_id)?;
            if !visit.is_active() {
                return Err(ManagerError::InvalidStateTransition {
                    entity: EntityKind::Visit,
                    id: visit_id.to_string(),
                    from: visit.status.as_str().to_string(),
                    to: "closed".to_string(),
                });
            }

            let outcome = VisitOutcome {
                notes: clean(outcome.notes),
                diagnosis: clean(outcome.diagnosis),
                treatment: clean(outcome.treatment),
                follow_up: clean(outcome.follow_up),
            };
            visit.close(outcome);
            db.update_visit(&visit)?;

            if let Some(diagnosis) = &visit.diagnosis {
                let entry = MedicalHistoryEntry {
                    id: db.next_id(EntityKind::MedicalHistory)?,
                    patient_id: visit.patient_id.clone(),
                    visit_id: Some(visit.id.clone()),
                    recorded_at: Utc::now(),
                    kind: DIAGNOSIS_KIND.to_string(),
                    condition: diagnosis.clone(),
                    notes: None,
                    treatment: visit.treatment.clone(),
                };
                db.insert_medical_history(&entry)?;
            }

            audit(db, session, "visit.close", EntityKind::Visit, visit_id, None)?;
            info!(visit_id, actor = session.actor(), "Visit closed");
            Ok(visit)
        })
    }

    /// Replace the notes of an active visit. Closed visits are final.
    pub fn update_visit_notes(&self, session: &Session, visit_id: &str, notes: &str) -> ManagerResult<Visit> {
        validation::max_length("notes", notes, MAX_TEXT_LENGTH)?;

        self.db.atomically(|db| {
            let mut visit = self.get_visit(visit_id)?;
            if !visit.is_active() {
                return Err(ManagerError::ImmutableRecord {
                    entity: EntityKind::Visit,
                    id: visit_id.to_string(),
                });
            }
            visit.notes = notes.trim().to_string();
            db.update_visit(&visit)?;
            audit(db, session, "visit.update_notes", EntityKind::Visit, visit_id, None)?;
            Ok(visit)
        })
    }

    fn get_visit(&self, id: &str) -> ManagerResult<Visit> {
        self.db
            .get_visit(id)?
            .ok_or_else(|| ManagerError::not_found(EntityKind::Visit, id))
    }

    pub fn find_visit(&self, id: &str) -> ManagerResult<Option<Visit>> {
        Ok(self.db.get_visit(id)?)
    }

    /// A patient's visits, oldest first.
    pub fn list_visits(&self, patient_id: &str) -> ManagerResult<Vec<Visit>> {
        self.get(patient_id)?;
        Ok(self.db.list_visits_for_patient(patient_id)?)
    }

    /// Currently active visits with patient names.
    pub fn active_visits(&self) -> ManagerResult<Vec<ActiveVisit>> {
        Ok(self.db.list_active_visits()?)
    }

    // =========================================================================
    // Medical history
    // =========================================================================

    pub fn add_medical_history(
        &self,
        session: &Session,
        patient_id: &str,
        input: MedicalHistoryInput,
    ) -> ManagerResult<MedicalHistoryEntry> {
        let condition = validation::required("condition", &input.condition)?.to_string();
        let kind = clean(input.kind).unwrap_or_else(|| "condition".to_string());

        self.db.atomically(|db| {
            self.get(patient_id)?;
            let entry = MedicalHistoryEntry {
                id: db.next_id(EntityKind::MedicalHistory)?,
                patient_id: patient_id.to_string(),
                visit_id: None,
                recorded_at: Utc::now(),
                kind,
                condition,
                notes: clean(input.notes),
                treatment: clean(input.treatment),
            };
            db.insert_medical_history(&entry)?;
            audit(
                db,
                session,
                "medical_history.add",
                EntityKind::MedicalHistory,
                &entry.id,
                Some(json!({ "patient_id": patient_id })),
            )?;
            Ok(entry)
        })
    }

    /// A patient's medical history, oldest first.
    pub fn medical_history(&self, patient_id: &str) -> ManagerResult<Vec<MedicalHistoryEntry>> {
        self.get(patient_id)?;
        Ok(self.db.list_medical_history(patient_id)?)
    }
}

/// A patient query that is re-run on every [`PatientSearch::iter`].
pub struct PatientSearch<'a> {
    db: &'a Database,
    criteria: PatientCriteria,
    page_size: usize,
}

impl<'a> PatientSearch<'a> {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn criteria(&self) -> &PatientCriteria {
        &self.criteria
    }

    /// Start a fresh pass over the matching patients.
    pub fn iter(&self) -> PatientIter<'a, '_> {
        PatientIter {
            search: self,
            buffer: VecDeque::new(),
            cursor: 0,
            exhausted: false,
        }
    }

    /// Collect every match.
    pub fn to_vec(&self) -> ManagerResult<Vec<Patient>> {
        self.iter().collect()
    }
}

/// Iterator over one pass of a [`PatientSearch`]; fetches a page at a time.
pub struct PatientIter<'a, 's> {
    search: &'s PatientSearch<'a>,
    buffer: VecDeque<Patient>,
    cursor: i64,
    exhausted: bool,
}

impl Iterator for PatientIter<'_, '_> {
    type Item = ManagerResult<Patient>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self.search.db.search_patients_page(
                &self.search.criteria,
                self.cursor,
                self.search.page_size,
            );
            match page {
                Ok(rows) => {
                    self.exhausted = rows.len() < self.search.page_size;
                    if let Some((rowid, _)) = rows.last() {
                        self.cursor = *rowid;
                    }
                    self.buffer.extend(rows.into_iter().map(|(_, patient)| patient));
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e.into()));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::test_support::setup;
    use crate::models::{AppointmentDetails, AppointmentStatus};

    fn jane() -> PatientDetails {
        PatientDetails::new("Jane Doe").with_date_of_birth(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())
    }

    #[test]
    fn test_create_round_trip() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);

        let details = PatientDetails {
            phone: Some("555-123-4567".into()),
            email: Some("jane@example.org".into()),
            external_id: Some("INS-001".into()),
            ..jane()
        };
        let patient = manager.create(&session, details.clone()).unwrap();
        assert_eq!(patient.id, "p-1");

        let found = manager.find_by_id("p-1").unwrap().unwrap();
        assert_eq!(found.details, details);
        assert_eq!(found.status, PatientStatus::Active);
    }

    #[test]
    fn test_create_validation() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);

        let err = manager.create(&session, PatientDetails::new("   ")).unwrap_err();
        assert!(matches!(err, ManagerError::Validation(ref v) if v.field == "name"));

        let future = Utc::now().date_naive() + chrono::Duration::days(1);
        let err = manager
            .create(&session, PatientDetails::new("Baby").with_date_of_birth(future))
            .unwrap_err();
        assert!(matches!(err, ManagerError::Validation(ref v) if v.field == "date_of_birth"));

        let bad_email = PatientDetails {
            email: Some("nope".into()),
            ..jane()
        };
        assert!(matches!(
            manager.create(&session, bad_email),
            Err(ManagerError::Validation(_))
        ));

        // Nothing was written and no identifier was consumed.
        assert!(manager.find_by_id("p-1").unwrap().is_none());
        assert_eq!(manager.create(&session, jane()).unwrap().id, "p-1");
    }

    #[test]
    fn test_duplicate_external_id() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        let with_id = |name: &str| PatientDetails {
            external_id: Some("INS-001".into()),
            ..PatientDetails::new(name)
        };

        manager.create(&session, with_id("Jane Doe")).unwrap();
        let err = manager.create(&session, with_id("John Doe")).unwrap_err();
        assert!(matches!(err, ManagerError::Duplicate { entity: EntityKind::Patient, .. }));

        // Updating a patient with its own external id is fine.
        manager.update(&session, "p-1", with_id("Jane Q. Doe")).unwrap();
    }

    #[test]
    fn test_update_unknown_patient() {
        let (db, session) = setup();
        let err = PatientManager::new(&db)
            .update(&session, "p-404", jane())
            .unwrap_err();
        assert!(matches!(err, ManagerError::NotFound { entity: EntityKind::Patient, .. }));
    }

    #[test]
    fn test_archive_blocked_by_active_visit() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        manager.create(&session, jane()).unwrap();
        let visit = manager.start_visit(&session, "p-1", VisitInput::default()).unwrap();

        let err = manager.archive(&session, "p-1").unwrap_err();
        assert!(matches!(err, ManagerError::ReferentialIntegrity { .. }));

        manager.close_visit(&session, &visit.id, VisitOutcome::default()).unwrap();
        let archived = manager.archive(&session, "p-1").unwrap();
        assert!(archived.is_archived());

        // Archived patients are hidden from default searches and cannot check in.
        assert!(manager.search(PatientCriteria::default()).unwrap().to_vec().unwrap().is_empty());
        assert!(matches!(
            manager.start_visit(&session, "p-1", VisitInput::default()),
            Err(ManagerError::Validation(_))
        ));

        let restored = manager.restore(&session, "p-1").unwrap();
        assert!(!restored.is_archived());
        assert!(matches!(
            manager.restore(&session, "p-1"),
            Err(ManagerError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_archive_blocked_by_scheduled_appointment() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        manager.create(&session, jane()).unwrap();
        let appointments = crate::managers::AppointmentManager::new(&db);
        let appointment = appointments
            .schedule(
                &session,
                "p-1",
                Utc::now() + chrono::Duration::days(2),
                AppointmentDetails::default(),
            )
            .unwrap();

        assert!(matches!(
            manager.archive(&session, "p-1"),
            Err(ManagerError::ReferentialIntegrity { .. })
        ));

        let cancelled = appointments.cancel(&session, &appointment.id, None).unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert!(manager.archive(&session, "p-1").is_ok());
    }

    #[test]
    fn test_delete_requires_no_dependents() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        manager.create(&session, jane()).unwrap();
        manager.create(&session, PatientDetails::new("John Roe")).unwrap();
        manager.start_visit(&session, "p-1", VisitInput::default()).unwrap();

        assert!(matches!(
            manager.delete(&session, "p-1"),
            Err(ManagerError::ReferentialIntegrity { .. })
        ));

        manager.delete(&session, "p-2").unwrap();
        assert!(manager.find_by_id("p-2").unwrap().is_none());
        assert!(matches!(
            manager.delete(&session, "p-2"),
            Err(ManagerError::NotFound { .. })
        ));

        // Identifiers are never reused.
        assert_eq!(manager.create(&session, PatientDetails::new("Next")).unwrap().id, "p-3");
    }

    #[test]
    fn test_search_is_lazy_and_restartable() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        for i in 0..7 {
            manager
                .create(&session, PatientDetails::new(format!("Smith {}", i)))
                .unwrap();
        }
        manager.create(&session, PatientDetails::new("Jones")).unwrap();

        let search = manager
            .search(PatientCriteria::by_name("smith"))
            .unwrap()
            .with_page_size(3);

        let first: Vec<String> = search.iter().map(|p| p.unwrap().id).collect();
        let second: Vec<String> = search.iter().map(|p| p.unwrap().id).collect();
        assert_eq!(first.len(), 7);
        assert_eq!(first, second);
        assert_eq!(first[0], "p-1");

        // A partially consumed pass does not affect the next one.
        assert_eq!(search.iter().take(2).count(), 2);
        assert_eq!(search.iter().count(), 7);

        // New matching records show up on the next pass.
        manager.create(&session, PatientDetails::new("Smith 8")).unwrap();
        assert_eq!(search.iter().count(), 8);
    }

    #[test]
    fn test_search_criteria() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        let dob = |y| NaiveDate::from_ymd_opt(y, 6, 15).unwrap();
        manager.create(&session, PatientDetails::new("Ann").with_date_of_birth(dob(1950))).unwrap();
        manager.create(&session, PatientDetails::new("Bob").with_date_of_birth(dob(1980))).unwrap();
        manager.create(&session, PatientDetails::new("Cid").with_date_of_birth(dob(2010))).unwrap();

        let criteria = PatientCriteria {
            born_on_or_after: Some(dob(1970)),
            born_on_or_before: Some(dob(2000)),
            ..Default::default()
        };
        let found = manager.search(criteria).unwrap().to_vec().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "Bob");

        let by_id = manager.search(PatientCriteria::by_id("p-3")).unwrap().to_vec().unwrap();
        assert_eq!(by_id[0].name(), "Cid");

        let inverted = PatientCriteria {
            born_on_or_after: Some(dob(2000)),
            born_on_or_before: Some(dob(1970)),
            ..Default::default()
        };
        assert!(matches!(manager.search(inverted), Err(ManagerError::Validation(_))));
    }

    #[test]
    fn test_visit_lifecycle() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        manager.create(&session, jane()).unwrap();

        let visit = manager
            .start_visit(
                &session,
                "p-1",
                VisitInput {
                    doctor: Some("Dr. Smith".into()),
                    reason: Some("Check-up".into()),
                    notes: None,
                },
            )
            .unwrap();
        assert_eq!(visit.id, "v-1");
        assert!(matches!(
            manager.start_visit(&session, "p-1", VisitInput::default()),
            Err(ManagerError::Duplicate { entity: EntityKind::Visit, .. })
        ));

        let active = manager.active_visits().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].patient_name, "Jane Doe");

        manager.update_visit_notes(&session, "v-1", "BP 120/80").unwrap();
        let closed = manager
            .close_visit(
                &session,
                "v-1",
                VisitOutcome {
                    diagnosis: Some("Hypertension".into()),
                    treatment: Some("Lisinopril".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(closed.notes, "BP 120/80");
        assert!(closed.ended_at.is_some());

        assert!(matches!(
            manager.update_visit_notes(&session, "v-1", "late"),
            Err(ManagerError::ImmutableRecord { .. })
        ));
        assert!(matches!(
            manager.close_visit(&session, "v-1", VisitOutcome::default()),
            Err(ManagerError::InvalidStateTransition { .. })
        ));

        let history = manager.medical_history("p-1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, DIAGNOSIS_KIND);
        assert_eq!(history[0].condition, "Hypertension");
        assert_eq!(history[0].visit_id.as_deref(), Some("v-1"));

        // A new visit can start once the previous one is closed.
        assert_eq!(manager.start_visit(&session, "p-1", VisitInput::default()).unwrap().id, "v-2");
        assert_eq!(manager.list_visits("p-1").unwrap().len(), 2);
    }

    #[test]
    fn test_medical_history() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        manager.create(&session, jane()).unwrap();

        let entry = manager
            .add_medical_history(
                &session,
                "p-1",
                MedicalHistoryInput {
                    condition: "Asthma".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(entry.id, "mh-1");
        assert_eq!(entry.kind, "condition");

        assert!(matches!(
            manager.add_medical_history(&session, "p-1", MedicalHistoryInput::default()),
            Err(ManagerError::Validation(_))
        ));
        assert!(matches!(
            manager.add_medical_history(
                &session,
                "p-404",
                MedicalHistoryInput {
                    condition: "Asthma".into(),
                    ..Default::default()
                }
            ),
            Err(ManagerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_mutations_are_audited() {
        let (db, session) = setup();
        let manager = PatientManager::new(&db);
        manager.create(&session, jane()).unwrap();
        manager.update(&session, "p-1", PatientDetails::new("Jane Smith")).unwrap();

        let entries = crate::audit::AuditLog::new(&db).entries_for("patient", "p-1").unwrap();
        let operations: Vec<&str> = entries.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(operations, vec!["patient.create", "patient.update"]);
        assert!(entries.iter().all(|e| e.actor == "staff"));
    }
}
