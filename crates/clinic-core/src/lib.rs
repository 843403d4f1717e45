//! Clinic Core Library
//!
//! Local-first clinic management: patient records, visits, appointments,
//! document attachments, test results and printable patient reports, with a
//! hash-chained audit log of every change.
//!
//! # Architecture
//!
//! ```text
//!  Host UI (Swift / Kotlin / Python via UniFFI)
//!         │  login → session id
//!         ▼
//!     ClinicCore ──── sessions (id → Session)
//!         │
//!         ▼
//!  ┌────────────┬──────────────┬─────────────┬──────────────┐
//!  │  Patients  │ Appointments │  Documents  │ Test results │   managers
//!  │  + visits  │ (state mach.)│ (file store)│ (append-only)│
//!  └─────┬──────┴──────┬───────┴──────┬──────┴──────┬───────┘
//!        │  one transaction per call, audit entry included
//!        ▼
//!     SQLite ── audit_log (SHA-256 chain)
//!        ▲
//!        │ read-only
//!  ReportGenerator → ReportDocument → JSON / text
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Patient, Visit, Appointment, ...)
//! - [`validation`]: Field validators
//! - [`managers`]: Per-entity operations and invariants
//! - [`auth`]: Users, password hashing, lockout and sessions
//! - [`audit`]: Tamper-evident audit log
//! - [`report`]: Patient report generation and rendering
//! - [`config`]: Clinic settings and application paths
//! - [`backup`]: Backups of the database and documents, with rotation and restore

pub mod audit;
pub mod auth;
pub mod backup;
pub mod config;
pub mod db;
pub mod ffi;
pub mod logging;
pub mod managers;
pub mod models;
pub mod report;
pub mod validation;

// Re-export commonly used types
pub use audit::{AuditLog, ChainVerification};
pub use auth::{AuthError, LockoutPolicy, Session, UserStore};
pub use backup::{BackupInfo, BackupManager};
pub use config::{AppPaths, ClinicConfig, ConfigStore};
pub use db::{Database, DbError};
pub use managers::{
    AppointmentManager, DocumentManager, ManagerError, ManagerResult, PatientManager,
    TestResultManager,
};
pub use models::{
    Appointment, AppointmentStatus, Document, DocumentParent, Patient, PatientDetails,
    TestResult, Visit, VisitStatus,
};
pub use report::{DateRange, ReportDocument, ReportGenerator};
pub use validation::ValidationError;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::info;

use ffi::*;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Referential integrity: {0}")]
    ReferentialIntegrity(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Immutable record: {0}")]
    ImmutableRecord(String),

    #[error("Schedule conflict: {0}")]
    ScheduleConflict(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ValidationError> for ClinicError {
    fn from(e: ValidationError) -> Self {
        ClinicError::Validation(e.to_string())
    }
}

impl From<DbError> for ClinicError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => ClinicError::NotFound(what),
            other => ClinicError::Storage(other.to_string()),
        }
    }
}

impl From<AuthError> for ClinicError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(e) => e.into(),
            AuthError::Database(e) => e.into(),
            AuthError::UserExists(_) => ClinicError::Duplicate(e.to_string()),
            AuthError::UserNotFound(_) => ClinicError::NotFound(e.to_string()),
            other => ClinicError::Auth(other.to_string()),
        }
    }
}

impl From<ManagerError> for ClinicError {
    fn from(e: ManagerError) -> Self {
        let message = e.to_string();
        match e {
            ManagerError::Validation(e) => e.into(),
            ManagerError::NotFound { .. } => ClinicError::NotFound(message),
            ManagerError::Duplicate { .. } => ClinicError::Duplicate(message),
            ManagerError::ReferentialIntegrity { .. } => ClinicError::ReferentialIntegrity(message),
            ManagerError::InvalidStateTransition { .. } => {
                ClinicError::InvalidStateTransition(message)
            }
            ManagerError::ImmutableRecord { .. } => ClinicError::ImmutableRecord(message),
            ManagerError::ScheduleConflict { .. } => ClinicError::ScheduleConflict(message),
            ManagerError::Auth(e) => e.into(),
            ManagerError::Storage(e) => e.into(),
        }
    }
}

impl From<std::io::Error> for ClinicError {
    fn from(e: std::io::Error) -> Self {
        ClinicError::Storage(format!("File error: {}", e))
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::Storage(format!("Serialization error: {}", e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::Storage(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install the tracing subscriber. `RUST_LOG` overrides `filter`.
#[uniffi::export]
pub fn init_logging(filter: Option<String>) -> bool {
    logging::init(filter.as_deref().unwrap_or(config::DEFAULT_LOG_FILTER))
}

/// Open or create the clinic stored under `data_dir`.
#[uniffi::export]
pub fn open_clinic(data_dir: String) -> Result<Arc<ClinicCore>, ClinicError> {
    ClinicCore::open(AppPaths::new(data_dir))
}

/// Open or create the clinic in the platform data directory.
#[uniffi::export]
pub fn open_default_clinic() -> Result<Arc<ClinicCore>, ClinicError> {
    let paths = AppPaths::default_location()
        .ok_or_else(|| ClinicError::Storage("No data directory on this platform".to_string()))?;
    ClinicCore::open(paths)
}

/// Create an in-memory clinic (for testing). Files go under `documents_dir`.
#[uniffi::export]
pub fn open_clinic_in_memory(documents_dir: String) -> Result<Arc<ClinicCore>, ClinicError> {
    let db = Database::open_in_memory()?;
    let documents_dir = PathBuf::from(documents_dir);
    let backups_dir = documents_dir.join(".backups");
    Ok(Arc::new(ClinicCore::new(db, documents_dir, backups_dir)))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe clinic handle for FFI. One operation at a time holds the
/// database.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    db: Arc<Mutex<Database>>,
    documents_dir: PathBuf,
    backups_dir: PathBuf,
    sessions: Mutex<HashMap<String, Session>>,
}

impl ClinicCore {
    fn new(db: Database, documents_dir: PathBuf, backups_dir: PathBuf) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            documents_dir,
            backups_dir,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn open(paths: AppPaths) -> Result<Arc<Self>, ClinicError> {
        paths.ensure()?;
        let db = Database::open(paths.database_file())?;
        let config = ConfigStore::new(&db).load()?;
        logging::init(&config.log_filter);
        info!(data_dir = %paths.data_dir().display(), "Clinic opened");
        Ok(Arc::new(Self::new(
            db,
            paths.documents_dir(),
            paths.backups_dir(),
        )))
    }

    fn session(&self, session_id: &str) -> Result<Session, ClinicError> {
        let sessions = self.sessions.lock()?;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| AuthError::UnknownSession(session_id.to_string()).into())
    }

    fn backups(&self, db: &Database) -> Result<BackupManager, ClinicError> {
        let keep = ConfigStore::new(db).load()?.backups_to_keep;
        Ok(BackupManager::new(&self.documents_dir, &self.backups_dir, keep))
    }

    fn report(
        &self,
        patient_id: &str,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<ReportDocument, ClinicError> {
        let from = parse_date("from", from.as_deref())?;
        let to = parse_date("to", to.as_deref())?;
        let range = match (from, to) {
            (None, None) => None,
            _ => Some(DateRange::new(from, to)?),
        };

        let db = self.db.lock()?;
        let config = ConfigStore::new(&db).load()?;
        let generator = ReportGenerator::new(&db, &self.documents_dir, config.clinic_header());
        Ok(generator.generate(patient_id, range)?)
    }
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Authentication & Users
    // =========================================================================

    /// Whether any account exists. When false the host shows first-run setup.
    pub fn has_users(&self) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(UserStore::new(&db).has_users()?)
    }

    /// Create the first administrator.
    pub fn bootstrap_admin(
        &self,
        username: String,
        password: String,
        name: String,
    ) -> Result<FfiUser, ClinicError> {
        let db = self.db.lock()?;
        let user = UserStore::new(&db).bootstrap_admin(&username, &password, &name)?;
        Ok(user.into())
    }

    /// Verify credentials and open a session.
    pub fn login(&self, username: String, password: String) -> Result<FfiSession, ClinicError> {
        let session = {
            let db = self.db.lock()?;
            let policy = ConfigStore::new(&db).load()?.lockout_policy();
            UserStore::new(&db)
                .with_policy(policy)
                .login(&username, &password)?
        };
        self.sessions
            .lock()?
            .insert(session.id.clone(), session.clone());
        Ok(session.into())
    }

    /// End a session. Returns false if it was not open.
    pub fn logout(&self, session_id: String) -> Result<bool, ClinicError> {
        let removed = self.sessions.lock()?.remove(&session_id);
        if let Some(session) = &removed {
            info!(username = session.actor(), "Logged out");
        }
        Ok(removed.is_some())
    }

    pub fn current_user(&self, session_id: String) -> Result<FfiUser, ClinicError> {
        Ok(self.session(&session_id)?.user.into())
    }

    /// Add an account. Admin only.
    pub fn add_user(
        &self,
        session_id: String,
        username: String,
        password: String,
        name: String,
        role: String,
    ) -> Result<FfiUser, ClinicError> {
        let session = self.session(&session_id)?;
        let role = parse_role(&role)?;
        let db = self.db.lock()?;
        let user = UserStore::new(&db).add_user(&session, &username, &password, &name, role)?;
        Ok(user.into())
    }

    pub fn change_password(
        &self,
        session_id: String,
        username: String,
        new_password: String,
    ) -> Result<(), ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        UserStore::new(&db).change_password(&session, &username, &new_password)?;
        Ok(())
    }

    /// Remove an account and end its sessions. Admin only.
    pub fn delete_user(&self, session_id: String, username: String) -> Result<(), ClinicError> {
        let session = self.session(&session_id)?;
        {
            let db = self.db.lock()?;
            UserStore::new(&db).delete_user(&session, &username)?;
        }
        self.sessions
            .lock()?
            .retain(|_, s| s.user.username != username);
        Ok(())
    }

    pub fn list_users(&self) -> Result<Vec<FfiUser>, ClinicError> {
        let db = self.db.lock()?;
        let users = UserStore::new(&db).list_users()?;
        Ok(users.into_iter().map(|u| u.into()).collect())
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    pub fn create_patient(
        &self,
        session_id: String,
        details: FfiPatientDetails,
    ) -> Result<FfiPatient, ClinicError> {
        let session = self.session(&session_id)?;
        let details = PatientDetails::try_from(details)?;
        let db = self.db.lock()?;
        Ok(PatientManager::new(&db).create(&session, details)?.into())
    }

    pub fn update_patient(
        &self,
        session_id: String,
        id: String,
        details: FfiPatientDetails,
    ) -> Result<FfiPatient, ClinicError> {
        let session = self.session(&session_id)?;
        let details = PatientDetails::try_from(details)?;
        let db = self.db.lock()?;
        Ok(PatientManager::new(&db).update(&session, &id, details)?.into())
    }

    pub fn archive_patient(&self, session_id: String, id: String) -> Result<FfiPatient, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        Ok(PatientManager::new(&db).archive(&session, &id)?.into())
    }

    pub fn restore_patient(&self, session_id: String, id: String) -> Result<FfiPatient, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        Ok(PatientManager::new(&db).restore(&session, &id)?.into())
    }

    /// Permanently remove a patient with no dependent records.
    pub fn delete_patient(&self, session_id: String, id: String) -> Result<(), ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        PatientManager::new(&db).delete(&session, &id)?;
        Ok(())
    }

    pub fn get_patient(&self, id: String) -> Result<Option<FfiPatient>, ClinicError> {
        let db = self.db.lock()?;
        let patient = PatientManager::new(&db).find_by_id(&id)?;
        Ok(patient.map(|p| p.into()))
    }

    pub fn search_patients(
        &self,
        criteria: FfiPatientCriteria,
    ) -> Result<Vec<FfiPatient>, ClinicError> {
        let criteria = models::PatientCriteria::try_from(criteria)?;
        let db = self.db.lock()?;
        let patients = PatientManager::new(&db).search(criteria)?.to_vec()?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    pub fn start_visit(
        &self,
        session_id: String,
        patient_id: String,
        input: FfiVisitInput,
    ) -> Result<FfiVisit, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        let visit = PatientManager::new(&db).start_visit(&session, &patient_id, input.into())?;
        Ok(visit.into())
    }

    pub fn close_visit(
        &self,
        session_id: String,
        visit_id: String,
        outcome: FfiVisitOutcome,
    ) -> Result<FfiVisit, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        let visit = PatientManager::new(&db).close_visit(&session, &visit_id, outcome.into())?;
        Ok(visit.into())
    }

    pub fn update_visit_notes(
        &self,
        session_id: String,
        visit_id: String,
        notes: String,
    ) -> Result<FfiVisit, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        let visit = PatientManager::new(&db).update_visit_notes(&session, &visit_id, &notes)?;
        Ok(visit.into())
    }

    pub fn get_visit(&self, id: String) -> Result<Option<FfiVisit>, ClinicError> {
        let db = self.db.lock()?;
        let visit = PatientManager::new(&db).find_visit(&id)?;
        Ok(visit.map(|v| v.into()))
    }

    pub fn list_visits(&self, patient_id: String) -> Result<Vec<FfiVisit>, ClinicError> {
        let db = self.db.lock()?;
        let visits = PatientManager::new(&db).list_visits(&patient_id)?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }

    pub fn active_visits(&self) -> Result<Vec<FfiActiveVisit>, ClinicError> {
        let db = self.db.lock()?;
        let visits = PatientManager::new(&db).active_visits()?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }

    pub fn add_medical_history(
        &self,
        session_id: String,
        patient_id: String,
        input: FfiMedicalHistoryInput,
    ) -> Result<FfiMedicalHistoryEntry, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        let entry =
            PatientManager::new(&db).add_medical_history(&session, &patient_id, input.into())?;
        Ok(entry.into())
    }

    pub fn medical_history(
        &self,
        patient_id: String,
    ) -> Result<Vec<FfiMedicalHistoryEntry>, ClinicError> {
        let db = self.db.lock()?;
        let entries = PatientManager::new(&db).medical_history(&patient_id)?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }

    // =========================================================================
    // Appointment Operations
    // =========================================================================

    /// Book an appointment. `scheduled_at` is an RFC 3339 timestamp.
    pub fn schedule_appointment(
        &self,
        session_id: String,
        patient_id: String,
        scheduled_at: String,
        details: FfiAppointmentDetails,
    ) -> Result<FfiAppointment, ClinicError> {
        let session = self.session(&session_id)?;
        let scheduled_at = parse_timestamp("scheduled_at", &scheduled_at)?;
        let db = self.db.lock()?;
        let config = ConfigStore::new(&db).load()?;
        let details = details.into_details(config.default_appointment_minutes);
        let appt =
            AppointmentManager::new(&db).schedule(&session, &patient_id, scheduled_at, details)?;
        Ok(appt.into())
    }

    pub fn reschedule_appointment(
        &self,
        session_id: String,
        id: String,
        scheduled_at: String,
    ) -> Result<FfiAppointment, ClinicError> {
        let session = self.session(&session_id)?;
        let scheduled_at = parse_timestamp("scheduled_at", &scheduled_at)?;
        let db = self.db.lock()?;
        Ok(AppointmentManager::new(&db)
            .reschedule(&session, &id, scheduled_at)?
            .into())
    }

    /// Mark an appointment fulfilled by an existing visit.
    pub fn complete_appointment(
        &self,
        session_id: String,
        id: String,
        visit_id: String,
    ) -> Result<FfiAppointment, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        Ok(AppointmentManager::new(&db)
            .complete(&session, &id, &visit_id)?
            .into())
    }

    /// Start a visit for the appointment and complete it.
    pub fn check_in_appointment(
        &self,
        session_id: String,
        id: String,
        input: FfiVisitInput,
    ) -> Result<FfiCheckIn, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        let (appointment, visit) = AppointmentManager::new(&db).check_in(&session, &id, input.into())?;
        Ok(FfiCheckIn {
            appointment: appointment.into(),
            visit: visit.into(),
        })
    }

    pub fn cancel_appointment(
        &self,
        session_id: String,
        id: String,
        reason: Option<String>,
    ) -> Result<FfiAppointment, ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        Ok(AppointmentManager::new(&db)
            .cancel(&session, &id, reason)?
            .into())
    }

    pub fn get_appointment(&self, id: String) -> Result<Option<FfiAppointment>, ClinicError> {
        let db = self.db.lock()?;
        let appt = AppointmentManager::new(&db).find_by_id(&id)?;
        Ok(appt.map(|a| a.into()))
    }

    /// Appointments matching the filter, ascending by scheduled time.
    pub fn list_appointments(
        &self,
        filter: FfiAppointmentFilter,
    ) -> Result<Vec<FfiAppointment>, ClinicError> {
        let filter = models::AppointmentFilter::try_from(filter)?;
        let db = self.db.lock()?;
        let appts = AppointmentManager::new(&db).list(&filter)?;
        Ok(appts.into_iter().map(|a| a.into()).collect())
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Attach a document, copying `source_path` into the document store.
    pub fn attach_document(
        &self,
        session_id: String,
        parent: FfiDocumentParent,
        input: FfiDocumentInput,
        source_path: Option<String>,
    ) -> Result<FfiDocument, ClinicError> {
        let session = self.session(&session_id)?;
        let source = source_path.map(PathBuf::from);
        let db = self.db.lock()?;
        let timeout = ConfigStore::new(&db).load()?.upload_timeout();
        let doc = DocumentManager::new(&db, &self.documents_dir)
            .with_upload_timeout(timeout)
            .attach(&session, parent.into(), input.into(), source.as_deref())?;
        Ok(doc.into())
    }

    /// Update a document's metadata, replacing its stored file when
    /// `source_path` is given.
    pub fn update_document(
        &self,
        session_id: String,
        id: String,
        input: FfiDocumentInput,
        source_path: Option<String>,
    ) -> Result<FfiDocument, ClinicError> {
        let session = self.session(&session_id)?;
        let source = source_path.map(PathBuf::from);
        let db = self.db.lock()?;
        let timeout = ConfigStore::new(&db).load()?.upload_timeout();
        Ok(DocumentManager::new(&db, &self.documents_dir)
            .with_upload_timeout(timeout)
            .update(&session, &id, input.into(), source.as_deref())?
            .into())
    }

    pub fn delete_document(&self, session_id: String, id: String) -> Result<(), ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        DocumentManager::new(&db, &self.documents_dir).delete(&session, &id)?;
        Ok(())
    }

    pub fn get_document(&self, id: String) -> Result<Option<FfiDocument>, ClinicError> {
        let db = self.db.lock()?;
        let doc = DocumentManager::new(&db, &self.documents_dir).find_by_id(&id)?;
        Ok(doc.map(|d| d.into()))
    }

    pub fn list_documents(&self, parent: FfiDocumentParent) -> Result<Vec<FfiDocument>, ClinicError> {
        let db = self.db.lock()?;
        let docs = DocumentManager::new(&db, &self.documents_dir).list_for(&parent.into())?;
        Ok(docs.into_iter().map(|d| d.into()).collect())
    }

    pub fn list_documents_by_category(
        &self,
        patient_id: String,
        category: String,
    ) -> Result<Vec<FfiDocument>, ClinicError> {
        let db = self.db.lock()?;
        let docs =
            DocumentManager::new(&db, &self.documents_dir).list_by_category(&patient_id, &category)?;
        Ok(docs.into_iter().map(|d| d.into()).collect())
    }

    /// Configured categories, then any other category already in use.
    pub fn document_categories(&self) -> Result<Vec<String>, ClinicError> {
        let db = self.db.lock()?;
        let in_use = DocumentManager::new(&db, &self.documents_dir).categories()?;
        Ok(ConfigStore::new(&db).load()?.document_categories_with(in_use))
    }

    /// Absolute path of the stored file, if the document has one.
    pub fn document_path(&self, id: String) -> Result<Option<String>, ClinicError> {
        let db = self.db.lock()?;
        let path = DocumentManager::new(&db, &self.documents_dir).file_path(&id)?;
        Ok(path.map(|p| p.to_string_lossy().into_owned()))
    }

    /// Whether the stored file still matches its recorded checksum.
    pub fn verify_document(&self, id: String) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(DocumentManager::new(&db, &self.documents_dir).verify_integrity(&id)?)
    }

    // =========================================================================
    // Test Result Operations
    // =========================================================================

    pub fn record_test_result(
        &self,
        session_id: String,
        visit_id: String,
        input: FfiTestResultInput,
    ) -> Result<FfiTestResult, ClinicError> {
        let session = self.session(&session_id)?;
        let input = models::TestResultInput::try_from(input)?;
        let db = self.db.lock()?;
        Ok(TestResultManager::new(&db)
            .record(&session, &visit_id, input)?
            .into())
    }

    /// Always fails: results are append-only. Record a correction instead.
    pub fn update_test_result(
        &self,
        session_id: String,
        id: String,
        input: FfiTestResultInput,
    ) -> Result<FfiTestResult, ClinicError> {
        let session = self.session(&session_id)?;
        let input = models::TestResultInput::try_from(input)?;
        let db = self.db.lock()?;
        Ok(TestResultManager::new(&db).update(&session, &id, input)?.into())
    }

    /// Always fails: results are append-only.
    pub fn delete_test_result(&self, session_id: String, id: String) -> Result<(), ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        TestResultManager::new(&db).delete(&session, &id)?;
        Ok(())
    }

    pub fn get_test_result(&self, id: String) -> Result<Option<FfiTestResult>, ClinicError> {
        let db = self.db.lock()?;
        let result = TestResultManager::new(&db).find_by_id(&id)?;
        Ok(result.map(|r| r.into()))
    }

    pub fn list_visit_results(&self, visit_id: String) -> Result<Vec<FfiTestResult>, ClinicError> {
        let db = self.db.lock()?;
        let results = TestResultManager::new(&db).list_for_visit(&visit_id)?;
        Ok(results.into_iter().map(|r| r.into()).collect())
    }

    pub fn list_patient_results(
        &self,
        patient_id: String,
    ) -> Result<Vec<FfiTestResult>, ClinicError> {
        let db = self.db.lock()?;
        let results = TestResultManager::new(&db).list_for_patient(&patient_id)?;
        Ok(results.into_iter().map(|r| r.into()).collect())
    }

    pub fn list_results_by_test(
        &self,
        patient_id: String,
        test_name: String,
    ) -> Result<Vec<FfiTestResult>, ClinicError> {
        let db = self.db.lock()?;
        let results = TestResultManager::new(&db).list_by_test(&patient_id, &test_name)?;
        Ok(results.into_iter().map(|r| r.into()).collect())
    }

    /// The result that corrects `id`, if any.
    pub fn superseding_result(&self, id: String) -> Result<Option<FfiTestResult>, ClinicError> {
        let db = self.db.lock()?;
        let result = TestResultManager::new(&db).superseded_by(&id)?;
        Ok(result.map(|r| r.into()))
    }

    /// Numeric values of one test over time, corrections applied.
    pub fn test_trend(
        &self,
        patient_id: String,
        test_name: String,
    ) -> Result<Vec<FfiTrendPoint>, ClinicError> {
        let db = self.db.lock()?;
        let points = TestResultManager::new(&db).trend(&patient_id, &test_name)?;
        Ok(points.into_iter().map(|p| p.into()).collect())
    }

    pub fn test_types(&self) -> Result<Vec<String>, ClinicError> {
        let db = self.db.lock()?;
        Ok(TestResultManager::new(&db).test_types()?)
    }

    // =========================================================================
    // Report Operations
    // =========================================================================

    /// Patient report as JSON. `from`/`to` are optional `YYYY-MM-DD` bounds.
    pub fn report_json(
        &self,
        patient_id: String,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<String, ClinicError> {
        Ok(self.report(&patient_id, from, to)?.to_json()?)
    }

    /// Patient report as printable text.
    pub fn report_text(
        &self,
        patient_id: String,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<String, ClinicError> {
        Ok(self.report(&patient_id, from, to)?.to_text())
    }

    // =========================================================================
    // Configuration & Maintenance
    // =========================================================================

    pub fn get_config(&self) -> Result<FfiClinicConfig, ClinicError> {
        let db = self.db.lock()?;
        Ok(ConfigStore::new(&db).load()?.into())
    }

    /// Replace the clinic settings. Admin only.
    pub fn save_config(&self, session_id: String, config: FfiClinicConfig) -> Result<(), ClinicError> {
        let session = self.session(&session_id)?;
        let db = self.db.lock()?;
        ConfigStore::new(&db).save(&session, &config.into())?;
        Ok(())
    }

    /// Back up the database and document files, then prune old backups.
    /// Admin only.
    pub fn create_backup(&self, session_id: String) -> Result<FfiBackup, ClinicError> {
        let session = self.session(&session_id)?;
        session.require_admin("creating backups")?;
        let db = self.db.lock()?;
        let backup = self.backups(&db)?.create_backup(&db)?;
        Ok(backup.into())
    }

    pub fn list_backups(&self) -> Result<Vec<FfiBackup>, ClinicError> {
        let db = self.db.lock()?;
        let backups = self.backups(&db)?.list_backups()?;
        Ok(backups.into_iter().map(|b| b.into()).collect())
    }

    /// Restore the backup `name` over the current data. Admin only.
    ///
    /// Returns the safety backup of the state that was replaced.
    pub fn restore_backup(&self, session_id: String, name: String) -> Result<FfiBackup, ClinicError> {
        let session = self.session(&session_id)?;
        let mut db = self.db.lock()?;
        let backups = self.backups(&db)?;
        let safety = backups.restore_backup(&mut db, &session, &name)?;
        Ok(safety.into())
    }

    // =========================================================================
    // Audit Operations
    // =========================================================================

    /// Re-hash the audit chain and report the first broken link.
    pub fn verify_audit_chain(&self) -> Result<FfiChainVerification, ClinicError> {
        let db = self.db.lock()?;
        Ok(AuditLog::new(&db).verify_chain()?.into())
    }

    pub fn recent_audit_entries(&self, limit: u32) -> Result<Vec<FfiAuditEntry>, ClinicError> {
        let db = self.db.lock()?;
        let entries = AuditLog::new(&db).recent(limit)?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }

    pub fn audit_entries_for(
        &self,
        entity_type: String,
        entity_id: String,
    ) -> Result<Vec<FfiAuditEntry>, ClinicError> {
        let db = self.db.lock()?;
        let entries = AuditLog::new(&db).entries_for(&entity_type, &entity_id)?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }
}
