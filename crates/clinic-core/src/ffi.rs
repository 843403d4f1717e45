//! FFI-safe records exchanged with the host application.
//!
//! Timestamps cross the boundary as RFC 3339 strings, calendar dates as
//! `YYYY-MM-DD` and statuses as lowercase strings.

use chrono::{DateTime, NaiveDate, Utc};

use crate::audit::ChainVerification;
use crate::auth::Session;
use crate::backup::BackupInfo;
use crate::config::ClinicConfig;
use crate::models::{
    ActiveVisit, Appointment, AppointmentDetails, AppointmentFilter, AppointmentStatus,
    AuditEntry, Document, DocumentInput, DocumentParent, MedicalHistoryEntry,
    MedicalHistoryInput, Patient, PatientCriteria, PatientDetails, Role, TestResult,
    TestResultInput, TrendPoint, User, Visit, VisitInput, VisitOutcome,
};
use crate::validation::{self, ValidationError, ValidationResult};

pub(crate) fn parse_timestamp(field: &str, value: &str) -> ValidationResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ValidationError::new(field, format!("'{}' is not an RFC 3339 timestamp", value)))
}

pub(crate) fn parse_date(field: &str, value: Option<&str>) -> ValidationResult<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => validation::iso_date(field, v).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn parse_role(value: &str) -> ValidationResult<Role> {
    Role::parse(&value.trim().to_lowercase())
        .ok_or_else(|| ValidationError::new("role", format!("unknown role '{}'", value)))
}

fn parse_appointment_status(value: &str) -> ValidationResult<AppointmentStatus> {
    AppointmentStatus::parse(&value.trim().to_lowercase())
        .ok_or_else(|| ValidationError::new("status", format!("unknown status '{}'", value)))
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

// =========================================================================
// Users & sessions
// =========================================================================

/// FFI-safe user account (never carries credentials).
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub username: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            name: user.name,
            role: user.role.as_str().to_string(),
            created_at: rfc3339(user.created_at),
        }
    }
}

/// FFI-safe login session.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSession {
    pub session_id: String,
    pub user: FfiUser,
    pub started_at: String,
}

impl From<Session> for FfiSession {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            user: session.user.into(),
            started_at: rfc3339(session.started_at),
        }
    }
}

// =========================================================================
// Patients
// =========================================================================

/// FFI-safe patient fields for create and update.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiPatientDetails {
    pub name: String,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub external_id: Option<String>,
    pub medical_history: Option<String>,
}

impl TryFrom<FfiPatientDetails> for PatientDetails {
    type Error = ValidationError;

    fn try_from(details: FfiPatientDetails) -> ValidationResult<Self> {
        Ok(PatientDetails {
            date_of_birth: parse_date("date_of_birth", details.date_of_birth.as_deref())?,
            name: details.name,
            gender: details.gender,
            phone: details.phone,
            email: details.email,
            address: details.address,
            external_id: details.external_id,
            medical_history: details.medical_history,
        })
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub external_id: Option<String>,
    pub medical_history: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        let details = patient.details;
        Self {
            id: patient.id,
            name: details.name,
            date_of_birth: details.date_of_birth.map(|d| d.to_string()),
            gender: details.gender,
            phone: details.phone,
            email: details.email,
            address: details.address,
            external_id: details.external_id,
            medical_history: details.medical_history,
            status: patient.status.as_str().to_string(),
            created_at: rfc3339(patient.created_at),
            updated_at: rfc3339(patient.updated_at),
        }
    }
}

/// FFI-safe patient search criteria.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiPatientCriteria {
    pub id: Option<String>,
    pub name_contains: Option<String>,
    /// Matches name, phone, e-mail or external id
    pub term: Option<String>,
    pub born_on_or_after: Option<String>,
    pub born_on_or_before: Option<String>,
    pub include_archived: bool,
}

impl TryFrom<FfiPatientCriteria> for PatientCriteria {
    type Error = ValidationError;

    fn try_from(criteria: FfiPatientCriteria) -> ValidationResult<Self> {
        Ok(PatientCriteria {
            born_on_or_after: parse_date("born_on_or_after", criteria.born_on_or_after.as_deref())?,
            born_on_or_before: parse_date("born_on_or_before", criteria.born_on_or_before.as_deref())?,
            id: criteria.id,
            name_contains: criteria.name_contains,
            term: criteria.term,
            include_archived: criteria.include_archived,
        })
    }
}

// =========================================================================
// Visits & medical history
// =========================================================================

#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiVisitInput {
    pub doctor: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl From<FfiVisitInput> for VisitInput {
    fn from(input: FfiVisitInput) -> Self {
        VisitInput {
            doctor: input.doctor,
            reason: input.reason,
            notes: input.notes,
        }
    }
}

#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiVisitOutcome {
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub follow_up: Option<String>,
}

impl From<FfiVisitOutcome> for VisitOutcome {
    fn from(outcome: FfiVisitOutcome) -> Self {
        VisitOutcome {
            notes: outcome.notes,
            diagnosis: outcome.diagnosis,
            treatment: outcome.treatment,
            follow_up: outcome.follow_up,
        }
    }
}

/// FFI-safe visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: String,
    pub patient_id: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub status: String,
    pub doctor: Option<String>,
    pub reason: Option<String>,
    pub notes: String,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub follow_up: Option<String>,
}

impl From<Visit> for FfiVisit {
    fn from(visit: Visit) -> Self {
        Self {
            id: visit.id,
            patient_id: visit.patient_id,
            started_at: rfc3339(visit.started_at),
            ended_at: visit.ended_at.map(rfc3339),
            status: visit.status.as_str().to_string(),
            doctor: visit.doctor,
            reason: visit.reason,
            notes: visit.notes,
            diagnosis: visit.diagnosis,
            treatment: visit.treatment,
            follow_up: visit.follow_up,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActiveVisit {
    pub patient_name: String,
    pub visit: FfiVisit,
}

impl From<ActiveVisit> for FfiActiveVisit {
    fn from(active: ActiveVisit) -> Self {
        Self {
            patient_name: active.patient_name,
            visit: active.visit.into(),
        }
    }
}

#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiMedicalHistoryInput {
    pub kind: Option<String>,
    pub condition: String,
    pub notes: Option<String>,
    pub treatment: Option<String>,
}

impl From<FfiMedicalHistoryInput> for MedicalHistoryInput {
    fn from(input: FfiMedicalHistoryInput) -> Self {
        MedicalHistoryInput {
            kind: input.kind,
            condition: input.condition,
            notes: input.notes,
            treatment: input.treatment,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicalHistoryEntry {
    pub id: String,
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub recorded_at: String,
    pub kind: String,
    pub condition: String,
    pub notes: Option<String>,
    pub treatment: Option<String>,
}

impl From<MedicalHistoryEntry> for FfiMedicalHistoryEntry {
    fn from(entry: MedicalHistoryEntry) -> Self {
        Self {
            id: entry.id,
            patient_id: entry.patient_id,
            visit_id: entry.visit_id,
            recorded_at: rfc3339(entry.recorded_at),
            kind: entry.kind,
            condition: entry.condition,
            notes: entry.notes,
            treatment: entry.treatment,
        }
    }
}

// =========================================================================
// Appointments
// =========================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointmentDetails {
    pub doctor: Option<String>,
    /// Defaults to the configured appointment length
    pub duration_minutes: Option<u32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl FfiAppointmentDetails {
    pub(crate) fn into_details(self, default_minutes: u32) -> AppointmentDetails {
        AppointmentDetails {
            doctor: self.doctor,
            duration_minutes: self.duration_minutes.unwrap_or(default_minutes),
            reason: self.reason,
            notes: self.notes,
        }
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: String,
    pub patient_id: String,
    pub scheduled_at: String,
    pub duration_minutes: u32,
    pub doctor: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub visit_id: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Appointment> for FfiAppointment {
    fn from(appt: Appointment) -> Self {
        Self {
            id: appt.id,
            patient_id: appt.patient_id,
            scheduled_at: rfc3339(appt.scheduled_at),
            duration_minutes: appt.duration_minutes,
            doctor: appt.doctor,
            reason: appt.reason,
            notes: appt.notes,
            status: appt.status.as_str().to_string(),
            visit_id: appt.visit_id,
            cancel_reason: appt.cancel_reason,
            created_at: rfc3339(appt.created_at),
            updated_at: rfc3339(appt.updated_at),
        }
    }
}

/// FFI-safe appointment filter. Bounds are RFC 3339 timestamps.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiAppointmentFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<String>,
    pub patient_id: Option<String>,
    pub doctor: Option<String>,
}

impl TryFrom<FfiAppointmentFilter> for AppointmentFilter {
    type Error = ValidationError;

    fn try_from(filter: FfiAppointmentFilter) -> ValidationResult<Self> {
        Ok(AppointmentFilter {
            from: filter.from.as_deref().map(|v| parse_timestamp("from", v)).transpose()?,
            to: filter.to.as_deref().map(|v| parse_timestamp("to", v)).transpose()?,
            status: filter.status.as_deref().map(parse_appointment_status).transpose()?,
            patient_id: filter.patient_id,
            doctor: filter.doctor,
        })
    }
}

/// Result of checking a patient in for an appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCheckIn {
    pub appointment: FfiAppointment,
    pub visit: FfiVisit,
}

// =========================================================================
// Documents
// =========================================================================

#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiDocumentParent {
    Patient { id: String },
    Visit { id: String },
}

impl From<FfiDocumentParent> for DocumentParent {
    fn from(parent: FfiDocumentParent) -> Self {
        match parent {
            FfiDocumentParent::Patient { id } => DocumentParent::Patient(id),
            FfiDocumentParent::Visit { id } => DocumentParent::Visit(id),
        }
    }
}

#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiDocumentInput {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
}

impl From<FfiDocumentInput> for DocumentInput {
    fn from(input: FfiDocumentInput) -> Self {
        DocumentInput {
            name: input.name,
            category: input.category,
            description: input.description,
        }
    }
}

/// FFI-safe document metadata.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDocument {
    pub id: String,
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub checksum: Option<String>,
    pub uploaded_at: String,
    pub updated_at: String,
}

impl From<Document> for FfiDocument {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            patient_id: doc.patient_id,
            visit_id: doc.visit_id,
            name: doc.name,
            category: doc.category,
            description: doc.description,
            file_name: doc.file_name,
            file_size: doc.file_size,
            checksum: doc.checksum,
            uploaded_at: rfc3339(doc.uploaded_at),
            updated_at: rfc3339(doc.updated_at),
        }
    }
}

// =========================================================================
// Test results
// =========================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestResultInput {
    pub test_name: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    /// `YYYY-MM-DD`
    pub test_date: String,
    pub notes: Option<String>,
    pub supersedes: Option<String>,
}

impl TryFrom<FfiTestResultInput> for TestResultInput {
    type Error = ValidationError;

    fn try_from(input: FfiTestResultInput) -> ValidationResult<Self> {
        Ok(TestResultInput {
            test_date: validation::iso_date("test_date", input.test_date.trim())?,
            test_name: input.test_name,
            value: input.value,
            unit: input.unit,
            reference_range: input.reference_range,
            notes: input.notes,
            supersedes: input.supersedes,
        })
    }
}

/// FFI-safe test result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestResult {
    pub id: String,
    pub visit_id: String,
    pub patient_id: String,
    pub test_name: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub test_date: String,
    pub notes: Option<String>,
    pub supersedes: Option<String>,
    pub recorded_by: String,
    pub recorded_at: String,
}

impl From<TestResult> for FfiTestResult {
    fn from(result: TestResult) -> Self {
        Self {
            id: result.id,
            visit_id: result.visit_id,
            patient_id: result.patient_id,
            test_name: result.test_name,
            value: result.value,
            unit: result.unit,
            reference_range: result.reference_range,
            test_date: result.test_date.to_string(),
            notes: result.notes,
            supersedes: result.supersedes,
            recorded_by: result.recorded_by,
            recorded_at: rfc3339(result.recorded_at),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTrendPoint {
    pub result_id: String,
    pub test_date: String,
    pub value: f64,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

impl From<TrendPoint> for FfiTrendPoint {
    fn from(point: TrendPoint) -> Self {
        Self {
            result_id: point.result_id,
            test_date: point.test_date.to_string(),
            value: point.value,
            unit: point.unit,
            reference_range: point.reference_range,
        }
    }
}

// =========================================================================
// Configuration, backups, audit
// =========================================================================

/// FFI-safe clinic configuration.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClinicConfig {
    pub clinic_name: String,
    pub clinic_address: String,
    pub clinic_phone: String,
    pub clinic_email: String,
    pub doctors: Vec<String>,
    pub specialties: Vec<String>,
    pub visit_reasons: Vec<String>,
    pub document_categories: Vec<String>,
    pub max_login_attempts: u32,
    pub lockout_minutes: u32,
    pub upload_timeout_secs: u64,
    pub backups_to_keep: u32,
    pub default_appointment_minutes: u32,
    pub log_filter: String,
}

impl From<ClinicConfig> for FfiClinicConfig {
    fn from(config: ClinicConfig) -> Self {
        Self {
            clinic_name: config.clinic_name,
            clinic_address: config.clinic_address,
            clinic_phone: config.clinic_phone,
            clinic_email: config.clinic_email,
            doctors: config.doctors,
            specialties: config.specialties,
            visit_reasons: config.visit_reasons,
            document_categories: config.document_categories,
            max_login_attempts: config.max_login_attempts,
            lockout_minutes: config.lockout_minutes,
            upload_timeout_secs: config.upload_timeout_secs,
            backups_to_keep: u32::try_from(config.backups_to_keep).unwrap_or(u32::MAX),
            default_appointment_minutes: config.default_appointment_minutes,
            log_filter: config.log_filter,
        }
    }
}

impl From<FfiClinicConfig> for ClinicConfig {
    fn from(config: FfiClinicConfig) -> Self {
        ClinicConfig {
            clinic_name: config.clinic_name,
            clinic_address: config.clinic_address,
            clinic_phone: config.clinic_phone,
            clinic_email: config.clinic_email,
            doctors: config.doctors,
            specialties: config.specialties,
            visit_reasons: config.visit_reasons,
            document_categories: config.document_categories,
            max_login_attempts: config.max_login_attempts,
            lockout_minutes: config.lockout_minutes,
            upload_timeout_secs: config.upload_timeout_secs,
            backups_to_keep: config.backups_to_keep as usize,
            default_appointment_minutes: config.default_appointment_minutes,
            log_filter: config.log_filter,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBackup {
    pub path: String,
    pub name: String,
    pub size: u64,
    /// Local time, `YYYY-MM-DDTHH:MM:SS`
    pub created_at: String,
}

impl From<BackupInfo> for FfiBackup {
    fn from(backup: BackupInfo) -> Self {
        Self {
            path: backup.path.to_string_lossy().into_owned(),
            name: backup.name,
            size: backup.size,
            created_at: backup.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAuditEntry {
    pub seq: i64,
    pub entry_id: String,
    pub recorded_at: String,
    pub actor: String,
    pub operation: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Option<String>,
    pub hash: String,
}

impl From<AuditEntry> for FfiAuditEntry {
    fn from(entry: AuditEntry) -> Self {
        Self {
            seq: entry.seq,
            entry_id: entry.entry_id,
            recorded_at: rfc3339(entry.recorded_at),
            actor: entry.actor,
            operation: entry.operation,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            hash: entry.hash,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChainVerification {
    pub entries: u64,
    pub valid: bool,
    pub first_broken_seq: Option<i64>,
}

impl From<ChainVerification> for FfiChainVerification {
    fn from(check: ChainVerification) -> Self {
        Self {
            valid: check.is_valid(),
            entries: check.entries,
            first_broken_seq: check.first_broken_seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        let at = parse_timestamp("scheduled_at", "2030-01-02T09:30:00+02:00").unwrap();
        assert_eq!(rfc3339(at), "2030-01-02T07:30:00+00:00");
        assert_eq!(
            parse_timestamp("scheduled_at", "tomorrow").unwrap_err().field,
            "scheduled_at"
        );
    }

    #[test]
    fn test_parse_date_blank_is_none() {
        assert_eq!(parse_date("date_of_birth", Some("  ")).unwrap(), None);
        assert_eq!(parse_date("date_of_birth", None).unwrap(), None);
        assert!(parse_date("date_of_birth", Some("1990-13-01")).is_err());
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("Admin").unwrap(), Role::Admin);
        assert!(parse_role("doctor").is_err());
    }

    #[test]
    fn test_filter_conversion() {
        let filter = AppointmentFilter::try_from(FfiAppointmentFilter {
            status: Some("Cancelled".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.status, Some(AppointmentStatus::Cancelled));

        assert!(AppointmentFilter::try_from(FfiAppointmentFilter {
            status: Some("pending".into()),
            ..Default::default()
        })
        .is_err());
    }
}
