//! End-to-end clinic workflow tests.

use anyhow::Result;
use chrono::{Duration, NaiveDate, TimeZone, Utc};

use clinic_core::audit::AuditLog;
use clinic_core::auth::Session;
use clinic_core::db::Database;
use clinic_core::managers::{
    AppointmentManager, DocumentManager, ManagerError, PatientManager, TestResultManager,
};
use clinic_core::models::{
    AppointmentDetails, AppointmentStatus, DocumentInput, DocumentParent, PatientDetails, Role,
    TestResultInput, User, VisitInput, VisitOutcome,
};
use clinic_core::report::{ClinicHeader, DateRange, ReportGenerator};

fn staff() -> Session {
    Session::start(User {
        username: "reception".to_string(),
        name: "Front Desk".to_string(),
        role: Role::Staff,
        created_at: Utc::now(),
    })
}

fn header() -> ClinicHeader {
    ClinicHeader {
        name: "Medical Clinic".to_string(),
        address: "123 Health St, Medical City".to_string(),
        phone: "123-456-7890".to_string(),
        email: "info@medicalclinic.com".to_string(),
    }
}

fn dob(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_patient_visit_appointment_report_scenario() -> Result<()> {
    let db = Database::open_in_memory()?;
    let dir = tempfile::tempdir()?;
    let session = staff();

    let patients = PatientManager::new(&db);
    let patient = patients.create(
        &session,
        PatientDetails::new("Jane Doe").with_date_of_birth(dob(1990, 1, 1)),
    )?;
    assert_eq!(patient.id, "p-1");

    let appointments = AppointmentManager::new(&db);
    let appt = appointments.schedule(
        &session,
        "p-1",
        Utc::now() + Duration::days(2),
        AppointmentDetails::default(),
    )?;
    assert_eq!(appt.status, AppointmentStatus::Scheduled);

    let visit = patients.start_visit(&session, "p-1", VisitInput::default())?;
    assert_eq!(visit.id, "v-1");
    let appt = appointments.complete(&session, &appt.id, "v-1")?;
    assert_eq!(appt.status, AppointmentStatus::Completed);
    assert_eq!(appt.visit_id.as_deref(), Some("v-1"));

    let results = TestResultManager::new(&db);
    results.record(
        &session,
        "v-1",
        TestResultInput::new("CBC", "Normal", Utc::now().date_naive()),
    )?;

    let report = ReportGenerator::new(&db, dir.path(), header()).generate("p-1", None)?;
    assert_eq!(report.patient.id, "p-1");
    assert_eq!(report.appointments.len(), 1);
    assert_eq!(report.appointments[0].status, AppointmentStatus::Completed);
    assert_eq!(report.visits.len(), 1);
    assert_eq!(report.test_results.len(), 1);
    assert_eq!(report.test_results[0].test_name, "CBC");
    assert_eq!(report.test_results[0].value, "Normal");
    assert!(report.documents.is_empty());

    // Terminal appointments stay terminal
    assert!(matches!(
        appointments.complete(&session, &appt.id, "v-1"),
        Err(ManagerError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        appointments.cancel(&session, &appt.id, None),
        Err(ManagerError::InvalidStateTransition { .. })
    ));
    Ok(())
}

#[test]
fn test_archive_requires_closed_visits() -> Result<()> {
    let db = Database::open_in_memory()?;
    let session = staff();
    let patients = PatientManager::new(&db);

    let patient = patients.create(&session, PatientDetails::new("John Roe"))?;
    let visit = patients.start_visit(&session, &patient.id, VisitInput::default())?;

    assert!(matches!(
        patients.archive(&session, &patient.id),
        Err(ManagerError::ReferentialIntegrity { .. })
    ));

    patients.close_visit(&session, &visit.id, VisitOutcome::default())?;
    let archived = patients.archive(&session, &patient.id)?;
    assert!(archived.is_archived());
    Ok(())
}

#[test]
fn test_results_are_append_only() -> Result<()> {
    let db = Database::open_in_memory()?;
    let session = staff();
    let patients = PatientManager::new(&db);
    let patient = patients.create(&session, PatientDetails::new("Jane Doe"))?;
    let visit = patients.start_visit(&session, &patient.id, VisitInput::default())?;

    let results = TestResultManager::new(&db);
    let today = Utc::now().date_naive();
    let original = results.record(&session, &visit.id, TestResultInput::new("Glucose", "9.1", today))?;

    assert!(matches!(
        results.update(&session, &original.id, TestResultInput::new("Glucose", "5.1", today)),
        Err(ManagerError::ImmutableRecord { .. })
    ));
    assert!(matches!(
        results.delete(&session, &original.id),
        Err(ManagerError::ImmutableRecord { .. })
    ));

    let mut correction = TestResultInput::new("Glucose", "5.1", today);
    correction.supersedes = Some(original.id.clone());
    let corrected = results.record(&session, &visit.id, correction)?;

    assert_eq!(results.find_by_id(&original.id)?.map(|r| r.value), Some("9.1".to_string()));
    assert_eq!(results.superseded_by(&original.id)?.map(|r| r.id), Some(corrected.id));

    let trend = results.trend(&patient.id, "glucose")?;
    assert_eq!(trend.len(), 1);
    assert_eq!(trend[0].value, 5.1);
    Ok(())
}

#[test]
fn test_report_is_deterministic_for_same_as_of() -> Result<()> {
    let db = Database::open_in_memory()?;
    let dir = tempfile::tempdir()?;
    let session = staff();

    let patients = PatientManager::new(&db);
    let patient = patients.create(&session, PatientDetails::new("Jane Doe"))?;
    let visit = patients.start_visit(&session, &patient.id, VisitInput::default())?;
    TestResultManager::new(&db).record(
        &session,
        &visit.id,
        TestResultInput::new("CBC", "Normal", Utc::now().date_naive()),
    )?;

    let source = dir.path().join("scan.pdf");
    std::fs::write(&source, b"%PDF-1.4 scan")?;
    let store = dir.path().join("store");
    DocumentManager::new(&db, &store).attach(
        &session,
        DocumentParent::Patient(patient.id.clone()),
        DocumentInput {
            name: "Chest X-ray".to_string(),
            category: "Imaging".to_string(),
            description: None,
        },
        Some(&source),
    )?;

    let generator = ReportGenerator::new(&db, &store, header());
    let as_of = Utc.with_ymd_and_hms(2030, 6, 1, 8, 0, 0).unwrap();
    let first = generator.generate_at(&patient.id, None, as_of)?;
    let second = generator.generate_at(&patient.id, None, as_of)?;

    assert_eq!(first.to_json()?, second.to_json()?);
    assert_eq!(first.to_text(), second.to_text());
    assert_eq!(first.documents.len(), 1);
    assert_eq!(first.documents[0].file_size, Some(13));
    Ok(())
}

#[test]
fn test_report_date_range() -> Result<()> {
    let db = Database::open_in_memory()?;
    let dir = tempfile::tempdir()?;
    let session = staff();

    let patients = PatientManager::new(&db);
    let patient = patients.create(&session, PatientDetails::new("Jane Doe"))?;
    AppointmentManager::new(&db).schedule(
        &session,
        &patient.id,
        Utc::now() + Duration::days(40),
        AppointmentDetails::default(),
    )?;

    let generator = ReportGenerator::new(&db, dir.path(), header());
    let today = Utc::now().date_naive();

    let this_week = DateRange::between(today, today + Duration::days(7))?;
    assert!(generator.generate(&patient.id, Some(this_week))?.appointments.is_empty());

    let whole_quarter = DateRange::between(today, today + Duration::days(90))?;
    assert_eq!(generator.generate(&patient.id, Some(whole_quarter))?.appointments.len(), 1);
    Ok(())
}

#[test]
fn test_every_mutation_is_audited_and_chain_verifies() -> Result<()> {
    let db = Database::open_in_memory()?;
    let session = staff();

    let patients = PatientManager::new(&db);
    let patient = patients.create(&session, PatientDetails::new("Jane Doe"))?;
    let visit = patients.start_visit(&session, &patient.id, VisitInput::default())?;
    patients.close_visit(&session, &visit.id, VisitOutcome::default())?;
    patients.archive(&session, &patient.id)?;

    let log = AuditLog::new(&db);
    let for_patient = log.entries_for("patient", &patient.id)?;
    let operations: Vec<_> = for_patient.iter().map(|e| e.operation.as_str()).collect();
    assert_eq!(operations, vec!["patient.create", "patient.archive"]);
    assert!(for_patient.iter().all(|e| e.actor == "reception"));

    let check = log.verify_chain()?;
    assert!(check.is_valid());
    assert_eq!(check.entries, 4);
    Ok(())
}

#[test]
fn test_failed_operation_leaves_no_trace() -> Result<()> {
    let db = Database::open_in_memory()?;
    let session = staff();
    let before = AuditLog::new(&db).recent(100)?.len();

    let result = AppointmentManager::new(&db).schedule(
        &session,
        "p-404",
        Utc::now() + Duration::days(1),
        AppointmentDetails::default(),
    );
    assert!(matches!(result, Err(ManagerError::NotFound { .. })));
    assert_eq!(AuditLog::new(&db).recent(100)?.len(), before);
    Ok(())
}
