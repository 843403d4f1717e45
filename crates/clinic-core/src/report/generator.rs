use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    AppointmentItem, ClinicHeader, DateRange, DocumentItem, HistoryItem, PatientSection,
    ReportDocument, ReportTotals, TestResultItem, VisitItem,
};
use crate::db::Database;
use crate::managers::{
    AppointmentManager, DocumentManager, ManagerError, ManagerResult, PatientManager,
    TestResultManager,
};
use crate::models::{AppointmentStatus, DocumentParent, EntityKind, Patient};

/// Builds [`ReportDocument`]s from the managers' read operations.
pub struct ReportGenerator<'a> {
    patients: PatientManager<'a>,
    appointments: AppointmentManager<'a>,
    documents: DocumentManager<'a>,
    results: TestResultManager<'a>,
    clinic: ClinicHeader,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(db: &'a Database, documents_root: impl Into<PathBuf>, clinic: ClinicHeader) -> Self {
        Self {
            patients: PatientManager::new(db),
            appointments: AppointmentManager::new(db),
            documents: DocumentManager::new(db, documents_root),
            results: TestResultManager::new(db),
            clinic,
        }
    }

    /// Report for `patient_id` as of now.
    pub fn generate(&self, patient_id: &str, range: Option<DateRange>) -> ManagerResult<ReportDocument> {
        self.generate_at(patient_id, range, Utc::now())
    }

    /// Report for `patient_id` as of `as_of`. Identical inputs give identical
    /// documents.
    pub fn generate_at(
        &self,
        patient_id: &str,
        range: Option<DateRange>,
        as_of: DateTime<Utc>,
    ) -> ManagerResult<ReportDocument> {
        let period = range.unwrap_or_default();
        period.validate()?;

        let patient = self
            .patients
            .find_by_id(patient_id)?
            .ok_or_else(|| ManagerError::not_found(EntityKind::Patient, patient_id))?;
        debug!(patient_id, ?period, "Generating report");

        // Medical history is cumulative and not limited to the period
        let medical_history: Vec<HistoryItem> = self
            .patients
            .medical_history(patient_id)?
            .into_iter()
            .map(|entry| HistoryItem {
                id: entry.id,
                date: entry.recorded_at.date_naive(),
                kind: entry.kind,
                condition: entry.condition,
                notes: entry.notes,
                treatment: entry.treatment,
                visit_id: entry.visit_id,
            })
            .collect();

        let visits: Vec<VisitItem> = self
            .patients
            .list_visits(patient_id)?
            .into_iter()
            .filter(|v| period.contains(v.started_at.date_naive()))
            .map(|v| VisitItem {
                id: v.id,
                started_at: v.started_at,
                ended_at: v.ended_at,
                status: v.status,
                doctor: v.doctor,
                reason: v.reason,
                notes: v.notes,
                diagnosis: v.diagnosis,
                treatment: v.treatment,
                follow_up: v.follow_up,
            })
            .collect();

        let appointments: Vec<AppointmentItem> = self
            .appointments
            .list_for_patient(patient_id)?
            .into_iter()
            .filter(|a| period.contains(a.scheduled_at.date_naive()))
            .map(|a| AppointmentItem {
                id: a.id,
                scheduled_at: a.scheduled_at,
                duration_minutes: a.duration_minutes,
                status: a.status,
                doctor: a.doctor,
                reason: a.reason,
                visit_id: a.visit_id,
                cancel_reason: a.cancel_reason,
            })
            .collect();

        let documents: Vec<DocumentItem> = self
            .documents
            .list_for(&DocumentParent::Patient(patient_id.to_string()))?
            .into_iter()
            .filter(|d| period.contains(d.uploaded_at.date_naive()))
            .map(|d| DocumentItem {
                id: d.id,
                name: d.name,
                category: d.category,
                description: d.description,
                visit_id: d.visit_id,
                uploaded_at: d.uploaded_at,
                file_name: d.file_name,
                file_size: d.file_size,
            })
            .collect();

        let all_results = self.results.list_for_patient(patient_id)?;
        let superseded: HashSet<String> = all_results
            .iter()
            .filter_map(|r| r.supersedes.clone())
            .collect();
        let test_results: Vec<TestResultItem> = all_results
            .into_iter()
            .filter(|r| period.contains(r.test_date))
            .map(|r| TestResultItem {
                superseded: superseded.contains(&r.id),
                id: r.id,
                visit_id: r.visit_id,
                test_name: r.test_name,
                value: r.value,
                unit: r.unit,
                reference_range: r.reference_range,
                test_date: r.test_date,
                notes: r.notes,
                supersedes: r.supersedes,
            })
            .collect();

        let totals = ReportTotals {
            medical_history: medical_history.len(),
            visits: visits.len(),
            appointments: appointments.len(),
            completed_appointments: count_status(&appointments, AppointmentStatus::Completed),
            cancelled_appointments: count_status(&appointments, AppointmentStatus::Cancelled),
            documents: documents.len(),
            test_results: test_results.len(),
        };

        Ok(ReportDocument {
            clinic: self.clinic.clone(),
            period,
            as_of,
            patient: patient_section(patient, as_of),
            medical_history,
            visits,
            appointments,
            documents,
            test_results,
            totals,
        })
    }
}

fn count_status(appointments: &[AppointmentItem], status: AppointmentStatus) -> usize {
    appointments.iter().filter(|a| a.status == status).count()
}

fn patient_section(patient: Patient, as_of: DateTime<Utc>) -> PatientSection {
    let age = patient.age_on(as_of.date_naive());
    let details = patient.details;
    PatientSection {
        id: patient.id,
        name: details.name,
        date_of_birth: details.date_of_birth,
        age,
        gender: details.gender,
        phone: details.phone,
        email: details.email,
        address: details.address,
        external_id: details.external_id,
        medical_history: details.medical_history,
        status: patient.status,
    }
}
