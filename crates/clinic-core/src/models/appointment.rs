//! Appointment models and the appointment state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Appointment status.
///
/// `Scheduled` is the only non-terminal state; it may move to `Completed` or
/// `Cancelled`, and nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Scheduled)
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Scheduled, AppointmentStatus::Completed)
                | (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional booking details for an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentDetails {
    pub doctor: Option<String>,
    /// Booked length in minutes
    pub duration_minutes: u32,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl Default for AppointmentDetails {
    fn default() -> Self {
        Self {
            doctor: None,
            duration_minutes: 30,
            reason: None,
            notes: None,
        }
    }
}

/// A scheduled appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    /// Generated identifier (`a-N`)
    pub id: String,
    /// Owning patient
    pub patient_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub doctor: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    /// Visit that fulfilled the appointment, set on completion
    pub visit_id: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(
        id: String,
        patient_id: String,
        scheduled_at: DateTime<Utc>,
        details: AppointmentDetails,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            patient_id,
            scheduled_at,
            duration_minutes: details.duration_minutes,
            doctor: details.doctor,
            reason: details.reason,
            notes: details.notes,
            status: AppointmentStatus::Scheduled,
            visit_id: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Whether this appointment's slot overlaps `[start, start + minutes)`.
    pub fn overlaps(&self, start: DateTime<Utc>, minutes: u32) -> bool {
        let end = start + Duration::minutes(i64::from(minutes));
        start < self.ends_at() && end > self.scheduled_at
    }
}

/// Filter for appointment listings. Results are ordered by scheduled time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    /// Earliest scheduled time (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// Latest scheduled time (inclusive)
    pub to: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub patient_id: Option<String>,
    pub doctor: Option<String>,
}

impl AppointmentFilter {
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: AppointmentStatus) -> Self {
        self.status = Some(status);
        self
    }
}
