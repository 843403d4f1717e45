//! Visit and medical history models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visit status. A visit opens at check-in and closes at checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Active,
    Closed,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Active => "active",
            VisitStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(VisitStatus::Active),
            "closed" => Some(VisitStatus::Closed),
            _ => None,
        }
    }
}

/// Check-in information for a new visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisitInput {
    pub doctor: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Checkout information recorded when a visit closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisitOutcome {
    /// Replaces the visit notes when present
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub follow_up: Option<String>,
}

/// A single clinical encounter belonging to a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    /// Generated identifier (`v-N`)
    pub id: String,
    /// Owning patient
    pub patient_id: String,
    /// Check-in time
    pub started_at: DateTime<Utc>,
    /// Checkout time, set when closed
    pub ended_at: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    pub doctor: Option<String>,
    pub reason: Option<String>,
    pub notes: String,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub follow_up: Option<String>,
}

impl Visit {
    /// Open a visit for a patient at the current time.
    pub fn start(id: String, patient_id: String, input: VisitInput) -> Self {
        Self {
            id,
            patient_id,
            started_at: Utc::now(),
            ended_at: None,
            status: VisitStatus::Active,
            doctor: input.doctor,
            reason: input.reason,
            notes: input.notes.unwrap_or_default(),
            diagnosis: None,
            treatment: None,
            follow_up: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == VisitStatus::Active
    }

    /// Close the visit with its checkout outcome.
    pub fn close(&mut self, outcome: VisitOutcome) {
        self.ended_at = Some(Utc::now());
        self.status = VisitStatus::Closed;
        if let Some(notes) = outcome.notes {
            self.notes = notes;
        }
        self.diagnosis = outcome.diagnosis;
        self.treatment = outcome.treatment;
        self.follow_up = outcome.follow_up;
    }
}

/// Active visit paired with its patient's name, for the waiting-room listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveVisit {
    pub patient_name: String,
    pub visit: Visit,
}

/// Input for a medical history entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicalHistoryInput {
    /// Entry kind, e.g. "condition", "diagnosis", "allergy"
    pub kind: Option<String>,
    pub condition: String,
    pub notes: Option<String>,
    pub treatment: Option<String>,
}

/// A dated medical history entry attached to a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicalHistoryEntry {
    pub id: String,
    pub patient_id: String,
    /// Visit that produced the entry, if any
    pub visit_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub kind: String,
    pub condition: String,
    pub notes: Option<String>,
    pub treatment: Option<String>,
}
