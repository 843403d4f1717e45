//! Patient models.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Patient lifecycle state. Patients are archived, never silently dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Active,
    Archived,
}

impl PatientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Active => "active",
            PatientStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PatientStatus::Active),
            "archived" => Some(PatientStatus::Archived),
            _ => None,
        }
    }
}

/// Editable patient fields, as captured at registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientDetails {
    /// Full name (required)
    pub name: String,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Gender as recorded by the clinic
    pub gender: Option<String>,
    /// Contact phone
    pub phone: Option<String>,
    /// Contact e-mail
    pub email: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// External identifier (insurance or national health number), unique when present
    pub external_id: Option<String>,
    /// Free-text medical history
    pub medical_history: Option<String>,
}

impl PatientDetails {
    /// Create details with only the required name set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_date_of_birth(mut self, date_of_birth: NaiveDate) -> Self {
        self.date_of_birth = Some(date_of_birth);
        self
    }
}

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Generated identifier (`p-N`)
    pub id: String,
    /// Registration fields
    #[serde(flatten)]
    pub details: PatientDetails,
    /// Active or archived
    pub status: PatientStatus,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Build a new active patient record.
    pub fn new(id: String, details: PatientDetails) -> Self {
        let now = Utc::now();
        Self {
            id,
            details,
            status: PatientStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn is_archived(&self) -> bool {
        self.status == PatientStatus::Archived
    }

    /// Age in whole years on the given date, if the date of birth is known.
    pub fn age_on(&self, date: NaiveDate) -> Option<u32> {
        let dob = self.details.date_of_birth?;
        let mut years = date.year() - dob.year();
        if (date.month(), date.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// Search criteria for patient lookups. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientCriteria {
    /// Exact patient id
    pub id: Option<String>,
    /// Case-insensitive name substring
    pub name_contains: Option<String>,
    /// Case-insensitive substring matched against id, name, phone and e-mail
    pub term: Option<String>,
    /// Earliest date of birth (inclusive)
    pub born_on_or_after: Option<NaiveDate>,
    /// Latest date of birth (inclusive)
    pub born_on_or_before: Option<NaiveDate>,
    /// Include archived patients
    pub include_archived: bool,
}

impl PatientCriteria {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name_contains: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }
}
