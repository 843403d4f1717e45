//! Document attachment models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The record a document is attached to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DocumentParent {
    Patient(String),
    Visit(String),
}

/// Metadata supplied when attaching or editing a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentInput {
    pub name: String,
    /// Category, e.g. "Lab Report", "Referral", "Imaging"
    pub category: String,
    pub description: Option<String>,
}

/// A file attachment belonging to a patient, optionally scoped to a visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Generated identifier (`d-N`)
    pub id: String,
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    /// Stored file name inside the patient's document directory
    pub file_name: Option<String>,
    /// Stored file size in bytes
    pub file_size: Option<u64>,
    /// Hex SHA-256 of the stored file
    pub checksum: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        id: String,
        patient_id: String,
        visit_id: Option<String>,
        input: DocumentInput,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            patient_id,
            visit_id,
            name: input.name,
            category: input.category,
            description: input.description,
            file_name: None,
            file_size: None,
            checksum: None,
            uploaded_at: now,
            updated_at: now,
        }
    }

    pub fn has_file(&self) -> bool {
        self.file_name.is_some()
    }
}
