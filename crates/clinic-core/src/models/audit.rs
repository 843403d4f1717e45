//! Audit log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the hash-chained audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Position in the chain, starting at 1
    pub seq: i64,
    /// Unique entry id (UUID)
    pub entry_id: String,
    pub recorded_at: DateTime<Utc>,
    /// Username that performed the operation
    pub actor: String,
    /// Operation name, e.g. "patient.create"
    pub operation: String,
    pub entity_type: String,
    pub entity_id: String,
    /// JSON payload describing the change
    pub details: Option<String>,
    /// Hash of the previous entry (empty for the first)
    pub prev_hash: String,
    /// SHA-256 over `prev_hash` and the entry content
    pub hash: String,
}
