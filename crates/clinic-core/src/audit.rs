//! Append-only audit trail.
//!
//! Each entry commits to its predecessor: `hash = sha256(prev_hash || entry)`
//! where `entry` is the canonical JSON form of the entry's fields. Editing or
//! removing any stored row breaks every later link, which
//! [`AuditLog::verify_chain`] reports.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::db::{Database, DbResult};
use crate::models::{AuditEntry, EntityKind};

/// `prev_hash` of the first entry.
pub const GENESIS_HASH: &str = "";

/// Fields covered by an entry's hash, in a fixed order.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    entry_id: &'a str,
    recorded_at: String,
    actor: &'a str,
    operation: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    details: Option<&'a str>,
}

/// Outcome of walking the whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Number of entries checked
    pub entries: u64,
    /// Sequence number of the first entry whose link does not verify
    pub first_broken_seq: Option<i64>,
}

impl ChainVerification {
    pub fn is_valid(&self) -> bool {
        self.first_broken_seq.is_none()
    }
}

/// Hash data with SHA-256, hex encoded.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of `entry` chained onto its `prev_hash`. The stored `hash` and
/// `seq` are not part of the input.
fn compute_hash(entry: &AuditEntry) -> DbResult<String> {
    let canonical = serde_json::to_string(&CanonicalEntry {
        entry_id: &entry.entry_id,
        recorded_at: entry
            .recorded_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true),
        actor: &entry.actor,
        operation: &entry.operation,
        entity_type: &entry.entity_type,
        entity_id: &entry.entity_id,
        details: entry.details.as_deref(),
    })?;

    let mut payload = Vec::with_capacity(entry.prev_hash.len() + canonical.len());
    payload.extend_from_slice(entry.prev_hash.as_bytes());
    payload.extend_from_slice(canonical.as_bytes());
    Ok(hash_data(&payload))
}

/// Audit log over the `audit_log` table.
pub struct AuditLog<'a> {
    db: &'a Database,
}

impl<'a> AuditLog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append an entry linked to the current head of the chain.
    ///
    /// Callers run this inside the same transaction as the mutation it
    /// describes.
    pub fn record(
        &self,
        actor: &str,
        operation: &str,
        entity: EntityKind,
        entity_id: &str,
        details: Option<Value>,
    ) -> DbResult<AuditEntry> {
        let prev_hash = self
            .db
            .last_audit_entry()?
            .map(|e| e.hash)
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut entry = AuditEntry {
            seq: 0,
            entry_id: uuid::Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            actor: actor.to_string(),
            operation: operation.to_string(),
            entity_type: entity.as_str().to_string(),
            entity_id: entity_id.to_string(),
            details: details.map(|d| d.to_string()),
            prev_hash,
            hash: String::new(),
        };
        entry.hash = compute_hash(&entry)?;
        entry.seq = self.db.append_audit_entry(&entry)?;
        Ok(entry)
    }

    /// Walk the chain from the first entry, recomputing every link.
    pub fn verify_chain(&self) -> DbResult<ChainVerification> {
        let entries = self.db.list_audit_entries()?;
        let mut expected_prev = GENESIS_HASH.to_string();

        for entry in &entries {
            if entry.prev_hash != expected_prev || compute_hash(entry)? != entry.hash {
                tracing::warn!(seq = entry.seq, "Audit chain broken");
                return Ok(ChainVerification {
                    entries: entries.len() as u64,
                    first_broken_seq: Some(entry.seq),
                });
            }
            expected_prev = entry.hash.clone();
        }

        Ok(ChainVerification {
            entries: entries.len() as u64,
            first_broken_seq: None,
        })
    }

    /// Entries that touched one entity, oldest first.
    pub fn entries_for(&self, entity_type: &str, entity_id: &str) -> DbResult<Vec<AuditEntry>> {
        self.db.audit_entries_for(entity_type, entity_id)
    }

    /// The newest `limit` entries, newest first.
    pub fn recent(&self, limit: u32) -> DbResult<Vec<AuditEntry>> {
        self.db.recent_audit_entries(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chain_links_entries() {
        let db = Database::open_in_memory().unwrap();
        let log = AuditLog::new(&db);

        let first = log
            .record("admin", "patient.create", EntityKind::Patient, "p-1", None)
            .unwrap();
        let second = log
            .record(
                "admin",
                "patient.update",
                EntityKind::Patient,
                "p-1",
                Some(json!({"field": "phone"})),
            )
            .unwrap();

        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(second.seq, first.seq + 1);
        assert_eq!(first.hash.len(), 64);

        let verification = log.verify_chain().unwrap();
        assert!(verification.is_valid());
        assert_eq!(verification.entries, 2);
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let db = Database::open_in_memory().unwrap();
        let verification = AuditLog::new(&db).verify_chain().unwrap();
        assert!(verification.is_valid());
        assert_eq!(verification.entries, 0);
    }

    #[test]
    fn test_tampering_detected() {
        let db = Database::open_in_memory().unwrap();
        let log = AuditLog::new(&db);
        for id in ["p-1", "p-2", "p-3"] {
            log.record("admin", "patient.create", EntityKind::Patient, id, None)
                .unwrap();
        }

        // Bypass the append-only trigger to simulate an out-of-band edit.
        db.conn()
            .execute_batch(
                "DROP TRIGGER audit_log_no_update;
                 UPDATE audit_log SET actor = 'mallory' WHERE seq = 2;",
            )
            .unwrap();

        let verification = log.verify_chain().unwrap();
        assert_eq!(verification.first_broken_seq, Some(2));
    }

    #[test]
    fn test_queries() {
        let db = Database::open_in_memory().unwrap();
        let log = AuditLog::new(&db);
        log.record("admin", "patient.create", EntityKind::Patient, "p-1", None)
            .unwrap();
        log.record("staff", "visit.start", EntityKind::Visit, "v-1", None)
            .unwrap();
        log.record("staff", "patient.update", EntityKind::Patient, "p-1", None)
            .unwrap();

        let for_patient = log.entries_for("patient", "p-1").unwrap();
        assert_eq!(for_patient.len(), 2);
        assert_eq!(for_patient[1].operation, "patient.update");

        let recent = log.recent(1).unwrap();
        assert_eq!(recent[0].operation, "patient.update");
    }
}
