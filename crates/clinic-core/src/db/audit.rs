//! Audit log database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::AuditEntry;

const AUDIT_COLUMNS: &str = "seq, entry_id, recorded_at, actor, operation, entity_type, \
                             entity_id, details, prev_hash, hash";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        seq: row.get(0)?,
        entry_id: row.get(1)?,
        recorded_at: row.get(2)?,
        actor: row.get(3)?,
        operation: row.get(4)?,
        entity_type: row.get(5)?,
        entity_id: row.get(6)?,
        details: row.get(7)?,
        prev_hash: row.get(8)?,
        hash: row.get(9)?,
    })
}

impl Database {
    /// Append an entry. `seq` is assigned by the database and returned.
    pub fn append_audit_entry(&self, entry: &AuditEntry) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO audit_log (
                entry_id, recorded_at, actor, operation, entity_type,
                entity_id, details, prev_hash, hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                entry.entry_id,
                entry.recorded_at,
                entry.actor,
                entry.operation,
                entry.entity_type,
                entry.entity_id,
                entry.details,
                entry.prev_hash,
                entry.hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent entry, if any.
    pub fn last_audit_entry(&self) -> DbResult<Option<AuditEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM audit_log ORDER BY seq DESC LIMIT 1", AUDIT_COLUMNS),
                [],
                entry_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Entire log in append order.
    pub fn list_audit_entries(&self) -> DbResult<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM audit_log ORDER BY seq", AUDIT_COLUMNS))?;
        let rows = stmt.query_map([], entry_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Entries touching one entity, in append order.
    pub fn audit_entries_for(&self, entity_type: &str, entity_id: &str) -> DbResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY seq",
            AUDIT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![entity_type, entity_id], entry_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// The newest `limit` entries, newest first.
    pub fn recent_audit_entries(&self, limit: u32) -> DbResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM audit_log ORDER BY seq DESC LIMIT ?",
            AUDIT_COLUMNS
        ))?;
        let rows = stmt.query_map([limit], entry_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, entity_id: &str, prev: &str, hash: &str) -> AuditEntry {
        AuditEntry {
            seq: 0,
            entry_id: id.into(),
            recorded_at: Utc::now(),
            actor: "admin".into(),
            operation: "patient.create".into(),
            entity_type: "patient".into(),
            entity_id: entity_id.into(),
            details: None,
            prev_hash: prev.into(),
            hash: hash.into(),
        }
    }

    #[test]
    fn test_append_assigns_sequence() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.append_audit_entry(&entry("e1", "p-1", "", "h1")).unwrap(), 1);
        assert_eq!(db.append_audit_entry(&entry("e2", "p-2", "h1", "h2")).unwrap(), 2);

        let last = db.last_audit_entry().unwrap().unwrap();
        assert_eq!(last.entry_id, "e2");
        assert_eq!(last.seq, 2);
    }

    #[test]
    fn test_queries() {
        let db = Database::open_in_memory().unwrap();
        db.append_audit_entry(&entry("e1", "p-1", "", "h1")).unwrap();
        db.append_audit_entry(&entry("e2", "p-2", "h1", "h2")).unwrap();
        db.append_audit_entry(&entry("e3", "p-1", "h2", "h3")).unwrap();

        let for_p1 = db.audit_entries_for("patient", "p-1").unwrap();
        assert_eq!(for_p1.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 3]);

        let recent = db.recent_audit_entries(2).unwrap();
        assert_eq!(recent.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(db.list_audit_entries().unwrap().len(), 3);
    }
}
