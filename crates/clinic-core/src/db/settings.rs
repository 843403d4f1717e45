//! Key/value settings storage.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};

impl Database {
    /// Read a setting value.
    pub fn get_setting(&self, key: &str) -> DbResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    /// Insert or replace a setting value.
    pub fn put_setting(&self, key: &str, value: &str) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("clinic").unwrap().is_none());

        db.put_setting("clinic", "{}").unwrap();
        db.put_setting("clinic", r#"{"name":"Main"}"#).unwrap();
        assert_eq!(db.get_setting("clinic").unwrap().as_deref(), Some(r#"{"name":"Main"}"#));
    }
}
