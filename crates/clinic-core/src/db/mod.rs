//! Database layer for clinic records.

mod appointments;
mod audit;
mod documents;
mod patients;
mod schema;
mod settings;
mod test_results;
mod users;
mod visits;

pub use schema::*;
#[allow(unused_imports)]
pub use appointments::*;
#[allow(unused_imports)]
pub use audit::*;
#[allow(unused_imports)]
pub use documents::*;
#[allow(unused_imports)]
pub use patients::*;
#[allow(unused_imports)]
pub use settings::*;
#[allow(unused_imports)]
pub use test_results::*;
#[allow(unused_imports)]
pub use users::*;
#[allow(unused_imports)]
pub use visits::*;

use rusqlite::backup::Progress;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, DatabaseName};
use std::path::Path;
use thiserror::Error;

use crate::models::{AppointmentStatus, EntityKind, PatientStatus, Role, VisitStatus};

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema and register SQL functions.
    fn initialize(&self) -> DbResult<()> {
        register_functions(&self.conn)?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a single transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`; any error rolls
    /// back every statement issued through this database in the meantime.
    /// Calls must not nest.
    pub fn atomically<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self.conn.unchecked_transaction().map_err(DbError::from)?;
        let value = f(self)?;
        tx.commit().map_err(DbError::from)?;
        Ok(value)
    }

    /// Allocate the next identifier for an entity kind (`p-1`, `p-2`, ...).
    ///
    /// Counters only move forward, so identifiers of deleted records are
    /// never handed out again.
    pub fn next_id(&self, kind: EntityKind) -> DbResult<String> {
        self.conn.execute(
            r#"
            INSERT INTO id_sequences (entity, next_value) VALUES (?1, 1)
            ON CONFLICT(entity) DO UPDATE SET next_value = next_value + 1
            "#,
            [kind.as_str()],
        )?;
        let value: i64 = self.conn.query_row(
            "SELECT next_value FROM id_sequences WHERE entity = ?",
            [kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(format!("{}-{}", kind.id_prefix(), value))
    }

    /// Write a consistent copy of the database to `path`.
    pub fn backup_to<P: AsRef<Path>>(&self, path: P) -> DbResult<()> {
        let target = path.as_ref().to_string_lossy().into_owned();
        self.conn.execute("VACUUM INTO ?", [target])?;
        Ok(())
    }

    /// Replace every page of this database with the contents of the
    /// database file at `path`.
    pub fn restore_from<P: AsRef<Path>>(&mut self, path: P) -> DbResult<()> {
        self.conn
            .restore(DatabaseName::Main, path, None::<fn(Progress)>)?;
        Ok(())
    }
}

/// `fold_case(text)`: Unicode lowercase. SQLite's own `lower()` only folds ASCII.
fn register_functions(conn: &Connection) -> DbResult<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Store a status enum as its lowercase text form.
macro_rules! text_enum_sql {
    ($ty:ty, $label:literal) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::parse(s)
                    .ok_or_else(|| FromSqlError::Other(format!("Unknown {}: {}", $label, s).into()))
            }
        }
    };
}

text_enum_sql!(PatientStatus, "patient status");
text_enum_sql!(VisitStatus, "visit status");
text_enum_sql!(AppointmentStatus, "appointment status");
text_enum_sql!(Role, "role");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "patients",
            "visits",
            "medical_history",
            "appointments",
            "documents",
            "test_results",
            "users",
            "audit_log",
            "settings",
            "id_sequences",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.db");
        {
            let db = Database::open(&path).unwrap();
            assert_eq!(db.next_id(EntityKind::Patient).unwrap(), "p-1");
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.next_id(EntityKind::Patient).unwrap(), "p-2");
    }

    #[test]
    fn test_next_id_per_kind() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.next_id(EntityKind::Patient).unwrap(), "p-1");
        assert_eq!(db.next_id(EntityKind::Patient).unwrap(), "p-2");
        assert_eq!(db.next_id(EntityKind::Visit).unwrap(), "v-1");
        assert_eq!(db.next_id(EntityKind::TestResult).unwrap(), "r-1");
    }

    #[test]
    fn test_atomically_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();

        let result: DbResult<()> = db.atomically(|db| {
            db.next_id(EntityKind::Patient)?;
            Err(DbError::Constraint("abort".into()))
        });
        assert!(result.is_err());

        // The counter increment was rolled back.
        assert_eq!(db.next_id(EntityKind::Patient).unwrap(), "p-1");
    }

    #[test]
    fn test_backup_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.next_id(EntityKind::Patient).unwrap();

        let target = dir.path().join("copy.db");
        db.backup_to(&target).unwrap();

        let copy = Database::open(&target).unwrap();
        assert_eq!(copy.next_id(EntityKind::Patient).unwrap(), "p-2");
    }
}
