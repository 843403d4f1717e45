//! Managers: one per entity type, each owning validation, invariant checks
//! and auditing for the records it writes.
//!
//! Every mutating call takes the caller's [`Session`](crate::auth::Session)
//! and runs in a single transaction together with its audit entry, so a
//! failed call leaves no visible change.

mod appointments;
mod documents;
mod patients;
mod test_results;

pub use appointments::*;
pub use documents::*;
pub use patients::*;
pub use test_results::*;

use serde_json::Value;
use thiserror::Error;

use crate::audit::AuditLog;
use crate::auth::{AuthError, Session};
use crate::db::{Database, DbError};
use crate::models::EntityKind;
use crate::validation::ValidationError;

/// Manager errors.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("Duplicate {entity}: {message}")]
    Duplicate { entity: EntityKind, message: String },

    #[error("Cannot remove {entity} {id}: {reason}")]
    ReferentialIntegrity {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    #[error("Invalid state transition for {entity} {id}: {from} -> {to}")]
    InvalidStateTransition {
        entity: EntityKind,
        id: String,
        from: String,
        to: String,
    },

    #[error("{entity} {id} cannot be modified")]
    ImmutableRecord { entity: EntityKind, id: String },

    #[error("Schedule conflict: {doctor} already has appointment {existing} at that time")]
    ScheduleConflict { doctor: String, existing: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

impl From<std::io::Error> for ManagerError {
    fn from(e: std::io::Error) -> Self {
        ManagerError::Storage(DbError::Io(e))
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

impl ManagerError {
    pub(crate) fn not_found(entity: EntityKind, id: &str) -> Self {
        ManagerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Append the audit entry for a mutation made in the current transaction.
pub(crate) fn audit(
    db: &Database,
    session: &Session,
    operation: &str,
    entity: EntityKind,
    entity_id: &str,
    details: Option<Value>,
) -> ManagerResult<()> {
    AuditLog::new(db).record(session.actor(), operation, entity, entity_id, details)?;
    Ok(())
}

/// Trim an optional text field; blank becomes `None`.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
