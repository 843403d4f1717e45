//! User accounts, credential checks and explicit sessions.
//!
//! There is no process-wide "current user": a successful login yields a
//! [`Session`] that callers hand to every mutating operation.

mod password;
mod session;
mod users;

pub use password::*;
pub use session::*;
pub use users::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::DbError;
use crate::validation::ValidationError;

/// Authentication and account management errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Cannot remove the last administrator")]
    LastAdmin,

    #[error("Users already exist; the first administrator can only be created once")]
    AlreadyInitialized,

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type AuthResult<T> = Result<T, AuthError>;
