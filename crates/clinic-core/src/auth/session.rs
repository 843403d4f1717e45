//! Explicit login sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthResult};
use crate::models::{Role, User};

/// An authenticated user for the lifetime of a login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub user: User,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Start a session for a verified user.
    pub fn start(user: User) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            started_at: Utc::now(),
        }
    }

    /// Name recorded as the actor in audit entries.
    pub fn actor(&self) -> &str {
        &self.user.username
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }

    /// Fail unless the session belongs to an administrator.
    pub fn require_admin(&self, action: &str) -> AuthResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(format!(
                "{} requires an administrator",
                action
            )))
        }
    }
}
