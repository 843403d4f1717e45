//! User store: account administration and credential verification.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::{hash_password, verify_password, AuthError, AuthResult, Session};
use crate::audit::AuditLog;
use crate::db::Database;
use crate::models::{EntityKind, Role, User};
use crate::validation;

/// Failed-login policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that lock the account
    pub max_attempts: u32,
    /// How long a locked account stays locked
    pub lockout_minutes: u32,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_minutes: 15,
        }
    }
}

/// Account administration over the `users` table.
pub struct UserStore<'a> {
    db: &'a Database,
    policy: LockoutPolicy,
}

impl<'a> UserStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            policy: LockoutPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LockoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether any account exists yet (first-run setup check).
    pub fn has_users(&self) -> AuthResult<bool> {
        Ok(self.db.count_users()? > 0)
    }

    /// Create the first administrator. Only allowed while no users exist.
    pub fn bootstrap_admin(&self, username: &str, password: &str, name: &str) -> AuthResult<User> {
        validation::username(username)?;
        validation::password(password)?;
        let password_hash = hash_password(password)?;

        self.db.atomically(|db| {
            if db.count_users()? > 0 {
                return Err(AuthError::AlreadyInitialized);
            }
            let user = User {
                username: username.to_string(),
                name: name.trim().to_string(),
                role: Role::Admin,
                created_at: Utc::now(),
            };
            db.insert_user(&user, &password_hash)?;
            AuditLog::new(db).record(
                username,
                "user.bootstrap",
                EntityKind::User,
                username,
                Some(json!({ "role": Role::Admin.as_str() })),
            )?;
            info!(username, "Initial administrator created");
            Ok(user)
        })
    }

    /// Add an account. Admin only.
    pub fn add_user(
        &self,
        session: &Session,
        username: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> AuthResult<User> {
        session.require_admin("adding users")?;
        validation::username(username)?;
        validation::password(password)?;
        let password_hash = hash_password(password)?;

        self.db.atomically(|db| {
            if db.get_user(username)?.is_some() {
                return Err(AuthError::UserExists(username.to_string()));
            }
            let user = User {
                username: username.to_string(),
                name: name.trim().to_string(),
                role,
                created_at: Utc::now(),
            };
            db.insert_user(&user, &password_hash)?;
            AuditLog::new(db).record(
                session.actor(),
                "user.add",
                EntityKind::User,
                username,
                Some(json!({ "role": role.as_str() })),
            )?;
            info!(username, actor = session.actor(), "User added");
            Ok(user)
        })
    }

    /// Change a password. Users may change their own; admins anyone's.
    pub fn change_password(
        &self,
        session: &Session,
        username: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        if session.actor() != username {
            session.require_admin("changing another user's password")?;
        }
        validation::password(new_password)?;
        let password_hash = hash_password(new_password)?;

        self.db.atomically(|db| {
            if !db.update_password_hash(username, &password_hash)? {
                return Err(AuthError::UserNotFound(username.to_string()));
            }
            AuditLog::new(db).record(
                session.actor(),
                "user.change_password",
                EntityKind::User,
                username,
                None,
            )?;
            info!(username, actor = session.actor(), "Password changed");
            Ok(())
        })
    }

    /// Delete an account. Admin only; the last administrator stays.
    pub fn delete_user(&self, session: &Session, username: &str) -> AuthResult<()> {
        session.require_admin("deleting users")?;

        self.db.atomically(|db| {
            let user = db
                .get_user(username)?
                .ok_or_else(|| AuthError::UserNotFound(username.to_string()))?;
            if user.is_admin() && db.count_users_with_role(Role::Admin)? <= 1 {
                warn!(username, "Refusing to delete the last administrator");
                return Err(AuthError::LastAdmin);
            }
            db.delete_user(username)?;
            AuditLog::new(db).record(
                session.actor(),
                "user.delete",
                EntityKind::User,
                username,
                None,
            )?;
            info!(username, actor = session.actor(), "User deleted");
            Ok(())
        })
    }

    /// All accounts, without credentials.
    pub fn list_users(&self) -> AuthResult<Vec<User>> {
        Ok(self.db.list_users()?)
    }

    pub fn find_user(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self.db.get_user(username)?)
    }

    /// Check a username/password pair.
    ///
    /// Failed attempts are counted per account; reaching the policy limit
    /// locks the account for the configured period. A successful check
    /// resets the counter.
    pub fn verify_credentials(&self, username: &str, secret: &str) -> AuthResult<User> {
        self.verify_credentials_at(username, secret, Utc::now())
    }

    pub(crate) fn verify_credentials_at(
        &self,
        username: &str,
        secret: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<User> {
        let Some(creds) = self.db.get_credentials(username)? else {
            verify_password(secret, None);
            warn!(username, "Login failed: unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        if let Some(until) = creds.locked_until {
            if until > now {
                warn!(username, %until, "Login refused: account locked");
                return Err(AuthError::AccountLocked { until });
            }
        }

        if verify_password(secret, Some(&creds.password_hash)) {
            if creds.failed_attempts > 0 || creds.locked_until.is_some() {
                self.db.reset_failed_logins(username)?;
            }
            info!(username, "Login succeeded");
            return Ok(creds.user);
        }

        // An expired lock starts a fresh count.
        let previous = if creds.locked_until.is_some() {
            0
        } else {
            creds.failed_attempts
        };
        let attempts = previous + 1;

        if attempts >= self.policy.max_attempts {
            let until = now + Duration::minutes(i64::from(self.policy.lockout_minutes));
            self.db.record_failed_login(username, attempts, Some(until))?;
            warn!(username, attempts, %until, "Account locked after repeated failures");
            return Err(AuthError::AccountLocked { until });
        }

        self.db.record_failed_login(username, attempts, None)?;
        warn!(username, attempts, "Login failed: wrong password");
        Err(AuthError::InvalidCredentials)
    }

    /// Verify credentials and open a session.
    pub fn login(&self, username: &str, secret: &str) -> AuthResult<Session> {
        let user = self.verify_credentials(username, secret)?;
        Ok(Session::start(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN_PASSWORD: &str = "admin-password";

    fn setup() -> (Database, Session) {
        let db = Database::open_in_memory().unwrap();
        let admin = UserStore::new(&db)
            .bootstrap_admin("admin", ADMIN_PASSWORD, "Administrator")
            .unwrap();
        (db, Session::start(admin))
    }

    #[test]
    fn test_bootstrap_only_once() {
        let (db, _) = setup();
        let store = UserStore::new(&db);
        assert!(store.has_users().unwrap());
        let err = store
            .bootstrap_admin("second", "another-password", "Second")
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyInitialized));
    }

    #[test]
    fn test_verify_credentials() {
        let (db, _) = setup();
        let store = UserStore::new(&db);

        let user = store.verify_credentials("admin", ADMIN_PASSWORD).unwrap();
        assert_eq!(user.role, Role::Admin);

        assert!(matches!(
            store.verify_credentials("admin", "wrong-password"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            store.verify_credentials("nobody", ADMIN_PASSWORD),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_lockout_after_max_attempts() {
        let (db, _) = setup();
        let store = UserStore::new(&db).with_policy(LockoutPolicy {
            max_attempts: 3,
            lockout_minutes: 15,
        });
        let now = Utc::now();

        for _ in 0..2 {
            assert!(matches!(
                store.verify_credentials_at("admin", "bad", now),
                Err(AuthError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            store.verify_credentials_at("admin", "bad", now),
            Err(AuthError::AccountLocked { .. })
        ));

        // Correct password is refused while locked.
        assert!(matches!(
            store.verify_credentials_at("admin", ADMIN_PASSWORD, now + Duration::minutes(5)),
            Err(AuthError::AccountLocked { .. })
        ));

        // After the lock expires the correct password works and resets the counter.
        let later = now + Duration::minutes(16);
        assert!(store.verify_credentials_at("admin", ADMIN_PASSWORD, later).is_ok());
        let creds = db.get_credentials("admin").unwrap().unwrap();
        assert_eq!(creds.failed_attempts, 0);
        assert!(creds.locked_until.is_none());
    }

    #[test]
    fn test_admin_operations_require_admin() {
        let (db, admin) = setup();
        let store = UserStore::new(&db);

        let staff = store
            .add_user(&admin, "nurse", "nurse-password", "Nurse", Role::Staff)
            .unwrap();
        let staff_session = Session::start(staff);

        let err = store
            .add_user(&staff_session, "other", "other-password", "Other", Role::Staff)
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(_)));

        // Staff may change their own password, not someone else's.
        store
            .change_password(&staff_session, "nurse", "new-nurse-password")
            .unwrap();
        assert!(store.verify_credentials("nurse", "new-nurse-password").is_ok());
        assert!(matches!(
            store.change_password(&staff_session, "admin", "hijacked-password"),
            Err(AuthError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_duplicate_and_invalid_users() {
        let (db, admin) = setup();
        let store = UserStore::new(&db);

        assert!(matches!(
            store.add_user(&admin, "admin", "whatever-pass", "Dup", Role::Staff),
            Err(AuthError::UserExists(_))
        ));
        assert!(matches!(
            store.add_user(&admin, "nurse", "short", "Nurse", Role::Staff),
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn test_last_admin_protected() {
        let (db, admin) = setup();
        let store = UserStore::new(&db);

        assert!(matches!(
            store.delete_user(&admin, "admin"),
            Err(AuthError::LastAdmin)
        ));

        store
            .add_user(&admin, "backup", "backup-password", "Backup", Role::Admin)
            .unwrap();
        store.delete_user(&admin, "backup").unwrap();
        assert!(store.find_user("backup").unwrap().is_none());
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_user_changes_are_audited() {
        let (db, admin) = setup();
        UserStore::new(&db)
            .add_user(&admin, "nurse", "nurse-password", "Nurse", Role::Staff)
            .unwrap();

        let entries = AuditLog::new(&db).entries_for("user", "nurse").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor, "admin");
        assert_eq!(entries[0].operation, "user.add");
    }
}
