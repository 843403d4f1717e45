//! User account database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::{Role, User};

const USER_COLUMNS: &str = "username, name, role, created_at";

/// Credential state kept alongside a user record.
#[derive(Debug, Clone)]
pub(crate) struct StoredCredentials {
    pub user: User,
    pub password_hash: String,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl Database {
    /// Insert a user with an already hashed password.
    pub fn insert_user(&self, user: &User, password_hash: &str) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (username, name, role, password_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![user.username, user.name, user.role, password_hash, user.created_at],
        )?;
        Ok(())
    }

    /// Get a user by username.
    pub fn get_user(&self, username: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS),
                [username],
                user_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub(crate) fn get_credentials(&self, username: &str) -> DbResult<Option<StoredCredentials>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {}, password_hash, failed_attempts, locked_until FROM users WHERE username = ?",
                    USER_COLUMNS
                ),
                [username],
                |row| {
                    Ok(StoredCredentials {
                        user: user_from_row(row)?,
                        password_hash: row.get(4)?,
                        failed_attempts: row.get(5)?,
                        locked_until: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Replace a user's password hash and clear any lockout.
    pub fn update_password_hash(&self, username: &str, password_hash: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE users SET
                password_hash = ?2,
                failed_attempts = 0,
                locked_until = NULL,
                updated_at = ?3
            WHERE username = ?1
            "#,
            params![username, password_hash, Utc::now()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Store the failed attempt counter and optional lock expiry.
    pub fn record_failed_login(
        &self,
        username: &str,
        failed_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        self.conn.execute(
            "UPDATE users SET failed_attempts = ?2, locked_until = ?3 WHERE username = ?1",
            params![username, failed_attempts, locked_until],
        )?;
        Ok(())
    }

    /// Clear failed attempts after a successful login.
    pub fn reset_failed_logins(&self, username: &str) -> DbResult<()> {
        self.conn.execute(
            "UPDATE users SET failed_attempts = 0, locked_until = NULL WHERE username = ?",
            [username],
        )?;
        Ok(())
    }

    /// Delete a user.
    pub fn delete_user(&self, username: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM users WHERE username = ?", [username])?;
        Ok(rows_affected > 0)
    }

    /// List users sorted by username.
    pub fn list_users(&self) -> DbResult<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY username",
            USER_COLUMNS
        ))?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Number of users with the given role.
    pub fn count_users_with_role(&self, role: Role) -> DbResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?",
            [role],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Total number of users.
    pub fn count_users(&self) -> DbResult<u32> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, role: Role) -> User {
        User {
            username: username.into(),
            name: username.to_uppercase(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_credentials() {
        let db = Database::open_in_memory().unwrap();
        let admin = user("admin", Role::Admin);
        db.insert_user(&admin, "$argon2id$hash").unwrap();

        assert_eq!(db.get_user("admin").unwrap().unwrap(), admin);
        let creds = db.get_credentials("admin").unwrap().unwrap();
        assert_eq!(creds.password_hash, "$argon2id$hash");
        assert_eq!(creds.failed_attempts, 0);
        assert!(creds.locked_until.is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("staff", Role::Staff), "h").unwrap();
        assert!(db.insert_user(&user("staff", Role::Admin), "h").is_err());
    }

    #[test]
    fn test_failed_logins_and_reset() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("staff", Role::Staff), "h").unwrap();

        let until = Utc::now();
        db.record_failed_login("staff", 5, Some(until)).unwrap();
        let creds = db.get_credentials("staff").unwrap().unwrap();
        assert_eq!(creds.failed_attempts, 5);
        assert_eq!(creds.locked_until, Some(until));

        db.reset_failed_logins("staff").unwrap();
        let creds = db.get_credentials("staff").unwrap().unwrap();
        assert_eq!(creds.failed_attempts, 0);
        assert!(creds.locked_until.is_none());
    }

    #[test]
    fn test_counts() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("admin", Role::Admin), "h").unwrap();
        db.insert_user(&user("staff", Role::Staff), "h").unwrap();

        assert_eq!(db.count_users().unwrap(), 2);
        assert_eq!(db.count_users_with_role(Role::Admin).unwrap(), 1);
        assert!(db.delete_user("staff").unwrap());
        assert_eq!(db.list_users().unwrap().len(), 1);
    }
}
