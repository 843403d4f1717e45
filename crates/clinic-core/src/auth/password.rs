//! Argon2 password hashing.

use std::sync::LazyLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

use super::{AuthError, AuthResult};

/// Hash checked when the account does not exist, so a failed login for an
/// unknown user costs the same as one for a known user.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("clinic-dummy-password").ok());

/// Hash a password with Argon2id and a random salt, returned as a PHC string.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Check a password against a stored PHC string.
///
/// `None` verifies against a dummy hash and always fails.
pub fn verify_password(password: &str, stored: Option<&str>) -> bool {
    let (phc, known) = match stored {
        Some(phc) => (Some(phc), true),
        None => (DUMMY_HASH.as_deref(), false),
    };

    let Some(phc) = phc else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };

    let matches = Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok();
    known && matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", Some(&hash)));
        assert!(!verify_password("wrong horse", Some(&hash)));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same password").unwrap();
        let b = hash_password("same password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_user_never_verifies() {
        assert!(!verify_password("clinic-dummy-password", None));
        assert!(!verify_password("anything", Some("not a phc string")));
    }
}
