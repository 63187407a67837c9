//! Authentication primitives: validated login payloads and password hashing.
//!
//! Keep inbound payload parsing outside the domain by exposing constructors
//! that validate string inputs before a handler talks to a service, and keep
//! credential storage safe by only ever persisting salted Argon2id hashes.

use std::fmt;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use zeroize::Zeroizing;

/// Domain error returned when login payload values are invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialValidationError {
    /// Email was missing or blank once trimmed.
    EmptyEmail,
    /// Password was blank.
    EmptyPassword,
}

impl fmt::Display for CredentialValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyEmail => write!(f, "email must not be empty"),
            Self::EmptyPassword => write!(f, "password must not be empty"),
        }
    }
}

impl std::error::Error for CredentialValidationError {}

/// Validated login credentials used by the account service.
///
/// ## Invariants
/// - `email` is trimmed and must not be empty after trimming.
/// - `password` is required to be non-empty but retains caller-provided
///   whitespace to avoid surprising credential comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    email: String,
    password: Zeroizing<String>,
}

impl LoginCredentials {
    /// Construct credentials from raw email/password inputs.
    pub fn try_from_parts(email: &str, password: &str) -> Result<Self, CredentialValidationError> {
        let normalized = email.trim();
        if normalized.is_empty() {
            return Err(CredentialValidationError::EmptyEmail);
        }
        if password.is_empty() {
            return Err(CredentialValidationError::EmptyPassword);
        }
        Ok(Self {
            email: normalized.to_owned(),
            password: Zeroizing::new(password.to_owned()),
        })
    }

    /// Email string suitable for account lookups.
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Password string provided by the caller.
    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

/// Errors raised while hashing or verifying a password.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    /// The stored hash could not be parsed or a new hash could not be built.
    #[error("password hash error: {0}")]
    Hash(String),
}

/// Hash a plaintext password with Argon2id and a fresh random salt.
///
/// The output is a PHC-format string (`$argon2id$...`) safe to persist.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::Hash(err.to_string()))
}

/// Check a plaintext password against a stored PHC-format hash.
///
/// Returns `Ok(false)` on mismatch; `Err` only when the stored value is not
/// a parseable hash (which indicates corrupted credential data, not a wrong
/// password).
pub fn verify_password(plain: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|err| PasswordError::Hash(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "pw", CredentialValidationError::EmptyEmail)]
    #[case("   ", "pw", CredentialValidationError::EmptyEmail)]
    #[case("a@b.example", "", CredentialValidationError::EmptyPassword)]
    fn invalid_credentials(
        #[case] email: &str,
        #[case] password: &str,
        #[case] expected: CredentialValidationError,
    ) {
        let err = LoginCredentials::try_from_parts(email, password)
            .expect_err("invalid inputs must fail");
        assert_eq!(err, expected);
    }

    #[rstest]
    #[case("  ada@example.com  ", "secret")]
    #[case("bob@example.com", "correct horse battery staple")]
    fn valid_credentials_trim_email(#[case] email: &str, #[case] password: &str) {
        let creds = LoginCredentials::try_from_parts(email, password)
            .expect("valid inputs should succeed");
        assert_eq!(creds.email(), email.trim());
        assert_eq!(creds.password(), password);
    }

    #[rstest]
    fn hashes_verify_and_never_store_plaintext() {
        let hash = hash_password("hunter2").expect("hashing succeeds");
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("hunter2"));
        assert!(verify_password("hunter2", &hash).expect("parseable hash"));
        assert!(!verify_password("hunter3", &hash).expect("parseable hash"));
    }

    #[rstest]
    fn same_password_hashes_differently_per_salt() {
        let first = hash_password("hunter2").expect("hashing succeeds");
        let second = hash_password("hunter2").expect("hashing succeeds");
        assert_ne!(first, second);
    }

    #[rstest]
    fn garbage_stored_hash_is_an_error_not_a_mismatch() {
        let err = verify_password("anything", "plaintext-from-a-legacy-row")
            .expect_err("legacy plaintext must not verify");
        assert!(matches!(err, PasswordError::Hash(_)));
    }
}
