//! Account entity and registration payloads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::UserId;

/// A registered account.
///
/// Accounts are never hard-deleted; administrators toggle `is_active`
/// instead. `last_login` is refreshed on every successful authentication.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-assigned identifier.
    pub id: UserId,
    /// Unique account email.
    pub email: String,
    /// Argon2id password hash in PHC string format. Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact phone number.
    pub phone: String,
    /// Whether the account may moderate listings and manage users.
    pub is_admin: bool,
    /// Deactivated accounts cannot log in and their listings are hidden
    /// from public views.
    pub is_active: bool,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent successful login.
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Full record sans identifier, for copying into another store.
    pub fn to_record(&self) -> NewUser {
        NewUser {
            email: self.email.clone(),
            password_hash: self.password_hash.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            is_admin: self.is_admin,
            is_active: self.is_active,
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

/// Account record ready for insertion; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    /// Unique account email.
    pub email: String,
    /// Argon2id password hash in PHC string format.
    pub password_hash: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact phone number.
    pub phone: String,
    /// Admin flag; `false` for self-registration.
    pub is_admin: bool,
    /// Active flag; `true` for self-registration.
    pub is_active: bool,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Carried over by migration; `None` for fresh registrations.
    pub last_login: Option<DateTime<Utc>>,
}

impl NewUser {
    /// Build the record for a self-registered account: active, non-admin,
    /// timestamped now.
    pub fn registered(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone: phone.into(),
            is_admin: false,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;

    #[test]
    fn registered_defaults_are_active_non_admin() {
        let record = NewUser::registered("a@b.example", "$argon2id$x", "Ada", "Lovelace", "12345");
        assert!(record.is_active);
        assert!(!record.is_admin);
        assert!(record.last_login.is_none());
    }

    #[test]
    fn password_hash_never_serializes() {
        let user = User {
            id: UserId::new("1"),
            email: "a@b.example".into(),
            password_hash: "$argon2id$secret".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: "12345".into(),
            is_admin: false,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        let json = serde_json::to_string(&user).expect("serializable");
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("passwordHash"));
    }
}
