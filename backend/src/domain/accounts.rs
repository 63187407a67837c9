//! Account use-cases: registration, authentication, admin management.
//!
//! Handlers talk to this service; the service talks to the store port. No
//! HTTP types on one side, no SQL/BSON on the other.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use super::auth::{self, LoginCredentials};
use super::ports::ListingStore;
use super::{Error, NewUser, User, UserId};

/// Registration payload accepted by [`AccountService::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Desired account email.
    pub email: String,
    /// Plaintext password; hashed before it reaches any store.
    pub password: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact phone number.
    pub phone: String,
}

/// Business operations over accounts.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn ListingStore>,
}

impl AccountService {
    /// Create a service backed by the given store.
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Register a new account: active, non-admin, password hashed with
    /// Argon2id. Fails with `DuplicateKey` when the email is taken.
    pub async fn register(&self, registration: Registration) -> Result<User, Error> {
        let email = registration.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::invalid_request("a valid email is required"));
        }
        if registration.password.is_empty() {
            return Err(Error::invalid_request("password must not be empty"));
        }

        let password_hash = auth::hash_password(&registration.password)
            .map_err(|err| Error::internal(format!("failed to hash password: {err}")))?;
        let record = NewUser::registered(
            email,
            password_hash,
            registration.first_name,
            registration.last_name,
            registration.phone,
        );
        self.store.insert_user(&record).await.map_err(Error::from)
    }

    /// Authenticate credentials against the stored hash.
    ///
    /// Deactivated accounts are refused even with a correct password.
    /// Successful logins stamp `last_login`.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, Error> {
        let Some(mut user) = self.store.user_by_email(credentials.email()).await? else {
            return Err(Error::unauthorized("invalid credentials"));
        };

        let matches = match auth::verify_password(credentials.password(), &user.password_hash) {
            Ok(matches) => matches,
            Err(err) => {
                // An unparseable stored hash is credential-data corruption;
                // surface it in logs but never to the caller.
                warn!(email = %user.email, error = %err, "stored password hash is not verifiable");
                false
            }
        };
        if !matches {
            return Err(Error::unauthorized("invalid credentials"));
        }
        if !user.is_active {
            return Err(Error::forbidden("account is deactivated"));
        }

        let now = Utc::now();
        self.store.touch_last_login(&user.id, now).await?;
        user.last_login = Some(now);
        Ok(user)
    }

    /// Flip an account's active flag. Admin-only at the HTTP boundary.
    pub async fn toggle_active(&self, id: &UserId) -> Result<User, Error> {
        let Some(user) = self.store.user_by_id(id).await? else {
            return Err(Error::not_found("no such user"));
        };
        self.store
            .set_user_active(id, !user.is_active)
            .await?
            .ok_or_else(|| Error::not_found("no such user"))
    }

    /// Every account, for the admin panel.
    pub async fn list_users(&self) -> Result<Vec<User>, Error> {
        self.store.list_users().await.map_err(Error::from)
    }

    /// Resolve an account by email; used to map session subjects to users.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.store.user_by_email(email).await.map_err(Error::from)
    }

    /// Resolve an account by identifier.
    pub async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        self.store.user_by_id(id).await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    //! Behaviour coverage against the in-memory store.
    use super::*;
    use crate::domain::ErrorCode;
    use crate::outbound::memory::MemoryStore;
    use rstest::rstest;

    fn service() -> AccountService {
        AccountService::new(Arc::new(MemoryStore::new()))
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.into(),
            password: "hunter2".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: "1234567890".into(),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn register_then_lookup_returns_active_user() {
        let service = service();
        let user = service
            .register(registration("ada@example.com"))
            .await
            .expect("registration succeeds");
        assert!(user.is_active);
        assert!(!user.is_admin);

        let found = service
            .user_by_email("ada@example.com")
            .await
            .expect("lookup succeeds")
            .expect("user exists");
        assert_eq!(found.id, user.id);
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let service = service();
        service
            .register(registration("ada@example.com"))
            .await
            .expect("first registration succeeds");
        let err = service
            .register(registration("ada@example.com"))
            .await
            .expect_err("second registration fails");
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
    }

    #[rstest]
    #[case("", "pw")]
    #[case("not-an-email", "pw")]
    #[tokio::test]
    async fn malformed_registrations_are_invalid(#[case] email: &str, #[case] password: &str) {
        let service = service();
        let err = service
            .register(Registration {
                email: email.into(),
                password: password.into(),
                first_name: "A".into(),
                last_name: "B".into(),
                phone: "1".into(),
            })
            .await
            .expect_err("must fail validation");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[tokio::test]
    async fn login_verifies_hash_and_stamps_last_login() {
        let service = service();
        service
            .register(registration("ada@example.com"))
            .await
            .expect("registration succeeds");

        let creds = LoginCredentials::try_from_parts("ada@example.com", "hunter2")
            .expect("valid credentials");
        let user = service.login(&creds).await.expect("login succeeds");
        assert!(user.last_login.is_some());

        let wrong = LoginCredentials::try_from_parts("ada@example.com", "wrong")
            .expect("valid credential shape");
        let err = service.login(&wrong).await.expect_err("login fails");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[rstest]
    #[tokio::test]
    async fn deactivated_accounts_cannot_log_in() {
        let service = service();
        let user = service
            .register(registration("ada@example.com"))
            .await
            .expect("registration succeeds");
        service
            .toggle_active(&user.id)
            .await
            .expect("toggle succeeds");

        let creds = LoginCredentials::try_from_parts("ada@example.com", "hunter2")
            .expect("valid credentials");
        let err = service.login(&creds).await.expect_err("login refused");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[rstest]
    #[tokio::test]
    async fn toggling_an_unknown_user_is_not_found() {
        let service = service();
        let err = service
            .toggle_active(&UserId::new("999"))
            .await
            .expect_err("unknown id");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
