//! Authentication service.
//!
//! Username + password accounts with Argon2id hashes. A `NULL` hash is an
//! unusable password: such accounts (created from the dashboard) cannot log
//! in until a password is set.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;

use bozor_core::models::User;
use bozor_core::{Email, UserId};

use crate::db::RepositoryError;
use crate::db::users::{EMAIL_CONSTRAINT, NewUser, USERNAME_CONSTRAINT, UserRepository};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum username length.
const MAX_USERNAME_LENGTH: usize = 150;

/// Fields submitted on the registration form.
#[derive(Debug, Clone)]
pub struct Registration<'r> {
    pub username: &'r str,
    pub email: &'r str,
    pub first_name: &'r str,
    pub last_name: &'r str,
    pub password: &'r str,
    pub password_confirm: &'r str,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a customer account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidUsername` / `InvalidEmail` for malformed input,
    /// `AuthError::PasswordMismatch` / `WeakPassword` for password problems and
    /// `AuthError::UsernameTaken` / `EmailTaken` for duplicates.
    pub async fn register(&self, form: &Registration<'_>) -> Result<User, AuthError> {
        let username = validate_username(form.username)?;
        let email = Email::parse(form.email)?;

        if form.password != form.password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(form.password)?;

        if self.users.username_taken(username).await? {
            return Err(AuthError::UsernameTaken);
        }
        if self.users.email_taken(&email, None).await? {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(form.password)?;

        let user = self
            .users
            .create(&NewUser {
                username: username.to_owned(),
                email,
                first_name: form.first_name.trim().to_owned(),
                last_name: form.last_name.trim().to_owned(),
                password_hash: Some(password_hash),
                is_staff: false,
                is_superuser: false,
            })
            .await
            .map_err(map_conflict)?;

        tracing::info!(user_id = %user.id, "Customer registered");
        Ok(user)
    }

    /// Login with username and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the username/password is wrong,
    /// the account is inactive or its password is unusable.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let (user, password_hash) = self
            .users
            .get_with_password_hash(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password_hash = password_hash.ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &password_hash)?;

        if !user.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        self.users.touch_last_login(user.id).await?;
        Ok(user)
    }

    /// Change a password after checking the old one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the old password is wrong,
    /// `AuthError::PasswordMismatch` / `WeakPassword` for the new one.
    pub async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<(), AuthError> {
        let current = self
            .users
            .get_password_hash(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(old_password, &current)?;

        if new_password != new_password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(new_password)?;

        let hash = hash_password(new_password)?;
        self.users
            .set_password_hash(user_id, &hash)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

fn map_conflict(e: RepositoryError) -> AuthError {
    match e {
        RepositoryError::Conflict(ref constraint) if constraint == USERNAME_CONSTRAINT => {
            AuthError::UsernameTaken
        }
        RepositoryError::Conflict(ref constraint) if constraint == EMAIL_CONSTRAINT => {
            AuthError::EmailTaken
        }
        other => AuthError::Repository(other),
    }
}

/// Validate a username: 1-150 characters of letters, digits and `@.+-_`.
///
/// # Errors
///
/// Returns `AuthError::InvalidUsername` otherwise.
pub fn validate_username(username: &str) -> Result<&str, AuthError> {
    let username = username.trim();
    let valid = !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LENGTH
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));

    if valid {
        Ok(username)
    } else {
        Err(AuthError::InvalidUsername)
    }
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` describing the first failed rule.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword(
            "password cannot be entirely numeric".to_owned(),
        ));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("qovun-pishdi").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("qovun-pishdi", &hash).is_ok());
        assert!(matches!(
            verify_password("tarvuz-pishdi", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("12345678901").is_err());
        assert!(validate_password("samarqand2024").is_ok());
    }

    #[test]
    fn test_username_rules() {
        assert_eq!(validate_username("  aziza.k ").unwrap(), "aziza.k");
        assert!(validate_username("user+shop@bozor").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("semi;colon").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
    }

    #[test]
    fn test_conflict_mapping() {
        assert!(matches!(
            map_conflict(RepositoryError::Conflict(USERNAME_CONSTRAINT.to_owned())),
            AuthError::UsernameTaken
        ));
        assert!(matches!(
            map_conflict(RepositoryError::Conflict(EMAIL_CONSTRAINT.to_owned())),
            AuthError::EmailTaken
        ));
        assert!(matches!(
            map_conflict(RepositoryError::NotFound),
            AuthError::Repository(RepositoryError::NotFound)
        ));
    }
}
