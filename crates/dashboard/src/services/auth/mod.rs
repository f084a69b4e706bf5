//! Staff authentication service.
//!
//! Staff sign in with the same username and Argon2id password as on the
//! storefront. Only active accounts flagged `is_staff` get in.

mod error;

pub use error::StaffAuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use sqlx::PgPool;

use bozor_core::models::User;

use crate::db::UserRepository;

/// Staff authentication service.
pub struct StaffAuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> StaffAuthService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Check a username and password and require a staff account.
    ///
    /// # Errors
    ///
    /// Returns `StaffAuthError::InvalidCredentials` for a wrong password,
    /// unknown or inactive user, or an unusable password, and
    /// `StaffAuthError::NotStaff` when the account is not staff.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, StaffAuthError> {
        let (user, hash) = self
            .users
            .get_with_password_hash(username.trim())
            .await?
            .ok_or(StaffAuthError::InvalidCredentials)?;

        let hash = hash.ok_or(StaffAuthError::InvalidCredentials)?;
        verify_password(password, &hash)?;

        if !user.is_active {
            return Err(StaffAuthError::InvalidCredentials);
        }
        if !user.is_staff {
            return Err(StaffAuthError::NotStaff);
        }

        self.users.touch_last_login(user.id).await?;
        Ok(user)
    }
}

fn verify_password(password: &str, hash: &str) -> Result<(), StaffAuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| StaffAuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| StaffAuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    use super::*;

    #[test]
    fn test_verify_password() {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"olma-anor-uzum", &salt)
            .unwrap()
            .to_string();

        assert!(verify_password("olma-anor-uzum", &hash).is_ok());
        assert!(matches!(
            verify_password("olma-anor", &hash),
            Err(StaffAuthError::InvalidCredentials)
        ));
        assert!(matches!(
            verify_password("olma-anor-uzum", "plain-text"),
            Err(StaffAuthError::InvalidCredentials)
        ));
    }
}
