//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! BOZOR_NEW_USER_PASSWORD='...' bozor-cli user create-staff -u aziza -e aziza@example.com
//! ```

use bozor_core::Email;
use bozor_storefront::services::auth::{
    AuthError, hash_password, validate_password, validate_username,
};
use sqlx::PgPool;
use thiserror::Error;

use super::{ConnectError, connect};

/// Errors that can occur while creating a user.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Username, email or password rejected.
    #[error("{0}")]
    Invalid(#[from] AuthError),

    /// Username is taken.
    #[error("A user with username {0} already exists")]
    UsernameExists(String),

    /// Email is taken, compared case-insensitively.
    #[error("A user with email {0} already exists")]
    EmailExists(String),
}

/// Validated input for a new staff user.
#[derive(Debug)]
pub struct NewStaff {
    pub username: String,
    pub email: Email,
    pub password_hash: String,
    pub is_superuser: bool,
}

impl NewStaff {
    /// Validate the arguments and hash the password.
    pub fn new(
        username: &str,
        email: &str,
        password: &str,
        is_superuser: bool,
    ) -> Result<Self, UserError> {
        let username = validate_username(username)?.to_owned();
        let email = Email::parse(email).map_err(AuthError::from)?;
        validate_password(password)?;

        Ok(Self {
            username,
            email,
            password_hash: hash_password(password)?,
            is_superuser,
        })
    }
}

/// Insert the user with `is_staff` set. Returns the new ID.
pub async fn insert_staff(pool: &PgPool, staff: &NewStaff) -> Result<i32, UserError> {
    let username_taken: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(&staff.username)
            .fetch_one(pool)
            .await?;
    if username_taken {
        return Err(UserError::UsernameExists(staff.username.clone()));
    }

    let email_taken: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1))")
            .bind(staff.email.as_str())
            .fetch_one(pool)
            .await?;
    if email_taken {
        return Err(UserError::EmailExists(staff.email.to_string()));
    }

    let id = sqlx::query_scalar(
        r"
        INSERT INTO users (username, email, password_hash, is_staff, is_superuser)
        VALUES ($1, $2, $3, TRUE, $4)
        RETURNING id
        ",
    )
    .bind(&staff.username)
    .bind(staff.email.as_str())
    .bind(&staff.password_hash)
    .bind(staff.is_superuser)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// `user create-staff`.
pub async fn create_staff(
    username: &str,
    email: &str,
    password: &str,
    is_superuser: bool,
) -> Result<i32, UserError> {
    // Validate before touching the database
    let staff = NewStaff::new(username, email, password, is_superuser)?;

    let pool = connect().await?;
    tracing::info!("Creating staff user: {} ({})", staff.username, staff.email);

    let id = insert_staff(&pool, &staff).await?;

    tracing::info!(
        "Staff user created successfully! ID: {}, Username: {}, Superuser: {}",
        id,
        staff.username,
        staff.is_superuser
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_staff_hashes_password() {
        let staff = NewStaff::new(" aziza ", "Aziza@Example.com", "choyxona-42", true)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(staff.username, "aziza");
        assert!(staff.password_hash.starts_with("$argon2id$"));
        assert!(staff.is_superuser);
    }

    #[test]
    fn test_new_staff_rejects_bad_input() {
        assert!(matches!(
            NewStaff::new("bad name!", "a@example.com", "choyxona-42", false),
            Err(UserError::Invalid(AuthError::InvalidUsername))
        ));
        assert!(matches!(
            NewStaff::new("aziza", "not-an-email", "choyxona-42", false),
            Err(UserError::Invalid(AuthError::InvalidEmail(_)))
        ));
        assert!(matches!(
            NewStaff::new("aziza", "a@example.com", "12345678", false),
            Err(UserError::Invalid(AuthError::WeakPassword(_)))
        ));
    }
}
