//! User repository for database operations.

use sqlx::PgPool;

use bozor_core::models::User;
use bozor_core::{Email, UserId};

use super::RepositoryError;

/// Columns selected into [`User`].
macro_rules! user_columns {
    () => {
        "id, username, email, first_name, last_name, is_active, is_staff, is_superuser, \
         date_joined, last_login, updated_at"
    };
}

/// Unique index on `lower(email)`.
pub const EMAIL_CONSTRAINT: &str = "users_email_lower_key";
/// Unique constraint on `username`.
pub const USERNAME_CONSTRAINT: &str = "users_username_key";

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    /// `None` creates an account with an unusable password.
    pub password_hash: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Get a user and their password hash by username.
    ///
    /// The hash is `None` for accounts with an unusable password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_with_password_hash(
        &self,
        username: &str,
    ) -> Result<Option<(User, Option<String>)>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        let Some(user) = user else {
            return Ok(None);
        };

        let hash = self.get_password_hash(user.id).await?;
        Ok(Some((user, hash)))
    }

    /// Get the password hash for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(hash.flatten())
    }

    /// Create a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` with the violated constraint name
    /// ([`USERNAME_CONSTRAINT`] or [`EMAIL_CONSTRAINT`]) on duplicates.
    pub async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(concat!(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, is_staff, is_superuser) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING ",
            user_columns!()
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(new_user.password_hash.as_deref())
        .bind(new_user.is_staff)
        .bind(new_user.is_superuser)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_unique)
    }

    /// Whether another account already uses `email` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn email_taken(
        &self,
        email: &Email,
        exclude: Option<UserId>,
    ) -> Result<bool, RepositoryError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1) AND ($2::int IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(self.pool)
        .await?;

        Ok(taken)
    }

    /// Whether `username` is already registered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn username_taken(&self, username: &str) -> Result<bool, RepositoryError> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(self.pool)
                .await?;

        Ok(taken)
    }

    /// Update name and email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email belongs to someone else.
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn update_profile(
        &self,
        id: UserId,
        first_name: &str,
        last_name: &str,
        email: &Email,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(concat!(
            "UPDATE users SET first_name = $2, last_name = $3, email = $4, updated_at = now() \
             WHERE id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .fetch_optional(self.pool)
        .await
        .map_err(RepositoryError::from_unique)?
        .ok_or(RepositoryError::NotFound)
    }

    /// Replace the password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(hash)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn touch_last_login(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
