//! User management queries.

use serde::Serialize;
use sqlx::PgPool;

use bozor_core::models::User;
use bozor_core::pagination::PageRequest;
use bozor_core::{Email, UserId};

use super::{RepositoryError, search_pattern};

macro_rules! user_columns {
    () => {
        "id, username, email, first_name, last_name, is_active, is_staff, is_superuser, \
         date_joined, last_login, updated_at"
    };
}

/// Shared `WHERE` clause for the user list: `$1` search pattern, `$2` active flag.
macro_rules! user_filter {
    () => {
        " WHERE ($1::text IS NULL OR username ILIKE $1 OR first_name ILIKE $1 \
               OR last_name ILIKE $1 OR email ILIKE $1) \
            AND ($2::boolean IS NULL OR is_active = $2)"
    };
}

/// Unique index on `lower(email)`.
pub const EMAIL_CONSTRAINT: &str = "users_email_lower_key";
/// Unique constraint on `username`.
pub const USERNAME_CONSTRAINT: &str = "users_username_key";

/// The `status` filter of the user list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    /// Parse the query value; anything else means "all".
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            Some("active") => Some(Self::Active),
            Some("inactive") => Some(Self::Inactive),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// Filters for the user list.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Substring of username, first or last name, or email.
    pub query: Option<String>,
    pub status: Option<UserStatus>,
}

impl UserFilter {
    fn pattern(&self) -> Option<String> {
        search_pattern(self.query.as_deref())
    }

    fn is_active(&self) -> Option<bool> {
        self.status.map(|s| s == UserStatus::Active)
    }
}

/// Counts shown above the user list.
#[derive(Debug, Clone, Copy, Default, Serialize, sqlx::FromRow)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
}

/// Editable user fields.
#[derive(Debug, Clone)]
pub struct UserInput {
    pub username: String,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
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
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_with_password_hash(
        &self,
        username: &str,
    ) -> Result<Option<(User, Option<String>)>, RepositoryError> {
        let Some(user) = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?
        else {
            return Ok(None);
        };

        let hash: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(user.id)
                .fetch_one(self.pool)
                .await?;

        Ok(Some((user, hash)))
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn touch_last_login(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Number of users matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, filter: &UserFilter) -> Result<i64, RepositoryError> {
        let total: i64 = sqlx::query_scalar(concat!("SELECT COUNT(*) FROM users", user_filter!()))
            .bind(filter.pattern())
            .bind(filter.is_active())
            .fetch_one(self.pool)
            .await?;

        Ok(total)
    }

    /// One page of users matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Vec<User>, RepositoryError> {
        let users = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users",
            user_filter!(),
            " ORDER BY date_joined DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.pattern())
        .bind(filter.is_active())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(users)
    }

    /// Total, active and inactive user counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self) -> Result<UserStats, RepositoryError> {
        let stats = sqlx::query_as::<_, UserStats>(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE is_active) AS active, \
                    COUNT(*) FILTER (WHERE NOT is_active) AS inactive \
             FROM users",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(stats)
    }

    /// Whether another account uses `email` (case-insensitive).
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

    /// Whether another account uses `username`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn username_taken(
        &self,
        username: &str,
        exclude: Option<UserId>,
    ) -> Result<bool, RepositoryError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 AND ($2::int IS NULL OR id <> $2))",
        )
        .bind(username)
        .bind(exclude)
        .fetch_one(self.pool)
        .await?;

        Ok(taken)
    }

    /// Create a user with an unusable password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` naming [`USERNAME_CONSTRAINT`] or
    /// [`EMAIL_CONSTRAINT`] on duplicates.
    pub async fn create(&self, input: &UserInput) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(concat!(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, is_active, is_staff) \
             VALUES ($1, $2, $3, $4, NULL, $5, $6) RETURNING ",
            user_columns!()
        ))
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(input.is_active)
        .bind(input.is_staff)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_constraint)
    }

    /// Update a user's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist and
    /// `RepositoryError::Conflict` on duplicates.
    pub async fn update(&self, id: UserId, input: &UserInput) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(concat!(
            "UPDATE users SET username = $2, email = $3, first_name = $4, last_name = $5, \
                    is_active = $6, is_staff = $7, updated_at = now() \
             WHERE id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(input.is_active)
        .bind(input.is_staff)
        .fetch_optional(self.pool)
        .await
        .map_err(RepositoryError::from_constraint)?
        .ok_or(RepositoryError::NotFound)
    }

    /// Number of orders placed by a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn order_count(&self, id: UserId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(id)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Delete a user. Addresses and carts go with them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` while orders reference the user
    /// and `RepositoryError::NotFound` if there is no such user.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(RepositoryError::from_constraint)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_status_parse() {
        assert_eq!(UserStatus::parse(Some("active")), Some(UserStatus::Active));
        assert_eq!(UserStatus::parse(Some("inactive")), Some(UserStatus::Inactive));
        assert_eq!(UserStatus::parse(Some("")), None);
        assert_eq!(UserStatus::parse(Some("banned")), None);
        assert_eq!(UserStatus::parse(None), None);
    }

    #[test]
    fn test_filter_binds() {
        let filter = UserFilter {
            query: Some(" karim ".to_string()),
            status: Some(UserStatus::Inactive),
        };
        assert_eq!(filter.pattern().as_deref(), Some("%karim%"));
        assert_eq!(filter.is_active(), Some(false));
        assert_eq!(UserFilter::default().is_active(), None);
    }
}
