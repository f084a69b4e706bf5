//! Database operations for the staff dashboard.
//!
//! The dashboard shares the shop database with the storefront and reads and
//! writes the same tables (see `crates/storefront/migrations/`). Staff
//! sessions live in `dashboard.session`.
//!
//! Unlike the storefront, queries here see inactive rows too.

pub mod categories;
pub mod orders;
pub mod products;
pub mod stats;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use categories::CategoryRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use stats::StatsRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation: a duplicate, or a delete blocked by rows that
    /// still reference the target. Carries the constraint name.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique and foreign key violations to `Conflict`.
    pub(crate) fn from_constraint(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
        {
            return Self::Conflict(db_err.constraint().unwrap_or("constraint").to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool.
///
/// The dashboard has a handful of users, so the pool is smaller than the
/// storefront's.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// `ILIKE` pattern for a search box value, or `None` when it is blank.
///
/// `%`, `_` and `\` in the input match literally.
#[must_use]
pub fn search_pattern(raw: Option<&str>) -> Option<String> {
    let needle = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    Some(pattern)
}

/// Slug for `name`, cut to `max_len`, or `fallback` when nothing usable is
/// left (e.g. a name written only in Cyrillic).
#[must_use]
pub fn slug_base(name: &str, fallback: &str, max_len: usize) -> String {
    let mut base = bozor_core::slug::slugify(name);
    base.truncate(max_len);
    let base = base.trim_end_matches(['-', '_']);
    if base.is_empty() {
        fallback.to_owned()
    } else {
        base.to_owned()
    }
}
