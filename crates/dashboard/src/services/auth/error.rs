//! Staff authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during staff authentication.
#[derive(Debug, Error)]
pub enum StaffAuthError {
    /// Unknown username, wrong password, unusable password or inactive account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The credentials are right but the account is not staff.
    #[error("account is not staff")]
    NotStaff,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
