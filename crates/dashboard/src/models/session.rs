//! Session-related types for staff authentication.

use serde::Serialize;

use bozor_core::UserId;
use bozor_core::models::User;

/// The logged-in staff member, re-read from the database on every request.
///
/// Only the user ID is kept in the session, so deactivating an account or
/// removing its staff flag takes effect immediately.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentStaff {
    pub id: UserId,
    pub username: String,
    /// Name shown in the header.
    pub display_name: String,
    pub is_superuser: bool,
}

impl From<&User> for CurrentStaff {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name(),
            is_superuser: user.is_superuser,
        }
    }
}

/// Session keys for staff authentication data.
pub mod keys {
    /// Key holding the logged-in staff user's ID.
    pub const DASHBOARD_USER_ID: &str = "dashboard_user_id";
}
