//! Session middleware configuration for the dashboard.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions with
//! stricter security settings (SameSite=Strict, 24hr expiry). Dashboard
//! sessions are stored apart from the storefront's, in `dashboard.session`.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::DashboardConfig;

/// Session cookie name for the dashboard.
pub const SESSION_COOKIE_NAME: &str = "bozor_dashboard_session";

/// Session expiry time in seconds (24 hours, stricter than the storefront).
const SESSION_EXPIRY_SECONDS: i64 = 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// # Panics
///
/// Panics if the schema name or table name is invalid (should never happen
/// with hardcoded "dashboard" and "session" values).
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &DashboardConfig,
) -> SessionManagerLayer<PostgresStore> {
    // Table is created by the shared migrations
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("dashboard")
        .expect("valid schema name")
        .with_table_name("session")
        .expect("valid table name");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Strict)
        .with_http_only(true)
        .with_path("/")
}
