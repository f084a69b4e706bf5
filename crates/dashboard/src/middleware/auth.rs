//! Staff authentication extractor and session helpers.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use bozor_core::UserId;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::models::{CurrentStaff, session_keys};
use crate::state::AppState;

/// Extractor that requires a logged-in, active staff user.
///
/// The session only holds the user ID; the account is re-read on every
/// request. No session → redirect to `/login?next=<path>`. A user who is
/// logged in but not staff gets 403.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireStaff(staff): RequireStaff,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", staff.display_name)
/// }
/// ```
pub struct RequireStaff(pub CurrentStaff);

/// Why a request was turned away from a staff-only page.
pub enum StaffRejection {
    /// Not logged in: go to the login page, then back to `next`.
    RedirectToLogin { next: String },
    /// Logged in, but not a staff account.
    Forbidden,
    /// Session or database failure.
    Error(AppError),
}

impl IntoResponse for StaffRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin { next } => Redirect::to(&login_url(&next)).into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                "Staff access is required for this page",
            )
                .into_response(),
            Self::Error(err) => err.into_response(),
        }
    }
}

/// `/login?next=...` for the given local path.
#[must_use]
pub fn login_url(next: &str) -> String {
    if next == "/" {
        return "/login".to_owned();
    }
    format!("/login?next={}", urlencoding::encode(next))
}

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = StaffRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Nested routers see a stripped URI
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map_or(&parts.uri, |original| &original.0);
        let next = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_owned(), ToString::to_string);

        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| StaffRejection::Error(AppError::Internal("no session layer".into())))?;

        let user_id: Option<UserId> = session
            .get(session_keys::DASHBOARD_USER_ID)
            .await
            .map_err(|e| StaffRejection::Error(e.into()))?;

        let Some(user_id) = user_id else {
            return Err(StaffRejection::RedirectToLogin { next });
        };

        let user = UserRepository::new(state.pool())
            .get(user_id)
            .await
            .map_err(|e| StaffRejection::Error(e.into()))?;

        let Some(user) = user.filter(|u| u.is_active) else {
            tracing::info!(user_id = %user_id, "Dropping dashboard session of missing or inactive user");
            clear_current_staff(&session)
                .await
                .map_err(|e| StaffRejection::Error(e.into()))?;
            return Err(StaffRejection::RedirectToLogin { next });
        };

        if !user.is_staff {
            return Err(StaffRejection::Forbidden);
        }

        Ok(Self(CurrentStaff::from(&user)))
    }
}

/// Log a staff user in.
///
/// The session ID is cycled so a pre-login session ID cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_staff(
    session: &Session,
    user_id: UserId,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::DASHBOARD_USER_ID, user_id).await
}

/// Log the staff user out.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_staff(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<UserId>(session_keys::DASHBOARD_USER_ID)
        .await?;
    Ok(())
}

/// The logged-in staff user's ID, if any, without touching the database.
///
/// # Errors
///
/// Returns an error if the session cannot be read.
pub async fn session_user_id(
    session: &Session,
) -> Result<Option<UserId>, tower_sessions::session::Error> {
    session.get(session_keys::DASHBOARD_USER_ID).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_url() {
        assert_eq!(login_url("/"), "/login");
        assert_eq!(login_url("/orders"), "/login?next=%2Forders");
        assert_eq!(
            login_url("/users?status=active"),
            "/login?next=%2Fusers%3Fstatus%3Dactive"
        );
    }
}
