//! Staff login and logout.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{auth::session_user_id, clear_current_staff, set_current_staff};
use crate::routes::{Flash, MessageQuery, safe_next};
use crate::services::{StaffAuthError, StaffAuthService};
use crate::state::AppState;

const LOGIN_ERROR: &str = "Please enter the correct username and password for a staff account. \
                           Note that both fields may be case-sensitive.";

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

/// Login page query.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub flash: Option<Flash>,
    pub username: String,
    pub next: String,
    pub error: Option<&'static str>,
}

/// Display the login page. Already logged-in staff skip straight to `next`.
pub async fn login_page(session: Session, Query(query): Query<LoginQuery>) -> Result<Response> {
    let next = safe_next(query.next.as_deref(), "/").to_string();

    if session_user_id(&session).await?.is_some() {
        return Ok(Redirect::to(&next).into_response());
    }

    Ok(LoginTemplate {
        flash: Flash::from_query(&query.messages),
        username: String::new(),
        next,
        error: None,
    }
    .into_response())
}

/// Handle login form submission.
#[instrument(skip(state, session, form), fields(username = %form.username))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let next = safe_next(form.next.as_deref(), "/").to_string();

    let user = match StaffAuthService::new(state.pool())
        .login(&form.username, &form.password)
        .await
    {
        Ok(user) => user,
        Err(e @ (StaffAuthError::InvalidCredentials | StaffAuthError::NotStaff)) => {
            tracing::info!(reason = %e, "Dashboard login refused");
            return Ok(LoginTemplate {
                flash: None,
                username: form.username,
                next,
                error: Some(LOGIN_ERROR),
            }
            .into_response());
        }
        Err(e) => return Err(e.into()),
    };

    set_current_staff(&session, user.id).await?;
    set_sentry_user(&user.id, Some(&user.username));
    tracing::info!(user_id = %user.id, "Staff user logged in");

    Ok(Redirect::to(&next).into_response())
}

/// Log out and return to the login page.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<Redirect> {
    clear_current_staff(&session).await?;
    clear_sentry_user();
    Ok(Redirect::to("/login?success=logged_out"))
}

/// `GET /logout` does not log out; it only leads to the login page.
pub async fn logout_redirect() -> Redirect {
    Redirect::to("/login")
}
