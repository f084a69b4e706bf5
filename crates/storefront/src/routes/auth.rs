//! Authentication route handlers.
//!
//! Handles username/password login, customer registration and logout.
//! Logging in merges the visitor's anonymous cart into their account cart.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use bozor_core::models::User;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{Shopper, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::routes::{FormErrors, Layout, MessageQuery, safe_next, with_message};
use crate::services::auth::{AuthError, AuthService, Registration};
use crate::services::cart::CartManager;
use crate::state::AppState;

/// Where to go after login when no `next` is given.
const DEFAULT_NEXT: &str = "/account";

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

/// Registration form data.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// Login page query.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub username: String,
    pub next: String,
    pub error: Option<String>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub layout: Layout,
    pub form: RegisterForm,
    pub errors: FormErrors,
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    State(state): State<AppState>,
    shopper: Shopper,
    Query(query): Query<LoginQuery>,
) -> impl IntoResponse {
    LoginTemplate {
        layout: Layout::new(&state, &shopper, &query.messages).await,
        username: String::new(),
        next: safe_next(query.next.as_deref(), DEFAULT_NEXT).to_string(),
        error: None,
    }
}

/// Handle login form submission.
#[instrument(skip(state, shopper, form), fields(username = %form.username))]
pub async fn login(
    State(state): State<AppState>,
    shopper: Shopper,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let next = safe_next(form.next.as_deref(), DEFAULT_NEXT).to_string();

    let user = match AuthService::new(state.pool())
        .login(&form.username, &form.password)
        .await
    {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            tracing::info!("Login failed");
            return Ok(LoginTemplate {
                layout: Layout::new(&state, &shopper, &MessageQuery::default()).await,
                username: form.username,
                next,
                error: Some(
                    "Please enter a correct username and password. Note that both fields may be case-sensitive."
                        .to_string(),
                ),
            }
            .into_response());
        }
        Err(e) => return Err(e.into()),
    };

    start_session(&state, &shopper, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Redirect::to(&with_message(&next, "success", "logged_in")).into_response())
}

/// Log the user in on this session and pull in their anonymous cart.
async fn start_session(state: &AppState, shopper: &Shopper, user: &User) -> Result<()> {
    // The token must be read before the session ID is cycled.
    let token = shopper.cart_token.clone();
    let current = CurrentUser::from(user);
    set_current_user(shopper.session(), &current).await?;

    if let Err(e) = CartManager::merge_session_cart(state.pool(), user.id, &token).await {
        tracing::warn!(error = %e, user_id = %user.id, "Failed to merge session cart");
    }

    set_sentry_user(&user.id, Some(&user.username));
    Ok(())
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page. Logged-in users go to their account.
pub async fn register_page(
    State(state): State<AppState>,
    shopper: Shopper,
    Query(query): Query<MessageQuery>,
) -> Response {
    if shopper.user.is_some() {
        return Redirect::to(DEFAULT_NEXT).into_response();
    }

    RegisterTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        form: RegisterForm::default(),
        errors: FormErrors::default(),
    }
    .into_response()
}

/// Map a registration failure to a form error, or pass it on.
fn registration_error(err: AuthError) -> std::result::Result<FormErrors, AppError> {
    let mut errors = FormErrors::default();
    match err {
        AuthError::InvalidUsername => errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ),
        AuthError::UsernameTaken => {
            errors.add("username", "A user with that username already exists.");
        }
        AuthError::InvalidEmail(_) => errors.add("email", "Enter a valid email address."),
        AuthError::EmailTaken => errors.add("email", "A user with that email already exists."),
        AuthError::PasswordMismatch => {
            errors.add("password_confirm", "The two password fields didn't match.");
        }
        AuthError::WeakPassword(reason) => errors.add("password", reason),
        other => return Err(other.into()),
    }
    Ok(errors)
}

/// Handle registration form submission.
#[instrument(skip(state, shopper, form), fields(username = %form.username))]
pub async fn register(
    State(state): State<AppState>,
    shopper: Shopper,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    if shopper.user.is_some() {
        return Ok(Redirect::to(DEFAULT_NEXT).into_response());
    }

    let registration = Registration {
        username: &form.username,
        email: &form.email,
        first_name: &form.first_name,
        last_name: &form.last_name,
        password: &form.password,
        password_confirm: &form.password_confirm,
    };

    match AuthService::new(state.pool()).register(&registration).await {
        Ok(user) => {
            start_session(&state, &shopper, &user).await?;
            tracing::info!(user_id = %user.id, "User registered");
            Ok(Redirect::to("/account?success=registered").into_response())
        }
        Err(e) => {
            let errors = registration_error(e)?;
            Ok(RegisterTemplate {
                layout: Layout::new(&state, &shopper, &MessageQuery::default()).await,
                form: RegisterForm {
                    password: String::new(),
                    password_confirm: String::new(),
                    ..form
                },
                errors,
            }
            .into_response())
        }
    }
}

// =============================================================================
// Logout Routes
// =============================================================================

/// Handle logout.
#[instrument(skip(shopper))]
pub async fn logout(shopper: Shopper) -> Result<Redirect> {
    clear_current_user(shopper.session()).await?;
    clear_sentry_user();
    Ok(Redirect::to("/?success=logged_out"))
}

/// `GET /logout` does not log out; it only sends the visitor home.
pub async fn logout_redirect() -> Redirect {
    Redirect::to("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_errors_map_to_fields() {
        let errors = registration_error(AuthError::EmailTaken).unwrap_or_default();
        assert_eq!(errors.get("email").len(), 1);

        let errors = registration_error(AuthError::PasswordMismatch).unwrap_or_default();
        assert_eq!(errors.get("password_confirm").len(), 1);

        let errors =
            registration_error(AuthError::WeakPassword("This password is too short.".into()))
                .unwrap_or_default();
        assert_eq!(errors.get("password"), ["This password is too short.".to_string()]);
    }

    #[test]
    fn test_registration_internal_errors_pass_through() {
        assert!(registration_error(AuthError::PasswordHash).is_err());
    }
}
