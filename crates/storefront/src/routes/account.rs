//! Account route handlers.
//!
//! These routes require authentication.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use bozor_core::models::{Address, Order, User};
use bozor_core::pagination::{Page, PageRequest};
use bozor_core::{Email, OrderId};

use crate::db::orders::{OrderLine, OrderStats};
use crate::db::{AddressRepository, OrderRepository, RepositoryError, UserRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{RequireAuth, Shopper};
use crate::models::{CurrentUser, session_keys};
use crate::routes::{FormErrors, Layout, MessageQuery, Pagination};
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

/// Orders per history page.
pub const ORDERS_PER_PAGE: u32 = 10;

/// Orders shown on the overview.
const RECENT_ORDERS: i64 = 5;

/// Account overview page template.
#[derive(Template, WebTemplate)]
#[template(path = "account/index.html")]
pub struct AccountIndexTemplate {
    pub layout: Layout,
    pub user: User,
    pub stats: OrderStats,
    pub recent_orders: Vec<Order>,
}

/// Order history template.
#[derive(Template, WebTemplate)]
#[template(path = "account/orders.html")]
pub struct OrdersTemplate {
    pub layout: Layout,
    pub page: Page<Order>,
    pub pagination: Pagination,
}

/// Single order template.
#[derive(Template, WebTemplate)]
#[template(path = "account/order_detail.html")]
pub struct OrderDetailTemplate {
    pub layout: Layout,
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub address: Option<Address>,
}

/// Profile form template.
#[derive(Template, WebTemplate)]
#[template(path = "account/profile.html")]
pub struct ProfileTemplate {
    pub layout: Layout,
    pub form: ProfileForm,
    pub errors: FormErrors,
    pub addresses: Vec<Address>,
}

/// Password change template.
#[derive(Template, WebTemplate)]
#[template(path = "account/password.html")]
pub struct PasswordTemplate {
    pub layout: Layout,
    pub errors: FormErrors,
}

/// Profile form data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl From<&User> for ProfileForm {
    fn from(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.to_string(),
        }
    }
}

/// Password change form data.
#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// Order history query.
#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    pub page: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

const MAX_NAME_LENGTH: usize = 150;

fn validate_profile(form: &ProfileForm) -> std::result::Result<Email, FormErrors> {
    let mut errors = FormErrors::default();

    for (field, value) in [("first_name", &form.first_name), ("last_name", &form.last_name)] {
        if value.trim().chars().count() > MAX_NAME_LENGTH {
            errors.add(
                field,
                format!("Ensure this value has at most {MAX_NAME_LENGTH} characters."),
            );
        }
    }

    let email = if form.email.trim().is_empty() {
        errors.add("email", "This field is required.");
        None
    } else {
        match Email::parse(&form.email) {
            Ok(email) => Some(email),
            Err(_) => {
                errors.add("email", "Enter a valid email address.");
                None
            }
        }
    };

    match email {
        Some(email) if errors.is_empty() => Ok(email),
        _ => Err(errors),
    }
}

async fn load_user(state: &AppState, user: &CurrentUser) -> Result<User> {
    Ok(AuthService::new(state.pool()).get_user(user.id).await?)
}

// =============================================================================
// Overview and orders
// =============================================================================

/// Display account overview page.
#[instrument(skip(state, shopper, current, query), fields(user_id = %current.id))]
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    shopper: Shopper,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let user = load_user(&state, &current).await?;
    let orders = OrderRepository::new(state.pool());
    let stats = orders.stats_for_user(user.id).await?;
    let recent_orders = orders.recent_for_user(user.id, RECENT_ORDERS).await?;

    Ok(AccountIndexTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        user,
        stats,
        recent_orders,
    })
}

/// Display the user's orders, newest first.
#[instrument(skip(state, shopper, current, query), fields(user_id = %current.id))]
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    shopper: Shopper,
    Query(query): Query<OrdersQuery>,
) -> Result<impl IntoResponse> {
    let repo = OrderRepository::new(state.pool());
    let request = PageRequest::parse(query.page.as_deref(), ORDERS_PER_PAGE);
    let total = repo.count_for_user(current.id).await?;
    request.check(total)?;
    let orders = repo.list_for_user(current.id, &request).await?;
    let page = request.page(orders, total);
    let pagination = Pagination::new(&page, |n| format!("/account/orders?page={n}"));

    Ok(OrdersTemplate {
        layout: Layout::new(&state, &shopper, &query.messages).await,
        page,
        pagination,
    })
}

/// Display one of the user's orders. Other users' orders are 404.
#[instrument(skip(state, shopper, current, query), fields(user_id = %current.id))]
pub async fn order_detail(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    shopper: Shopper,
    Path(id): Path<OrderId>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let repo = OrderRepository::new(state.pool());
    let order = repo
        .get_for_user(current.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;
    let lines = repo.lines(order.id).await?;
    let address = AddressRepository::new(state.pool())
        .get(order.shipping_address_id)
        .await?;

    Ok(OrderDetailTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        order,
        lines,
        address,
    })
}

// =============================================================================
// Profile
// =============================================================================

/// Display the profile form and saved addresses.
#[instrument(skip(state, shopper, current, query), fields(user_id = %current.id))]
pub async fn profile_page(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    shopper: Shopper,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let user = load_user(&state, &current).await?;
    let addresses = AddressRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;

    Ok(ProfileTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        form: ProfileForm::from(&user),
        errors: FormErrors::default(),
        addresses,
    })
}

/// Update name and email.
#[instrument(skip(state, shopper, current, form), fields(user_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    shopper: Shopper,
    Form(form): Form<ProfileForm>,
) -> Result<Response> {
    let users = UserRepository::new(state.pool());

    let mut errors = FormErrors::default();
    let outcome = match validate_profile(&form) {
        Ok(email) => {
            if users.email_taken(&email, Some(current.id)).await? {
                errors.add("email", "A user with that email already exists.");
                None
            } else {
                match users
                    .update_profile(current.id, form.first_name.trim(), form.last_name.trim(), &email)
                    .await
                {
                    Ok(user) => Some(user),
                    Err(RepositoryError::Conflict(_)) => {
                        errors.add("email", "A user with that email already exists.");
                        None
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Err(form_errors) => {
            errors = form_errors;
            None
        }
    };

    if let Some(user) = outcome {
        // Keep the header name in sync.
        shopper
            .session()
            .insert(session_keys::CURRENT_USER, CurrentUser::from(&user))
            .await?;
        tracing::info!("Profile updated");
        return Ok(Redirect::to("/account/profile?success=profile_updated").into_response());
    }

    let addresses = AddressRepository::new(state.pool())
        .list_for_user(current.id)
        .await?;

    Ok(ProfileTemplate {
        layout: Layout::new(&state, &shopper, &MessageQuery::default()).await,
        form,
        errors,
        addresses,
    }
    .into_response())
}

// =============================================================================
// Password
// =============================================================================

/// Display the password change form.
pub async fn password_page(
    State(state): State<AppState>,
    RequireAuth(_current): RequireAuth,
    shopper: Shopper,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    PasswordTemplate {
        layout: Layout::new(&state, &shopper, &query).await,
        errors: FormErrors::default(),
    }
}

/// Change the password. The user stays logged in.
#[instrument(skip(state, shopper, current, form), fields(user_id = %current.id))]
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    shopper: Shopper,
    Form(form): Form<PasswordForm>,
) -> Result<Response> {
    let result = AuthService::new(state.pool())
        .change_password(
            current.id,
            &form.old_password,
            &form.new_password1,
            &form.new_password2,
        )
        .await;

    let mut errors = FormErrors::default();
    match result {
        Ok(()) => {
            return Ok(Redirect::to("/account?success=password_changed").into_response());
        }
        Err(AuthError::InvalidCredentials) => errors.add(
            "old_password",
            "Your old password was entered incorrectly. Please enter it again.",
        ),
        Err(AuthError::PasswordMismatch) => {
            errors.add("new_password2", "The two password fields didn't match.");
        }
        Err(AuthError::WeakPassword(reason)) => errors.add("new_password2", reason),
        Err(e) => return Err(e.into()),
    }

    Ok(PasswordTemplate {
        layout: Layout::new(&state, &shopper, &MessageQuery::default()).await,
        errors,
    }
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_profile_accepts_valid_email() {
        let form = ProfileForm {
            first_name: "Aziza".to_string(),
            last_name: String::new(),
            email: "Aziza@Shop.uz".to_string(),
        };
        assert!(validate_profile(&form).is_ok());
    }

    #[test]
    fn test_validate_profile_requires_email() {
        let errors = validate_profile(&ProfileForm::default())
            .err()
            .unwrap_or_else(|| panic!("empty email should be rejected"));
        assert_eq!(errors.get("email"), ["This field is required.".to_string()]);
    }

    #[test]
    fn test_validate_profile_rejects_long_names() {
        let form = ProfileForm {
            first_name: "a".repeat(151),
            last_name: String::new(),
            email: "aziza@shop.uz".to_string(),
        };
        let errors = validate_profile(&form)
            .err()
            .unwrap_or_else(|| panic!("long name should be rejected"));
        assert_eq!(errors.get("first_name").len(), 1);
    }
}
