//! User management pages.
//!
//! Staff can list, create, edit and delete shop accounts. Accounts created
//! here get an unusable password; the user sets one through the storefront
//! or the CLI.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use bozor_core::models::User;
use bozor_core::pagination::{Page, PageRequest};
use bozor_core::{Email, UserId};

use crate::db::users::{
    EMAIL_CONSTRAINT, USERNAME_CONSTRAINT, UserFilter, UserInput, UserStats, UserStatus,
};
use crate::db::{RepositoryError, UserRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireStaff;
use crate::routes::{
    FormErrors, Layout, MessageQuery, Pagination, Section, checkbox, list_link, with_message,
};
use crate::state::AppState;

const PER_PAGE: u32 = 10;
const MAX_USERNAME_LENGTH: usize = 150;
const MAX_NAME_LENGTH: usize = 150;

// =============================================================================
// Form Types
// =============================================================================

/// User list query.
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

/// Create/update form data.
#[derive(Debug, Default, Deserialize)]
pub struct UserForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub is_active: Option<String>,
    pub is_staff: Option<String>,
}

/// Values shown in the user form.
#[derive(Debug, Clone)]
pub struct UserFields {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
}

impl Default for UserFields {
    fn default() -> Self {
        Self {
            username: String::new(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
        }
    }
}

impl From<&User> for UserFields {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_active: user.is_active,
            is_staff: user.is_staff,
        }
    }
}

impl From<UserForm> for UserFields {
    fn from(form: UserForm) -> Self {
        Self {
            is_active: checkbox(form.is_active.as_deref()),
            is_staff: checkbox(form.is_staff.as_deref()),
            username: form.username,
            email: form.email,
            first_name: form.first_name,
            last_name: form.last_name,
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Template, WebTemplate)]
#[template(path = "users/list.html")]
pub struct UserListTemplate {
    pub layout: Layout,
    pub page: Page<User>,
    pub pagination: Pagination,
    pub stats: UserStats,
    pub q: String,
    pub status: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "users/detail.html")]
pub struct UserDetailTemplate {
    pub layout: Layout,
    pub user: User,
    pub order_count: i64,
}

#[derive(Template, WebTemplate)]
#[template(path = "users/form.html")]
pub struct UserFormTemplate {
    pub layout: Layout,
    /// `None` when creating.
    pub user_id: Option<UserId>,
    pub fields: UserFields,
    pub errors: FormErrors,
}

#[derive(Template, WebTemplate)]
#[template(path = "users/confirm_delete.html")]
pub struct UserDeleteTemplate {
    pub layout: Layout,
    pub user: User,
    pub order_count: i64,
}

// =============================================================================
// Validation
// =============================================================================

fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LENGTH
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// Check the form fields that need no database access.
fn parse_user_form(fields: &UserFields) -> std::result::Result<UserInput, FormErrors> {
    let mut errors = FormErrors::default();

    let username = fields.username.trim();
    if username.is_empty() {
        errors.add("username", "This field is required.");
    } else if !is_valid_username(username) {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    let email = match Email::parse(&fields.email) {
        Ok(email) => Some(email),
        Err(_) if fields.email.trim().is_empty() => {
            errors.add("email", "This field is required.");
            None
        }
        Err(_) => {
            errors.add("email", "Enter a valid email address.");
            None
        }
    };

    for (field, value) in [
        ("first_name", &fields.first_name),
        ("last_name", &fields.last_name),
    ] {
        if value.trim().chars().count() > MAX_NAME_LENGTH {
            errors.add(
                field,
                format!("Ensure this value has at most {MAX_NAME_LENGTH} characters."),
            );
        }
    }

    match email {
        Some(email) if errors.is_empty() => Ok(UserInput {
            username: username.to_owned(),
            email,
            first_name: fields.first_name.trim().to_owned(),
            last_name: fields.last_name.trim().to_owned(),
            is_active: fields.is_active,
            is_staff: fields.is_staff,
        }),
        _ => Err(errors),
    }
}

/// Full validation, including uniqueness against other accounts.
async fn validate(
    users: &UserRepository<'_>,
    fields: &UserFields,
    exclude: Option<UserId>,
) -> Result<std::result::Result<UserInput, FormErrors>> {
    let input = match parse_user_form(fields) {
        Ok(input) => input,
        Err(errors) => return Ok(Err(errors)),
    };

    let mut errors = FormErrors::default();
    if users.username_taken(&input.username, exclude).await? {
        errors.add("username", "A user with that username already exists.");
    }
    if users.email_taken(&input.email, exclude).await? {
        errors.add("email", "A user with that email already exists.");
    }

    Ok(if errors.is_empty() {
        Ok(input)
    } else {
        Err(errors)
    })
}

/// Turn a unique violation that slipped past [`validate`] into a form error.
fn conflict_errors(err: RepositoryError) -> std::result::Result<FormErrors, AppError> {
    let mut errors = FormErrors::default();
    match err {
        RepositoryError::Conflict(ref c) if c == USERNAME_CONSTRAINT => {
            errors.add("username", "A user with that username already exists.");
        }
        RepositoryError::Conflict(ref c) if c == EMAIL_CONSTRAINT => {
            errors.add("email", "A user with that email already exists.");
        }
        other => return Err(other.into()),
    }
    Ok(errors)
}

async fn find_user(users: &UserRepository<'_>, id: UserId) -> Result<User> {
    users
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))
}

// =============================================================================
// Handlers
// =============================================================================

/// User list with search, status filter and counts.
#[instrument(skip(staff, state))]
pub async fn index(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<UserListTemplate> {
    let users = UserRepository::new(state.pool());
    let status = UserStatus::parse(query.status.as_deref());
    let filter = UserFilter {
        query: query.q.clone(),
        status,
    };

    let request = PageRequest::parse(query.page.as_deref(), PER_PAGE);
    let total = users.count(&filter).await?;
    request.check(total)?;
    let items = users.list(&filter, &request).await?;
    let page = request.page(items, total);

    let q = query.q.as_deref().unwrap_or("").trim().to_string();
    let status = status.map_or("", UserStatus::as_str).to_string();
    let pagination = Pagination::new(&page, |n| {
        list_link("/users", &[("q", Some(q.as_str())), ("status", Some(status.as_str()))], n)
    });

    Ok(UserListTemplate {
        layout: Layout::new(staff, Section::Users, &query.messages),
        stats: users.stats().await?,
        page,
        pagination,
        q,
        status,
    })
}

/// User detail.
#[instrument(skip(staff, state))]
pub async fn show(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Query(query): Query<MessageQuery>,
) -> Result<UserDetailTemplate> {
    let users = UserRepository::new(state.pool());
    let user = find_user(&users, id).await?;
    let order_count = users.order_count(id).await?;

    Ok(UserDetailTemplate {
        layout: Layout::new(staff, Section::Users, &query),
        user,
        order_count,
    })
}

/// Empty create form.
pub async fn create_page(RequireStaff(staff): RequireStaff) -> UserFormTemplate {
    UserFormTemplate {
        layout: Layout::plain(staff, Section::Users),
        user_id: None,
        fields: UserFields::default(),
        errors: FormErrors::default(),
    }
}

/// Create a user with an unusable password.
#[instrument(skip(staff, state, form), fields(staff_id = %staff.id))]
pub async fn create(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Form(form): Form<UserForm>,
) -> Result<Response> {
    let users = UserRepository::new(state.pool());
    let fields = UserFields::from(form);

    let errors = match validate(&users, &fields, None).await? {
        Ok(input) => match users.create(&input).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "User created from dashboard");
                let target = with_message("/users", "success", "user_created", &user.username);
                return Ok(Redirect::to(&target).into_response());
            }
            Err(e) => conflict_errors(e)?,
        },
        Err(errors) => errors,
    };

    Ok(UserFormTemplate {
        layout: Layout::plain(staff, Section::Users),
        user_id: None,
        fields,
        errors,
    }
    .into_response())
}

/// Edit form.
#[instrument(skip(staff, state))]
pub async fn update_page(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<UserFormTemplate> {
    let user = find_user(&UserRepository::new(state.pool()), id).await?;

    Ok(UserFormTemplate {
        layout: Layout::plain(staff, Section::Users),
        user_id: Some(id),
        fields: UserFields::from(&user),
        errors: FormErrors::default(),
    })
}

/// Save an edited user.
#[instrument(skip(staff, state, form), fields(staff_id = %staff.id))]
pub async fn update(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Form(form): Form<UserForm>,
) -> Result<Response> {
    let users = UserRepository::new(state.pool());
    find_user(&users, id).await?;
    let fields = UserFields::from(form);

    let errors = match validate(&users, &fields, Some(id)).await? {
        Ok(input) => match users.update(id, &input).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "User updated from dashboard");
                let target = with_message("/users", "success", "user_updated", &user.username);
                return Ok(Redirect::to(&target).into_response());
            }
            Err(RepositoryError::NotFound) => {
                return Err(AppError::NotFound(format!("user {id}")));
            }
            Err(e) => conflict_errors(e)?,
        },
        Err(errors) => errors,
    };

    Ok(UserFormTemplate {
        layout: Layout::plain(staff, Section::Users),
        user_id: Some(id),
        fields,
        errors,
    }
    .into_response())
}

/// Delete confirmation.
#[instrument(skip(staff, state))]
pub async fn delete_page(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<UserDeleteTemplate> {
    let users = UserRepository::new(state.pool());
    let user = find_user(&users, id).await?;
    let order_count = users.order_count(id).await?;

    Ok(UserDeleteTemplate {
        layout: Layout::plain(staff, Section::Users),
        user,
        order_count,
    })
}

/// Delete a user. Users with orders and the logged-in user are kept.
#[instrument(skip(staff, state), fields(staff_id = %staff.id))]
pub async fn delete(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Redirect> {
    let users = UserRepository::new(state.pool());
    let user = find_user(&users, id).await?;

    if user.id == staff.id {
        return Ok(Redirect::to(&with_message(
            "/users",
            "error",
            "cannot_delete_self",
            "",
        )));
    }

    match users.delete(id).await {
        Ok(()) => {
            tracing::info!(user_id = %id, "User deleted from dashboard");
            Ok(Redirect::to(&with_message(
                "/users",
                "success",
                "user_deleted",
                &user.username,
            )))
        }
        Err(RepositoryError::Conflict(constraint)) => {
            tracing::info!(user_id = %id, %constraint, "User delete refused");
            Ok(Redirect::to(&with_message(
                "/users",
                "error",
                "user_has_orders",
                &user.username,
            )))
        }
        Err(RepositoryError::NotFound) => Err(AppError::NotFound(format!("user {id}"))),
        Err(e) => Err(e.into()),
    }
}
