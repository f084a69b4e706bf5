//! HTTP route handlers for the dashboard.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                              - Overview
//! GET  /login, POST /login            - Staff login (POST rate limited)
//! GET  /logout, POST /logout          - Logout (GET only redirects to /login)
//!
//! # Users
//! GET  /users                         - List (?q=, ?status=, ?page=)
//! GET  /users/create, POST            - New user
//! GET  /users/{id}                    - Detail
//! GET  /users/{id}/update, POST       - Edit
//! GET  /users/{id}/delete, POST       - Confirm, delete
//!
//! # Categories
//! GET  /categories                    - List (?page=)
//! GET  /categories/create, POST       - New category
//! GET  /categories/{id}/update, POST  - Edit
//! GET  /categories/{id}/delete, POST  - Confirm, delete
//!
//! # Products
//! GET  /products                      - List (?q=, ?status=, ?category=, ?page=)
//! GET  /products/create, POST         - New product (multipart)
//! GET  /products/{id}/update, POST    - Edit (multipart)
//! GET  /products/{id}/delete, POST    - Confirm, delete
//!
//! # Orders
//! GET  /orders                        - List (?status=, ?page=)
//! GET  /orders/{id}, POST             - Detail, status and notes
//! ```
//!
//! Everything except login and logout requires [`RequireStaff`].
//!
//! [`RequireStaff`]: crate::middleware::RequireStaff

pub mod auth;
pub mod categories;
pub mod dashboard;
pub mod orders;
pub mod products;
pub mod users;

use std::collections::BTreeMap;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use serde::Deserialize;

use bozor_core::pagination::Page;

use crate::middleware::login_rate_limiter;
use crate::models::CurrentStaff;
use crate::state::AppState;

// =============================================================================
// Messages
// =============================================================================

/// Query parameters for message display.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
    /// Name of the record a message is about.
    pub detail: Option<String>,
}

/// A one-off message shown at the top of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    /// `error` or `success`; used as a CSS modifier.
    pub level: &'static str,
    pub text: String,
}

impl Flash {
    #[must_use]
    pub fn from_query(query: &MessageQuery) -> Option<Self> {
        let detail = query.detail.as_deref().unwrap_or("");
        [("error", query.error.as_deref()), ("success", query.success.as_deref())]
            .into_iter()
            .find_map(|(level, code)| {
                message_text(level, code?, detail).map(|text| Self { level, text })
            })
    }
}

fn message_text(level: &str, code: &str, detail: &str) -> Option<String> {
    let subject = if detail.is_empty() {
        String::new()
    } else {
        format!(" \"{detail}\"")
    };
    let text = match (level, code) {
        ("success", "logged_out") => "You have been logged out.".to_owned(),
        ("success", "user_created") => format!("User{subject} was created."),
        ("success", "user_updated") => format!("User{subject} was updated."),
        ("success", "user_deleted") => format!("User{subject} was deleted."),
        ("success", "category_created") => format!("Category{subject} was created."),
        ("success", "category_updated") => format!("Category{subject} was updated."),
        ("success", "category_deleted") => format!("Category{subject} was deleted."),
        ("success", "product_created") => format!("Product{subject} was created."),
        ("success", "product_updated") => format!("Product{subject} was updated."),
        ("success", "product_deleted") => format!("Product{subject} was deleted."),
        ("success", "order_updated") => "Order status updated.".to_owned(),
        ("error", "cannot_delete_self") => "You cannot delete your own account.".to_owned(),
        ("error", "user_has_orders") => {
            format!("User{subject} has orders and cannot be deleted.")
        }
        ("error", "category_in_use") => {
            format!("Category{subject} still has products and cannot be deleted.")
        }
        ("error", "product_in_use") => {
            format!("Product{subject} is part of orders or carts and cannot be deleted.")
        }
        _ => return None,
    };
    Some(text)
}

/// Redirect target carrying a message code and the record's name.
#[must_use]
pub fn with_message(path: &str, level: &str, code: &str, detail: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    if detail.is_empty() {
        format!("{path}{separator}{level}={code}")
    } else {
        format!(
            "{path}{separator}{level}={code}&detail={}",
            urlencoding::encode(detail)
        )
    }
}

/// `next` target if it is a local path, otherwise `default`.
#[must_use]
pub fn safe_next<'a>(next: Option<&'a str>, default: &'a str) -> &'a str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.contains(['\r', '\n']) =>
        {
            path
        }
        _ => default,
    }
}

// =============================================================================
// Page chrome and form errors
// =============================================================================

/// Sidebar section a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Overview,
    Users,
    Categories,
    Products,
    Orders,
}

impl Section {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Users => "users",
            Self::Categories => "categories",
            Self::Products => "products",
            Self::Orders => "orders",
        }
    }
}

/// What every staff page needs: who is logged in, which nav item is
/// current and an optional message.
#[derive(Debug, Clone)]
pub struct Layout {
    pub staff: CurrentStaff,
    pub section: Section,
    pub flash: Option<Flash>,
}

impl Layout {
    #[must_use]
    pub fn new(staff: CurrentStaff, section: Section, query: &MessageQuery) -> Self {
        Self {
            staff,
            section,
            flash: Flash::from_query(query),
        }
    }

    /// Without a query message.
    #[must_use]
    pub const fn plain(staff: CurrentStaff, section: Section) -> Self {
        Self {
            staff,
            section,
            flash: None,
        }
    }

    /// CSS class for the sidebar link named `name`.
    #[must_use]
    pub fn nav_class(&self, name: &str) -> &'static str {
        if self.section.as_str() == name {
            "active"
        } else {
            ""
        }
    }
}

/// Field-level validation errors for re-rendered forms.
#[derive(Debug, Clone, Default)]
pub struct FormErrors {
    errors: BTreeMap<&'static str, Vec<String>>,
}

impl FormErrors {
    pub const NON_FIELD: &'static str = "__all__";

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> &[String] {
        self.errors.get(field).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn non_field(&self) -> &[String] {
        self.get(Self::NON_FIELD)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Previous/next links for a paginated list.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub number: u32,
    pub num_pages: u32,
    pub total_items: i64,
    pub previous: Option<String>,
    pub next: Option<String>,
}

impl Pagination {
    pub fn new<T>(page: &Page<T>, link: impl Fn(u32) -> String) -> Self {
        Self {
            number: page.number,
            num_pages: page.num_pages,
            total_items: page.total_items,
            previous: page.has_previous().then(|| link(page.previous_number())),
            next: page.has_next().then(|| link(page.next_number())),
        }
    }

    #[must_use]
    pub const fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}

/// Query string for list links: non-empty `(key, value)` pairs plus `page`.
#[must_use]
pub fn list_link(path: &str, params: &[(&str, Option<&str>)], page: u32) -> String {
    let mut link = format!("{path}?");
    for (key, value) in params {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            link.push_str(key);
            link.push('=');
            link.push_str(&urlencoding::encode(value));
            link.push('&');
        }
    }
    link.push_str(&format!("page={page}"));
    link
}

/// A checkbox posts `on` when ticked and nothing otherwise.
pub(crate) fn checkbox(value: Option<&str>) -> bool {
    matches!(value, Some("on" | "true" | "1"))
}

/// A trimmed, non-empty form value.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// Routers
// =============================================================================

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index))
        .route("/create", get(users::create_page).post(users::create))
        .route("/{id}", get(users::show))
        .route("/{id}/update", get(users::update_page).post(users::update))
        .route("/{id}/delete", get(users::delete_page).post(users::delete))
}

fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(categories::index))
        .route("/create", get(categories::create_page).post(categories::create))
        .route("/{id}/update", get(categories::update_page).post(categories::update))
        .route("/{id}/delete", get(categories::delete_page).post(categories::delete))
}

/// Product forms are multipart; `max_upload_bytes` bounds the image.
fn product_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/create", get(products::create_page).post(products::create))
        .route("/{id}/update", get(products::update_page).post(products::update))
        .route("/{id}/delete", get(products::delete_page).post(products::delete))
        // Room for the text fields next to the file
        .layer(DefaultBodyLimit::max(max_upload_bytes + 64 * 1024))
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show).post(orders::update_status))
}

/// Create all routes for the dashboard.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard::home))
        .route("/login", get(auth::login_page))
        .route("/login", post(auth::login).layer(login_rate_limiter()))
        .route("/logout", get(auth::logout_redirect).post(auth::logout))
        .nest("/users", user_routes())
        .nest("/categories", category_routes())
        .nest("/products", product_routes(max_upload_bytes))
        .nest("/orders", order_routes())
}

#[cfg(test)]
mod tests {
    use bozor_core::pagination::PageRequest;

    use super::*;

    #[test]
    fn test_flash_with_detail() {
        let query = MessageQuery {
            success: Some("product_created".to_string()),
            detail: Some("Qora choy".to_string()),
            ..MessageQuery::default()
        };
        assert_eq!(
            Flash::from_query(&query).map(|f| f.text),
            Some("Product \"Qora choy\" was created.".to_string())
        );
    }

    #[test]
    fn test_flash_error_wins_and_unknown_ignored() {
        let query = MessageQuery {
            error: Some("category_in_use".to_string()),
            success: Some("category_updated".to_string()),
            detail: None,
        };
        let flash = Flash::from_query(&query).unwrap_or_else(|| panic!());
        assert_eq!(flash.level, "error");
        assert_eq!(
            flash.text,
            "Category still has products and cannot be deleted."
        );

        let unknown = MessageQuery {
            error: Some("<b>".to_string()),
            ..MessageQuery::default()
        };
        assert!(Flash::from_query(&unknown).is_none());
    }

    #[test]
    fn test_with_message_encodes_detail() {
        assert_eq!(
            with_message("/users", "success", "user_deleted", ""),
            "/users?success=user_deleted"
        );
        assert_eq!(
            with_message("/products", "error", "product_in_use", "Ko'k choy & co"),
            "/products?error=product_in_use&detail=Ko%27k%20choy%20%26%20co"
        );
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/orders?page=2"), "/"), "/orders?page=2");
        assert_eq!(safe_next(Some("//evil.example"), "/"), "/");
        assert_eq!(safe_next(Some("https://evil.example"), "/"), "/");
        assert_eq!(safe_next(None, "/"), "/");
    }

    #[test]
    fn test_list_link_skips_blank_params() {
        assert_eq!(
            list_link("/users", &[("q", Some(" aziza ")), ("status", Some(""))], 2),
            "/users?q=aziza&page=2"
        );
        assert_eq!(list_link("/orders", &[("status", None)], 1), "/orders?page=1");
    }

    #[test]
    fn test_pagination_links() {
        let page = PageRequest::parse(Some("2"), 12).page(vec![0; 12], 30);
        let pagination = Pagination::new(&page, |n| list_link("/products", &[], n));
        assert_eq!(pagination.total_items, 30);
        assert_eq!(pagination.previous.as_deref(), Some("/products?page=1"));
        assert_eq!(pagination.next.as_deref(), Some("/products?page=3"));
    }

    #[test]
    fn test_form_helpers() {
        assert!(checkbox(Some("on")));
        assert!(!checkbox(None));
        assert_eq!(non_empty(Some("  x ")), Some("x"));
        assert_eq!(non_empty(Some("   ")), None);
    }
}
