//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Home page
//! GET  /health                    - Liveness
//! GET  /health/ready              - Database readiness
//!
//! # Catalog
//! GET  /catalog                   - Product listing (?q=, ?page=)
//! GET  /catalog/{category_slug}   - Listing restricted to a category subtree
//! GET  /product/{slug}            - Product detail
//! POST /product/{id}/add          - Add quantity, redirect back
//! POST /product/{id}/quick-add    - Add one, redirect to cart
//!
//! # Cart & checkout
//! GET  /cart                      - Cart page
//! POST /cart                      - action=update|remove|coupon
//! GET  /checkout                  - Address form (login required)
//! POST /checkout                  - Place order
//! GET  /order-success/{order_id}  - Confirmation (owner only)
//!
//! # Auth (rate limited)
//! GET  /login, POST /login        - Username + password login
//! GET  /register, POST /register  - Customer registration
//! GET  /logout, POST /logout      - Logout (GET only redirects home)
//!
//! # Account (login required)
//! GET  /account                   - Overview
//! GET  /account/orders            - Order history
//! GET  /account/orders/{id}       - Order detail
//! GET  /account/profile, POST     - Name, email and addresses
//! GET  /account/password, POST    - Password change
//! ```
//!
//! Messages survive redirects as `?success=<code>`, `?warning=<code>` or
//! `?error=<code>` and are turned into text by [`Flash::from_query`].

pub mod account;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod home;
pub mod products;

use std::collections::BTreeMap;

use axum::{
    Router,
    routing::{get, post},
};
use serde::Deserialize;

use bozor_core::pagination::Page;

use crate::middleware::{Shopper, auth_rate_limiter};
use crate::models::CurrentUser;
use crate::state::AppState;

// =============================================================================
// Messages
// =============================================================================

/// Query parameters for message display.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub warning: Option<String>,
    pub success: Option<String>,
    /// Extra text some messages interpolate (e.g. a product name).
    pub detail: Option<String>,
}

/// A one-off message shown at the top of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    /// `error`, `warning` or `success`; used as a CSS modifier.
    pub level: &'static str,
    pub text: String,
}

impl Flash {
    /// Build the message for the first known code in the query.
    #[must_use]
    pub fn from_query(query: &MessageQuery) -> Option<Self> {
        let detail = query.detail.as_deref().unwrap_or("");
        let candidates = [
            ("error", query.error.as_deref()),
            ("warning", query.warning.as_deref()),
            ("success", query.success.as_deref()),
        ];

        candidates.into_iter().find_map(|(level, code)| {
            message_text(level, code?, detail).map(|text| Self { level, text })
        })
    }
}

fn message_text(level: &str, code: &str, detail: &str) -> Option<String> {
    let text = match (level, code) {
        ("success", "logged_in") => "Welcome back!",
        ("success", "registered") => "Your account has been created.",
        ("success", "logged_out") => "You have been logged out.",
        ("success", "added") => "Added to cart.",
        ("success", "cart_updated") => "Cart updated.",
        ("success", "item_removed") => "Item removed from cart.",
        ("success", "coupon_applied") => "Coupon applied.",
        ("success", "profile_updated") => "Profile updated.",
        ("success", "password_changed") => "Your password has been changed.",
        ("success", "order_placed") => "Thank you! Your order has been placed.",
        ("warning", "empty_cart") => "Your cart is empty.",
        ("error", "invalid_quantity") => "Please enter a valid quantity.",
        ("error", "coupon_invalid") => "Coupon is invalid or expired.",
        ("error", "insufficient_stock") => {
            return Some(format!("Insufficient stock for {detail}."));
        }
        ("error", "empty_cart") => "Your cart is empty.",
        ("error", "session") => "Your session could not be saved. Please try again.",
        _ => return None,
    };
    Some(text.to_string())
}

/// Append a message code to a local redirect target.
#[must_use]
pub fn with_message(path: &str, level: &str, code: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{level}={code}")
}

/// `next` target if it is a local path, otherwise `default`.
///
/// Only paths starting with a single `/` are accepted, so `//evil.example`
/// and absolute URLs cannot be used for open redirects.
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

/// What every page needs for the header: user, cart badge and message.
#[derive(Debug, Clone)]
pub struct Layout {
    pub user: Option<CurrentUser>,
    pub cart_count: i64,
    pub flash: Option<Flash>,
}

impl Layout {
    pub async fn new(state: &AppState, shopper: &Shopper, query: &MessageQuery) -> Self {
        Self {
            user: shopper.user.clone(),
            cart_count: shopper.cart_count(state.pool()).await,
            flash: Flash::from_query(query),
        }
    }
}

/// Field-level validation errors for re-rendered forms.
///
/// Errors not tied to a field go under [`FormErrors::NON_FIELD`].
#[derive(Debug, Clone, Default)]
pub struct FormErrors {
    errors: BTreeMap<&'static str, Vec<String>>,
}

impl FormErrors {
    pub const NON_FIELD: &'static str = "__all__";

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.entry(field).or_default().push(message.into());
    }

    /// Messages for `field` (empty when it is valid).
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
    pub previous: Option<String>,
    pub next: Option<String>,
}

impl Pagination {
    /// Build links for `page`, with `link` turning a page number into a URL.
    pub fn new<T>(page: &Page<T>, link: impl Fn(u32) -> String) -> Self {
        Self {
            number: page.number,
            num_pages: page.num_pages,
            previous: page.has_previous().then(|| link(page.previous_number())),
            next: page.has_next().then(|| link(page.next_number())),
        }
    }

    #[must_use]
    pub const fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}

/// A checkbox posts `on` when ticked and nothing otherwise.
pub(crate) fn checkbox(value: Option<&str>) -> bool {
    matches!(value, Some("on" | "true" | "1"))
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router (rate limited).
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .layer(auth_rate_limiter())
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::dashboard))
        .route("/orders", get(account::orders))
        .route("/orders/{id}", get(account::order_detail))
        .route("/profile", get(account::profile_page).post(account::update_profile))
        .route("/password", get(account::password_page).post(account::change_password))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .merge(auth_routes())
        .route("/logout", get(auth::logout_redirect).post(auth::logout))
        .route("/catalog", get(catalog::index))
        .route("/catalog/{category_slug}", get(catalog::category))
        .route("/product/{slug}", get(products::show))
        .route("/product/{id}/add", post(products::add_to_cart))
        .route("/product/{id}/quick-add", post(products::quick_add))
        .route("/cart", get(cart::show).post(cart::update))
        .route("/checkout", get(checkout::page).post(checkout::place_order))
        .route("/order-success/{order_id}", get(checkout::success))
        .nest("/account", account_routes())
}

#[cfg(test)]
mod tests {
    use bozor_core::pagination::PageRequest;

    use super::*;

    fn query(level: &str, code: &str) -> MessageQuery {
        let mut q = MessageQuery::default();
        match level {
            "error" => q.error = Some(code.to_string()),
            "warning" => q.warning = Some(code.to_string()),
            _ => q.success = Some(code.to_string()),
        }
        q
    }

    #[test]
    fn test_flash_known_codes() {
        let flash = Flash::from_query(&query("success", "added")).unwrap_or_else(|| panic!());
        assert_eq!(flash.level, "success");
        assert_eq!(flash.text, "Added to cart.");
    }

    #[test]
    fn test_flash_unknown_code_is_ignored() {
        assert!(Flash::from_query(&query("error", "<script>")).is_none());
        assert!(Flash::from_query(&MessageQuery::default()).is_none());
    }

    #[test]
    fn test_flash_interpolates_detail() {
        let mut q = query("error", "insufficient_stock");
        q.detail = Some("Qora choy".to_string());
        assert_eq!(
            Flash::from_query(&q).map(|f| f.text),
            Some("Insufficient stock for Qora choy.".to_string())
        );
    }

    #[test]
    fn test_with_message() {
        assert_eq!(with_message("/cart", "success", "added"), "/cart?success=added");
        assert_eq!(
            with_message("/catalog?page=2", "error", "invalid_quantity"),
            "/catalog?page=2&error=invalid_quantity"
        );
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/checkout"), "/account"), "/checkout");
        assert_eq!(safe_next(Some("//evil.example"), "/account"), "/account");
        assert_eq!(safe_next(Some("https://evil.example"), "/account"), "/account");
        assert_eq!(safe_next(Some("/\\evil.example"), "/account"), "/account");
        assert_eq!(safe_next(None, "/account"), "/account");
    }

    #[test]
    fn test_form_errors() {
        let mut errors = FormErrors::default();
        assert!(errors.is_empty());
        errors.add("email", "Enter a valid email address.");
        errors.add(FormErrors::NON_FIELD, "Something went wrong.");
        assert_eq!(errors.get("email").len(), 1);
        assert!(errors.get("username").is_empty());
        assert_eq!(errors.non_field().len(), 1);
    }

    #[test]
    fn test_pagination_links() {
        let page = PageRequest::parse(Some("2"), 10).page(vec![0; 10], 30);
        let pagination = Pagination::new(&page, |n| format!("/account/orders?page={n}"));
        assert!(pagination.is_paginated());
        assert_eq!(pagination.previous.as_deref(), Some("/account/orders?page=1"));
        assert_eq!(pagination.next.as_deref(), Some("/account/orders?page=3"));

        let single = PageRequest::parse(None, 10).page(vec![0; 3], 3);
        let pagination = Pagination::new(&single, |n| format!("?page={n}"));
        assert!(!pagination.is_paginated());
        assert!(pagination.previous.is_none());
        assert!(pagination.next.is_none());
    }

    #[test]
    fn test_checkbox() {
        assert!(checkbox(Some("on")));
        assert!(!checkbox(None));
        assert!(!checkbox(Some("off")));
    }
}
