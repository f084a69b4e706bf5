//! HTTP middleware stack for the dashboard.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (stricter than the storefront)
//! 5. Session layer (own cookie, `dashboard.session` table)
//! 6. Rate limiting on `POST /login`
//!
//! Staff checks happen in the [`RequireStaff`] extractor.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{RequireStaff, clear_current_staff, login_url, set_current_staff};
pub use rate_limit::login_rate_limiter;
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
