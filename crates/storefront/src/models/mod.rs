//! Session-side models for the storefront.
//!
//! Database rows live in `bozor_core::models`; this module holds what the
//! storefront keeps in the visitor's session.

pub mod session;

pub use session::{CurrentUser, keys as session_keys};
