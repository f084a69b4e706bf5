//! Session-side models for the dashboard.
//!
//! Database rows live in `bozor_core::models`.

pub mod session;

pub use session::{CurrentStaff, keys as session_keys};
