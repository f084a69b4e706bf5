//! Business logic services for the dashboard.
//!
//! # Services
//!
//! - `auth` - Staff username/password login
//! - `media` - Product image files under the media root

pub mod auth;
pub mod media;

pub use auth::{StaffAuthError, StaffAuthService};
pub use media::{MediaError, MediaStore};
