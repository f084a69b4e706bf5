//! Bozor Core - Shared types and business rules.
//!
//! This crate provides the pieces shared by every Bozor component:
//! - `storefront` - Public shop (catalog, cart, checkout, customer accounts)
//! - `dashboard` - Staff dashboard (users, categories, products, orders)
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains types and pure functions only - no I/O, no database
//! access, no HTTP. Row types derive `sqlx::FromRow` behind the `postgres`
//! feature so both binaries can read the shared tables with the same structs.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails and status enums
//! - [`models`] - Row types for the shared catalog, cart and order tables
//! - [`pricing`] - Cart totals, coupon discounts and coupon validity
//! - [`catalog`] - Category tree traversal
//! - [`slug`] - URL slug generation
//! - [`pagination`] - Page numbers and offsets for list views

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod models;
pub mod pagination;
pub mod pricing;
pub mod slug;
pub mod types;

pub use types::*;
