//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration, login and password changes
//! - `cart` - The current shopper's cart, coupons and totals
//! - `checkout` - Transactional cart-to-order conversion

pub mod auth;
pub mod cart;
pub mod checkout;
