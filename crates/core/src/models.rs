//! Row types for the shared shop tables.
//!
//! Both the storefront and the dashboard read these tables, so the row
//! structs live here. With the `postgres` feature they derive
//! `sqlx::FromRow`; column names match field names.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::line_subtotal;
use crate::types::{
    AddressId, CartId, CartItemId, CategoryId, CouponId, CouponType, Email,
    InventoryCommitmentId, OrderId, OrderItemId, OrderStatus, PaymentId, PaymentStatus, ProductId,
    ProductImageId, UserId,
};

/// A shop account. Customers and staff share the table.
///
/// The password hash is deliberately not part of this struct; repositories
/// fetch it separately when verifying credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// First and last name joined, or the username when both are blank.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_owned()
        }
    }
}

/// A catalog category. Categories nest through `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sellable product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub short_description: String,
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub stock: i32,
    pub is_active: bool,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// True when a higher "compare at" price should be shown struck through.
    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.compare_at_price.is_some_and(|compare| compare > self.price)
    }

    /// True when stock is at or below the dashboard's low-stock threshold.
    #[must_use]
    pub const fn is_low_stock(&self) -> bool {
        self.stock <= LOW_STOCK_THRESHOLD
    }
}

/// Products at or below this stock level are flagged on the dashboard.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// An image attached to a product. At most one is the default image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct ProductImage {
    pub id: ProductImageId,
    pub product_id: ProductId,
    /// Path relative to the media root, e.g. `products/3f2a....jpg`.
    pub image: String,
    pub alt: String,
    pub is_default: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

impl ProductImage {
    /// Public URL under the `/media` mount.
    #[must_use]
    pub fn url(&self) -> String {
        format!("/media/{}", self.image)
    }
}

/// A time-bounded stock reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct InventoryCommitment {
    pub id: InventoryCommitmentId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub expires_at: DateTime<Utc>,
}

/// A discount code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub active_from: DateTime<Utc>,
    pub active_to: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A customer's shipping address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 code.
    pub country: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Address {
    /// Single-line rendering for lists and order summaries.
    #[must_use]
    pub fn one_line(&self) -> String {
        [
            self.line1.as_str(),
            self.line2.as_str(),
            self.city.as_str(),
            self.region.as_str(),
            self.postal_code.as_str(),
            self.country.as_str(),
        ]
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// A shopping cart. Owned by a user, or by an anonymous session key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Cart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub session_key: String,
    pub coupon_id: Option<CouponId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product line in a cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Price captured when the line was last added or updated.
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.unit_price, self.quantity)
    }
}

/// A placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub shipping_address_id: AddressId,
    pub coupon_id: Option<CouponId>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn has_discount(&self) -> bool {
        self.discount > Decimal::ZERO
    }
}

/// One product line of an order, priced at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.unit_price, self.quantity)
    }
}

/// Payment record for an order (at most one per order).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub provider: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            id: AddressId::new(1),
            user_id: UserId::new(1),
            full_name: "Aziza Karimova".to_owned(),
            phone: "+998901234567".to_owned(),
            line1: "Amir Temur ko'chasi 5".to_owned(),
            line2: String::new(),
            city: "Toshkent".to_owned(),
            region: " ".to_owned(),
            postal_code: "100000".to_owned(),
            country: "UZ".to_owned(),
            is_default: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_address_one_line_skips_blank_parts() {
        assert_eq!(
            address().one_line(),
            "Amir Temur ko'chasi 5, Toshkent, 100000, UZ"
        );
    }

    #[test]
    fn test_user_display_name_falls_back_to_username() {
        let mut user = User {
            id: UserId::new(1),
            username: "aziza".to_owned(),
            email: Email::parse("aziza@shop.uz").unwrap(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
            last_login: None,
            updated_at: Utc::now(),
        };
        assert_eq!(user.display_name(), "aziza");

        user.first_name = "Aziza".to_owned();
        assert_eq!(user.display_name(), "Aziza");

        user.last_name = "Karimova".to_owned();
        assert_eq!(user.display_name(), "Aziza Karimova");
    }

    #[test]
    fn test_cart_item_subtotal() {
        let item = CartItem {
            id: CartItemId::new(1),
            cart_id: CartId::new(1),
            product_id: ProductId::new(1),
            quantity: 3,
            unit_price: Decimal::new(1250, 2),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(item.subtotal(), Decimal::new(3750, 2));
    }
}
