//! Cart repository.
//!
//! A user has at most one cart (`carts_user_id_key`); an anonymous cart is
//! identified by the cart token stored in the visitor's session
//! (`carts_anonymous_session_key`). Get-or-create is an `INSERT .. ON CONFLICT
//! DO NOTHING` followed by a `SELECT`, so two concurrent requests end up with
//! the same cart.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use bozor_core::models::{Cart, CartItem};
use bozor_core::pricing::line_subtotal;
use bozor_core::{CartId, CartItemId, CouponId, ProductId, UserId};

use super::RepositoryError;

macro_rules! cart_columns {
    () => {
        "id, user_id, session_key, coupon_id, created_at, updated_at"
    };
}

macro_rules! item_columns {
    () => {
        "id, cart_id, product_id, quantity, unit_price, created_at, updated_at"
    };
}

/// A cart item joined with the product it refers to.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl CartLine {
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.unit_price, self.quantity)
    }
}

pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's cart, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_for_user(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let cart = sqlx::query_as::<_, Cart>(concat!(
            "SELECT ",
            cart_columns!(),
            " FROM carts WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(cart)
    }

    /// The anonymous cart for a cart token, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_anonymous(&self, token: &str) -> Result<Option<Cart>, RepositoryError> {
        if token.is_empty() {
            return Ok(None);
        }

        let cart = sqlx::query_as::<_, Cart>(concat!(
            "SELECT ",
            cart_columns!(),
            " FROM carts WHERE user_id IS NULL AND session_key = $1"
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(cart)
    }

    /// Get or create the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_or_create_for_user(&self, user_id: UserId) -> Result<Cart, RepositoryError> {
        sqlx::query(
            "INSERT INTO carts (user_id) VALUES ($1) \
             ON CONFLICT (user_id) WHERE user_id IS NOT NULL DO NOTHING",
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;

        self.find_for_user(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Get or create the anonymous cart for a non-empty cart token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_or_create_anonymous(&self, token: &str) -> Result<Cart, RepositoryError> {
        sqlx::query(
            "INSERT INTO carts (session_key) VALUES ($1) \
             ON CONFLICT (session_key) WHERE user_id IS NULL AND session_key <> '' DO NOTHING",
        )
        .bind(token)
        .execute(self.pool)
        .await?;

        self.find_anonymous(token)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Store a cart token on a cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_session_key(&self, cart_id: CartId, token: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE carts SET session_key = $2, updated_at = now() WHERE id = $1")
            .bind(cart_id)
            .bind(token)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Attach or detach a coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_coupon(
        &self,
        cart_id: CartId,
        coupon_id: Option<CouponId>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE carts SET coupon_id = $2, updated_at = now() WHERE id = $1")
            .bind(cart_id)
            .bind(coupon_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Lines of a cart in the order they were added.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let lines = sqlx::query_as::<_, CartLine>(
            "SELECT ci.id AS item_id, ci.product_id, p.name AS product_name, \
                    p.slug AS product_slug, ci.quantity, ci.unit_price \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = $1 \
             ORDER BY ci.created_at, ci.id",
        )
        .bind(cart_id)
        .fetch_all(self.pool)
        .await?;

        Ok(lines)
    }

    /// Add `quantity` of a product, or increase the existing line. The unit
    /// price is set to `unit_price` either way.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<CartItem, RepositoryError> {
        let item = sqlx::query_as::<_, CartItem>(concat!(
            "INSERT INTO cart_items (cart_id, product_id, quantity, unit_price) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (cart_id, product_id) DO UPDATE \
             SET quantity = cart_items.quantity + EXCLUDED.quantity, \
                 unit_price = EXCLUDED.unit_price, \
                 updated_at = now() \
             RETURNING ",
            item_columns!()
        ))
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price)
        .fetch_one(self.pool)
        .await?;

        Ok(item)
    }

    /// Set the quantity and price of an existing line. `None` when the
    /// product is not in the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn update_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let item = sqlx::query_as::<_, CartItem>(concat!(
            "UPDATE cart_items SET quantity = $3, unit_price = $4, updated_at = now() \
             WHERE cart_id = $1 AND product_id = $2 RETURNING ",
            item_columns!()
        ))
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price)
        .fetch_optional(self.pool)
        .await?;

        Ok(item)
    }

    /// Delete a line. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sum of quantities in a cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn item_count(&self, cart_id: CartId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::bigint FROM cart_items WHERE cart_id = $1",
        )
        .bind(cart_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Move every line of `from` into `into` and delete `from`.
    ///
    /// Lines for the same product are added together; prices are refreshed
    /// from the product table.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn merge(&self, from: CartId, into: CartId) -> Result<(), RepositoryError> {
        if from == into {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO cart_items (cart_id, product_id, quantity, unit_price) \
             SELECT $2, ci.product_id, ci.quantity, p.price \
             FROM cart_items ci JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = $1 \
             ON CONFLICT (cart_id, product_id) DO UPDATE \
             SET quantity = cart_items.quantity + EXCLUDED.quantity, \
                 unit_price = EXCLUDED.unit_price, \
                 updated_at = now()",
        )
        .bind(from)
        .bind(into)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_line_subtotal() {
        let line = CartLine {
            item_id: CartItemId::new(1),
            product_id: ProductId::new(2),
            product_name: "Non".to_owned(),
            product_slug: "non".to_owned(),
            quantity: 4,
            unit_price: Decimal::new(3500, 0),
        };
        assert_eq!(line.subtotal(), Decimal::new(14_000, 0));
    }
}
