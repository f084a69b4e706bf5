//! Cart operations for the current shopper.
//!
//! [`CartManager`] resolves the shopper's cart once per request (by user when
//! logged in, otherwise by the cart token kept in the session) and exposes
//! the cart mutations the routes need.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use bozor_core::models::{Cart, CartItem, Coupon, Product};
use bozor_core::pricing::Totals;
use bozor_core::{ProductId, UserId};

use crate::db::carts::CartLine;
use crate::db::{CartRepository, CouponRepository, RepositoryError};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Anonymous shopper without a cart token.
    #[error("cart token missing from session")]
    MissingToken,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Everything the cart page shows.
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub coupon: Option<Coupon>,
    pub totals: Totals,
}

impl CartSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The current shopper's cart.
pub struct CartManager<'a> {
    pool: &'a PgPool,
    cart: Cart,
}

impl<'a> CartManager<'a> {
    /// Fetch or create the cart for a user or a cart token.
    ///
    /// A logged-in user's cart adopts the cart token when it has none yet.
    ///
    /// # Errors
    ///
    /// Returns `CartError::MissingToken` for an anonymous shopper without a
    /// token, `CartError::Repository` if a query fails.
    pub async fn open(
        pool: &'a PgPool,
        user_id: Option<UserId>,
        token: Option<&str>,
    ) -> Result<Self, CartError> {
        let carts = CartRepository::new(pool);
        let token = token.filter(|t| !t.is_empty());

        let cart = if let Some(user_id) = user_id {
            let mut cart = carts.get_or_create_for_user(user_id).await?;
            if cart.session_key.is_empty()
                && let Some(token) = token
            {
                carts.set_session_key(cart.id, token).await?;
                token.clone_into(&mut cart.session_key);
            }
            cart
        } else {
            let token = token.ok_or(CartError::MissingToken)?;
            carts.get_or_create_anonymous(token).await?
        };

        Ok(Self { pool, cart })
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    fn carts(&self) -> CartRepository<'a> {
        CartRepository::new(self.pool)
    }

    /// Add a product. Quantities below 1 count as 1; an existing line is
    /// increased. The line price is refreshed to the product's price.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the upsert fails.
    pub async fn add_product(&self, product: &Product, quantity: i32) -> Result<CartItem, CartError> {
        let quantity = quantity.max(1);
        let item = self
            .carts()
            .add_item(self.cart.id, product.id, quantity, product.price)
            .await?;

        tracing::debug!(cart_id = %self.cart.id, product_id = %product.id, quantity, "Added to cart");
        Ok(item)
    }

    /// Set a line's quantity. Below 1 removes the line. `None` when the
    /// product is not in the cart (or was just removed).
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn update_quantity(
        &self,
        product: &Product,
        quantity: i32,
    ) -> Result<Option<CartItem>, CartError> {
        if quantity < 1 {
            self.remove_product(product.id).await?;
            return Ok(None);
        }

        let item = self
            .carts()
            .update_item(self.cart.id, product.id, quantity, product.price)
            .await?;
        Ok(item)
    }

    /// Remove a product's line if present.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the delete fails.
    pub async fn remove_product(&self, product_id: ProductId) -> Result<bool, CartError> {
        let removed = self.carts().delete_item(self.cart.id, product_id).await?;
        Ok(removed)
    }

    /// Apply a coupon by code. Returns the coupon when it is redeemable;
    /// otherwise the cart is left unchanged and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn apply_coupon(&mut self, code: &str) -> Result<Option<Coupon>, CartError> {
        let Some(coupon) = CouponRepository::new(self.pool)
            .find_redeemable(code, Utc::now())
            .await?
        else {
            return Ok(None);
        };

        self.carts().set_coupon(self.cart.id, Some(coupon.id)).await?;
        self.cart.coupon_id = Some(coupon.id);
        Ok(Some(coupon))
    }

    /// The cart's coupon, when it is still redeemable.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn coupon(&self) -> Result<Option<Coupon>, CartError> {
        let Some(coupon_id) = self.cart.coupon_id else {
            return Ok(None);
        };

        let coupon = CouponRepository::new(self.pool).get(coupon_id).await?;
        Ok(coupon.filter(|c| c.is_redeemable(Utc::now())))
    }

    /// Lines with product names.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn lines(&self) -> Result<Vec<CartLine>, CartError> {
        let lines = self.carts().lines(self.cart.id).await?;
        Ok(lines)
    }

    /// Subtotal, discount and total.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn totals(&self) -> Result<Totals, CartError> {
        Ok(self.summary().await?.totals)
    }

    /// Lines, coupon and totals in one go.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn summary(&self) -> Result<CartSummary, CartError> {
        let lines = self.lines().await?;
        let coupon = self.coupon().await?;
        let totals = Totals::compute(
            lines.iter().map(|line| (line.unit_price, line.quantity)),
            coupon.as_ref(),
        );

        Ok(CartSummary {
            lines,
            coupon,
            totals,
        })
    }

    /// Sum of quantities.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn item_count(&self) -> Result<i64, CartError> {
        let count = self.carts().item_count(self.cart.id).await?;
        Ok(count)
    }

    /// Merge the anonymous cart for `token` into the user's cart.
    ///
    /// Called right after login. Does nothing when the token has no cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn merge_session_cart(
        pool: &PgPool,
        user_id: UserId,
        token: &str,
    ) -> Result<(), CartError> {
        let carts = CartRepository::new(pool);
        let Some(anonymous) = carts.find_anonymous(token).await? else {
            return Ok(());
        };

        let cart = carts.get_or_create_for_user(user_id).await?;
        carts.merge(anonymous.id, cart.id).await?;
        if cart.coupon_id.is_none()
            && let Some(coupon_id) = anonymous.coupon_id
        {
            carts.set_coupon(cart.id, Some(coupon_id)).await?;
        }

        tracing::info!(user_id = %user_id, from = %anonymous.id, into = %cart.id, "Merged session cart");
        Ok(())
    }

    /// Item count for the header badge without creating a cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn badge_count(
        pool: &PgPool,
        user_id: Option<UserId>,
        token: Option<&str>,
    ) -> Result<i64, CartError> {
        let carts = CartRepository::new(pool);
        let cart = match (user_id, token) {
            (Some(user_id), _) => carts.find_for_user(user_id).await?,
            (None, Some(token)) => carts.find_anonymous(token).await?,
            (None, None) => None,
        };

        match cart {
            Some(cart) => Ok(carts.item_count(cart.id).await?),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let summary = CartSummary {
            lines: Vec::new(),
            coupon: None,
            totals: Totals::default(),
        };
        assert!(summary.is_empty());
    }
}
