//! Order history for the customer account pages.
//!
//! Orders are written by `services::checkout`; this module only reads them,
//! always scoped to the owning user.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use bozor_core::models::Order;
use bozor_core::pagination::PageRequest;
use bozor_core::pricing::line_subtotal;
use bozor_core::{OrderId, OrderItemId, ProductId, UserId};

use super::RepositoryError;

macro_rules! order_columns {
    () => {
        "id, user_id, status, subtotal, discount, total, shipping_address_id, coupon_id, notes, \
         created_at, updated_at"
    };
}

/// An order item joined with its product's name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderLine {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderLine {
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.unit_price, self.quantity)
    }
}

/// Numbers for the account dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize, sqlx::FromRow)]
pub struct OrderStats {
    pub order_count: i64,
    pub pending_count: i64,
    /// Sum of totals of paid and completed orders.
    pub total_spent: Decimal,
}

pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Count a user's orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_for_user(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// One page of a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// The user's `limit` most recent orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent_for_user(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Order count, pending count and amount spent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats_for_user(&self, user_id: UserId) -> Result<OrderStats, RepositoryError> {
        let stats = sqlx::query_as::<_, OrderStats>(
            "SELECT COUNT(*) AS order_count, \
                    COUNT(*) FILTER (WHERE status = 'pending') AS pending_count, \
                    COALESCE(SUM(total) FILTER (WHERE status IN ('paid', 'completed')), 0) AS total_spent \
             FROM orders WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(stats)
    }

    /// An order, only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Items of an order with product names.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, RepositoryError> {
        let lines = sqlx::query_as::<_, OrderLine>(
            "SELECT oi.id, oi.product_id, p.name AS product_name, p.slug AS product_slug, \
                    oi.quantity, oi.unit_price \
             FROM order_items oi JOIN products p ON p.id = oi.product_id \
             WHERE oi.order_id = $1 ORDER BY oi.id",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(lines)
    }
}
