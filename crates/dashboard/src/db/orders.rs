//! Order queries for the dashboard. Staff see every customer's orders.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use bozor_core::models::{Address, Order, Payment};
use bozor_core::pagination::PageRequest;
use bozor_core::pricing::line_subtotal;
use bozor_core::{AddressId, CouponId, OrderId, OrderItemId, OrderStatus, ProductId};

use super::RepositoryError;

macro_rules! order_columns {
    () => {
        "o.id, o.user_id, o.status, o.subtotal, o.discount, o.total, o.shipping_address_id, \
         o.coupon_id, o.notes, o.created_at, o.updated_at"
    };
}

/// An order with the customer's username.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderRow {
    #[sqlx(flatten)]
    pub order: Order,
    pub username: String,
}

/// An order item with its product's name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderLine {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderLine {
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.unit_price, self.quantity)
    }
}

/// How many orders are in one status.
#[derive(Debug, Clone, Copy, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Per-status counts in [`OrderStatus::ALL`] order, zeros included.
#[must_use]
pub fn fill_status_counts(found: &[StatusCount]) -> Vec<StatusCount> {
    OrderStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: found
                .iter()
                .find(|c| c.status == status)
                .map_or(0, |c| c.count),
        })
        .collect()
}

pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, status: Option<OrderStatus>) -> Result<i64, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders o WHERE ($1::order_status IS NULL OR o.status = $1)",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok(total)
    }

    /// One page of orders, optionally in one status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: &PageRequest,
    ) -> Result<Vec<OrderRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            ", u.username FROM orders o JOIN users u ON u.id = o.user_id \
             WHERE ($1::order_status IS NULL OR o.status = $1) \
             ORDER BY o.created_at DESC, o.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// The `limit` most recent orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest(&self, limit: i64) -> Result<Vec<OrderRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            ", u.username FROM orders o JOIN users u ON u.id = o.user_id \
             ORDER BY o.created_at DESC, o.id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Order count per status, every status included.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status_counts(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let found = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM orders GROUP BY status",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(fill_status_counts(&found))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<OrderRow>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            ", u.username FROM orders o JOIN users u ON u.id = o.user_id WHERE o.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, id: OrderId) -> Result<Vec<OrderLine>, RepositoryError> {
        let lines = sqlx::query_as::<_, OrderLine>(
            "SELECT oi.id, oi.product_id, p.name AS product_name, oi.quantity, oi.unit_price \
             FROM order_items oi JOIN products p ON p.id = oi.product_id \
             WHERE oi.order_id = $1 ORDER BY oi.id",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(lines)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn address(&self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        let address = sqlx::query_as::<_, Address>(
            "SELECT id, user_id, full_name, phone, line1, line2, city, region, postal_code, \
                    country, is_default, created_at, updated_at \
             FROM addresses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(address)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn coupon_code(&self, id: CouponId) -> Result<Option<String>, RepositoryError> {
        let code: Option<String> = sqlx::query_scalar("SELECT code FROM coupons WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(code)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn payment(&self, id: OrderId) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT id, order_id, provider, amount, status, raw_payload, created_at, updated_at \
             FROM payments WHERE order_id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(payment)
    }

    /// Set an order's status and staff notes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if there is no such order.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        notes: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, notes = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(notes)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_status_counts_adds_missing_statuses() {
        let found = [
            StatusCount {
                status: OrderStatus::Shipped,
                count: 3,
            },
            StatusCount {
                status: OrderStatus::Pending,
                count: 7,
            },
        ];

        let filled = fill_status_counts(&found);
        let counts: Vec<_> = filled.iter().map(|c| (c.status, c.count)).collect();
        assert_eq!(
            counts,
            vec![
                (OrderStatus::Pending, 7),
                (OrderStatus::Paid, 0),
                (OrderStatus::Shipped, 3),
                (OrderStatus::Completed, 0),
                (OrderStatus::Canceled, 0),
            ]
        );
    }
}
