//! Headline numbers for the dashboard home page.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use super::RepositoryError;

/// Totals across the shop.
#[derive(Debug, Clone, Copy, Default, Serialize, sqlx::FromRow)]
pub struct DashboardStats {
    pub users: i64,
    pub products: i64,
    pub categories: i64,
    pub orders: i64,
    /// Sum of totals of paid and completed orders.
    pub revenue: Decimal,
}

pub struct StatsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StatsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn overview(&self) -> Result<DashboardStats, RepositoryError> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            "SELECT (SELECT COUNT(*) FROM users) AS users, \
                    (SELECT COUNT(*) FROM products) AS products, \
                    (SELECT COUNT(*) FROM categories) AS categories, \
                    (SELECT COUNT(*) FROM orders) AS orders, \
                    (SELECT COALESCE(SUM(total), 0) FROM orders \
                      WHERE status IN ('paid', 'completed')) AS revenue",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(stats)
    }
}
