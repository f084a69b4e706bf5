//! Coupon lookups and redemption bookkeeping.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use bozor_core::CouponId;
use bozor_core::models::Coupon;

use super::RepositoryError;

macro_rules! coupon_columns {
    () => {
        "id, code, coupon_type, value, active_from, active_to, usage_limit, used_count, \
         is_active, created_at, updated_at"
    };
}

pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Coupon by ID, regardless of validity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CouponId) -> Result<Option<Coupon>, RepositoryError> {
        let coupon = sqlx::query_as::<_, Coupon>(concat!(
            "SELECT ",
            coupon_columns!(),
            " FROM coupons WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(coupon)
    }

    /// A coupon matching `code` (case-insensitive) that is redeemable at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_redeemable(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Coupon>, RepositoryError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }

        let candidates = sqlx::query_as::<_, Coupon>(concat!(
            "SELECT ",
            coupon_columns!(),
            " FROM coupons WHERE lower(code) = lower($1) AND is_active ORDER BY id"
        ))
        .bind(code)
        .fetch_all(self.pool)
        .await?;

        Ok(candidates
            .into_iter()
            .find(|c| c.matches_code(code) && c.is_redeemable(now)))
    }
}

/// Lock a coupon row inside a transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(conn: &mut PgConnection, id: CouponId) -> Result<Option<Coupon>, RepositoryError> {
    let coupon = sqlx::query_as::<_, Coupon>(concat!(
        "SELECT ",
        coupon_columns!(),
        " FROM coupons WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(coupon)
}

/// Count one redemption.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn increment_used(conn: &mut PgConnection, id: CouponId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE coupons SET used_count = used_count + 1, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
