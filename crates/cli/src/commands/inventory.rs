//! Inventory maintenance.

use sqlx::PgPool;

use super::{ConnectError, connect};

/// Delete commitments whose `expires_at` has passed. Returns how many.
pub async fn delete_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM inventory_commitments WHERE expires_at <= now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// `inventory release-expired`: prints the number of released commitments.
pub async fn release_expired() -> Result<(), ConnectError> {
    let pool = connect().await?;
    let released = delete_expired(&pool).await?;

    tracing::info!(released, "Expired inventory commitments released");
    #[allow(clippy::print_stdout)]
    {
        println!("{released}");
    }
    Ok(())
}
