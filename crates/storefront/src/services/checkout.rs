//! Turning a cart into an order.
//!
//! Everything happens in one transaction. The cart row is locked first, so a
//! second submit of the same cart waits and then finds it empty. Product rows
//! are locked in ID order, so concurrent checkouts of the same product queue
//! up instead of overselling, and a failed stock check leaves no trace.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;

use bozor_core::models::{Cart, Order};
use bozor_core::pricing::Totals;
use bozor_core::{AddressId, CouponId, ProductId, UserId};

use crate::db::{RepositoryError, coupons};

/// Errors from [`checkout_cart`].
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    /// Not enough stock for the named product.
    #[error("insufficient stock for {0}")]
    InsufficientStock(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, sqlx::FromRow)]
struct PendingLine {
    product_id: ProductId,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct LockedProduct {
    id: ProductId,
    name: String,
    stock: i32,
}

/// Check that every line fits in the locked stock.
fn check_stock(lines: &[PendingLine], products: &[LockedProduct]) -> Result<(), CheckoutError> {
    for line in lines {
        let Some(product) = products.iter().find(|p| p.id == line.product_id) else {
            return Err(RepositoryError::DataCorruption(format!(
                "cart references missing product {}",
                line.product_id
            ))
            .into());
        };
        if product.stock < line.quantity {
            return Err(CheckoutError::InsufficientStock(product.name.clone()));
        }
    }
    Ok(())
}

/// Place an order for everything in `cart`.
///
/// Decrements stock, snapshots unit prices into order items, counts the
/// coupon redemption and empties the cart. A coupon that stopped being
/// redeemable since it was applied gives no discount.
///
/// # Errors
///
/// Returns `CheckoutError::EmptyCart` or `CheckoutError::InsufficientStock`
/// without changing anything; database failures roll the transaction back.
#[tracing::instrument(skip(pool, cart, notes), fields(cart_id = %cart.id))]
pub async fn checkout_cart(
    pool: &PgPool,
    cart: &Cart,
    user_id: UserId,
    shipping_address_id: AddressId,
    notes: &str,
) -> Result<Order, CheckoutError> {
    let mut tx = pool.begin().await?;

    // Taken before the lines are read; the coupon comes from the locked row
    let Some(coupon_id) = sqlx::query_scalar::<_, Option<CouponId>>(
        "SELECT coupon_id FROM carts WHERE id = $1 FOR UPDATE",
    )
    .bind(cart.id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Err(CheckoutError::EmptyCart);
    };

    let lines = sqlx::query_as::<_, PendingLine>(
        "SELECT product_id, quantity, unit_price FROM cart_items \
         WHERE cart_id = $1 ORDER BY product_id",
    )
    .bind(cart.id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let product_ids: Vec<i32> = lines.iter().map(|l| l.product_id.as_i32()).collect();
    let products = sqlx::query_as::<_, LockedProduct>(
        "SELECT id, name, stock FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&product_ids)
    .fetch_all(&mut *tx)
    .await?;

    check_stock(&lines, &products)?;

    let coupon = match coupon_id {
        Some(coupon_id) => coupons::lock(&mut *tx, coupon_id)
            .await?
            .filter(|c| c.is_redeemable(Utc::now())),
        None => None,
    };

    let totals = Totals::compute(
        lines.iter().map(|l| (l.unit_price, l.quantity)),
        coupon.as_ref(),
    );

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (user_id, status, subtotal, discount, total, shipping_address_id, coupon_id, notes) \
         VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7) \
         RETURNING id, user_id, status, subtotal, discount, total, shipping_address_id, coupon_id, \
                   notes, created_at, updated_at",
    )
    .bind(user_id)
    .bind(totals.subtotal)
    .bind(totals.discount)
    .bind(totals.total)
    .bind(shipping_address_id)
    .bind(coupon.as_ref().map(|c| c.id))
    .bind(notes.trim())
    .fetch_one(&mut *tx)
    .await?;

    for line in &lines {
        sqlx::query("UPDATE products SET stock = stock - $2, updated_at = now() WHERE id = $1")
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
    }

    let quantities: Vec<i32> = lines.iter().map(|l| l.quantity).collect();
    let prices: Vec<Decimal> = lines.iter().map(|l| l.unit_price).collect();
    sqlx::query(
        "INSERT INTO order_items (order_id, product_id, quantity, unit_price) \
         SELECT $1, * FROM UNNEST($2::int[], $3::int[], $4::numeric[])",
    )
    .bind(order.id)
    .bind(&product_ids)
    .bind(&quantities)
    .bind(&prices)
    .execute(&mut *tx)
    .await?;

    if let Some(coupon) = &coupon {
        coupons::increment_used(&mut *tx, coupon.id).await?;
    }

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE carts SET coupon_id = NULL, updated_at = now() WHERE id = $1")
        .bind(cart.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(order_id = %order.id, total = %order.total, "Order placed");
    Ok(order)
}
