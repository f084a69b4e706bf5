//! Cart and checkout services against a migrated database.
//!
//! These tests require a `PostgreSQL` server reachable through
//! `DATABASE_URL`; sqlx creates and migrates a scratch database per test.
//!
//! Run with: cargo test -p bozor-integration-tests --test storefront_db -- --ignored

use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;

use bozor_core::models::Product;
use bozor_core::{AddressId, ProductId, UserId};
use bozor_storefront::db::addresses::NewAddress;
use bozor_storefront::db::{AddressRepository, CatalogRepository};
use bozor_storefront::services::cart::CartManager;
use bozor_storefront::services::checkout::{CheckoutError, checkout_cart};

async fn insert_user(pool: &PgPool, username: &str) -> UserId {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING id",
    )
    .bind(username)
    .bind(format!("{username}@example.com"))
    .fetch_one(pool)
    .await
    .expect("insert user");
    UserId::new(id)
}

async fn insert_address(pool: &PgPool, user_id: UserId) -> AddressId {
    let address = NewAddress {
        full_name: "Aziza Karimova".to_string(),
        phone: "+998901234567".to_string(),
        line1: "Amir Temur ko'chasi 1".to_string(),
        city: "Toshkent".to_string(),
        country: "UZ".to_string(),
        ..NewAddress::default()
    };
    AddressRepository::new(pool)
        .create(user_id, &address)
        .await
        .expect("create address")
        .id
}

/// Active product priced 25 000 with `stock` units, in a fresh category.
async fn insert_product(pool: &PgPool, slug: &str, stock: i32) -> Product {
    let category_id: i32 = sqlx::query_scalar(
        "INSERT INTO categories (name, slug) VALUES ($1, $1) RETURNING id",
    )
    .bind(format!("{slug}-category"))
    .fetch_one(pool)
    .await
    .expect("insert category");

    let id: i32 = sqlx::query_scalar(
        "INSERT INTO products (category_id, name, slug, price, stock) \
         VALUES ($1, $2, $2, 25000, $3) RETURNING id",
    )
    .bind(category_id)
    .bind(slug)
    .bind(stock)
    .fetch_one(pool)
    .await
    .expect("insert product");

    product(pool, id).await
}

async fn product(pool: &PgPool, id: i32) -> Product {
    CatalogRepository::new(pool)
        .product_by_id(ProductId::new(id))
        .await
        .expect("load product")
        .expect("product is active")
}

/// Percent coupon, active since yesterday until `ends_in_days` from now.
async fn insert_coupon(pool: &PgPool, code: &str, ends_in_days: i32, usage_limit: Option<i32>) {
    sqlx::query(
        "INSERT INTO coupons (code, coupon_type, value, active_from, active_to, usage_limit) \
         VALUES ($1, 'percent', 10, now() - interval '1 day', now() + make_interval(days => $2), $3)",
    )
    .bind(code)
    .bind(ends_in_days)
    .bind(usage_limit)
    .execute(pool)
    .await
    .expect("insert coupon");
}

async fn stock_of(pool: &PgPool, product: &Product) -> i32 {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(product.id)
        .fetch_one(pool)
        .await
        .expect("read stock")
}

async fn order_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await
        .expect("count orders")
}

async fn used_count(pool: &PgPool, code: &str) -> i32 {
    sqlx::query_scalar("SELECT used_count FROM coupons WHERE code = $1")
        .bind(code)
        .fetch_one(pool)
        .await
        .expect("read used_count")
}

// =============================================================================
// Cart
// =============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_add_product_increments_line_and_refreshes_price(pool: PgPool) {
    let user_id = insert_user(&pool, "aziza").await;
    let tea = insert_product(&pool, "kok-choy", 10).await;
    let cart = CartManager::open(&pool, Some(user_id), None).await.expect("open cart");

    cart.add_product(&tea, 1).await.expect("add");
    sqlx::query("UPDATE products SET price = 30000 WHERE id = $1")
        .bind(tea.id)
        .execute(&pool)
        .await
        .expect("reprice");
    let tea = product(&pool, tea.id.as_i32()).await;

    let item = cart.add_product(&tea, 2).await.expect("add again");
    assert_eq!(item.quantity, 3);
    assert_eq!(item.unit_price, Decimal::new(30000, 0));
    assert_eq!(cart.item_count().await.expect("count"), 3);

    // Zero still adds one
    let item = cart.add_product(&tea, 0).await.expect("add zero");
    assert_eq!(item.quantity, 4);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_update_quantity_below_one_removes_line(pool: PgPool) {
    let tea = insert_product(&pool, "qora-choy", 10).await;
    let cart = CartManager::open(&pool, None, Some("anon-token-1")).await.expect("open cart");

    cart.add_product(&tea, 2).await.expect("add");
    let item = cart.update_quantity(&tea, 5).await.expect("update");
    assert_eq!(item.map(|i| i.quantity), Some(5));

    let item = cart.update_quantity(&tea, 0).await.expect("update to zero");
    assert!(item.is_none());
    assert!(cart.lines().await.expect("lines").is_empty());
    assert!(!cart.remove_product(tea.id).await.expect("remove"));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_anonymous_cart_needs_token(pool: PgPool) {
    let result = CartManager::open(&pool, None, Some("")).await;
    assert!(result.is_err());
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_apply_coupon_matches_code_case_insensitively(pool: PgPool) {
    insert_coupon(&pool, "BAHOR10", 7, None).await;
    let tea = insert_product(&pool, "yashil-choy", 10).await;
    let mut cart = CartManager::open(&pool, None, Some("anon-token-2")).await.expect("open cart");
    cart.add_product(&tea, 2).await.expect("add");

    let coupon = cart.apply_coupon(" bahor10 ").await.expect("apply");
    assert_eq!(coupon.map(|c| c.code), Some("BAHOR10".to_string()));

    let totals = cart.totals().await.expect("totals");
    assert_eq!(totals.subtotal, Decimal::new(50000, 0));
    assert_eq!(totals.discount, Decimal::new(5000, 0));
    assert_eq!(totals.total, Decimal::new(45000, 0));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_apply_coupon_rejects_unknown_and_expired_codes(pool: PgPool) {
    insert_coupon(&pool, "QISH5", -1, None).await;
    insert_coupon(&pool, "TUGADI", 7, Some(0)).await;
    let mut cart = CartManager::open(&pool, None, Some("anon-token-3")).await.expect("open cart");

    for code in ["NOPE", "QISH5", "TUGADI", "   "] {
        assert!(cart.apply_coupon(code).await.expect("apply").is_none(), "{code}");
    }
    assert!(cart.cart().coupon_id.is_none());
    assert!(cart.coupon().await.expect("coupon").is_none());
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_merge_session_cart_sums_lines_and_drops_anonymous_cart(pool: PgPool) {
    let user_id = insert_user(&pool, "bekzod").await;
    let tea = insert_product(&pool, "oq-choy", 10).await;
    let coffee = insert_product(&pool, "qahva", 10).await;

    let anonymous = CartManager::open(&pool, None, Some("anon-token-4")).await.expect("open");
    anonymous.add_product(&tea, 2).await.expect("add tea");
    anonymous.add_product(&coffee, 1).await.expect("add coffee");
    let anonymous_id = anonymous.cart().id;

    let user_cart = CartManager::open(&pool, Some(user_id), None).await.expect("open");
    user_cart.add_product(&tea, 1).await.expect("add tea");

    CartManager::merge_session_cart(&pool, user_id, "anon-token-4")
        .await
        .expect("merge");

    let lines = user_cart.lines().await.expect("lines");
    let quantity_of = |id: ProductId| lines.iter().find(|l| l.product_id == id).map(|l| l.quantity);
    assert_eq!(quantity_of(tea.id), Some(3));
    assert_eq!(quantity_of(coffee.id), Some(1));

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts WHERE id = $1")
        .bind(anonymous_id)
        .fetch_one(&pool)
        .await
        .expect("count carts");
    assert_eq!(remaining, 0);

    // A token without a cart is a no-op
    CartManager::merge_session_cart(&pool, user_id, "anon-token-4")
        .await
        .expect("second merge");
    assert_eq!(user_cart.item_count().await.expect("count"), 4);
}

// =============================================================================
// Checkout
// =============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_checkout_empty_cart_is_refused(pool: PgPool) {
    let user_id = insert_user(&pool, "dilnoza").await;
    let address_id = insert_address(&pool, user_id).await;
    let cart = CartManager::open(&pool, Some(user_id), None).await.expect("open cart");

    let result = checkout_cart(&pool, cart.cart(), user_id, address_id, "").await;
    assert!(matches!(result, Err(CheckoutError::EmptyCart)));
    assert_eq!(order_count(&pool).await, 0);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_checkout_places_order_and_empties_cart(pool: PgPool) {
    let user_id = insert_user(&pool, "elyor").await;
    let address_id = insert_address(&pool, user_id).await;
    let tea = insert_product(&pool, "kok-choy", 10).await;
    insert_coupon(&pool, "BAHOR10", 7, Some(5)).await;

    let mut cart = CartManager::open(&pool, Some(user_id), None).await.expect("open cart");
    cart.add_product(&tea, 2).await.expect("add");
    cart.apply_coupon("BAHOR10").await.expect("apply").expect("redeemable");

    let order = checkout_cart(&pool, cart.cart(), user_id, address_id, "  Eshik oldida  ")
        .await
        .expect("checkout");

    assert_eq!(order.subtotal, Decimal::new(50000, 0));
    assert_eq!(order.discount, Decimal::new(5000, 0));
    assert_eq!(order.total, Decimal::new(45000, 0));
    assert_eq!(order.notes, "Eshik oldida");
    assert!(order.coupon_id.is_some());

    let (quantity, unit_price): (i32, Decimal) = sqlx::query_as(
        "SELECT quantity, unit_price FROM order_items WHERE order_id = $1",
    )
    .bind(order.id)
    .fetch_one(&pool)
    .await
    .expect("order item");
    assert_eq!(quantity, 2);
    assert_eq!(unit_price, Decimal::new(25000, 0));

    assert_eq!(stock_of(&pool, &tea).await, 8);
    assert_eq!(used_count(&pool, "BAHOR10").await, 1);
    assert_eq!(cart.item_count().await.expect("count"), 0);

    let coupon_left: Option<i32> = sqlx::query_scalar("SELECT coupon_id FROM carts WHERE id = $1")
        .bind(cart.cart().id)
        .fetch_one(&pool)
        .await
        .expect("cart coupon");
    assert!(coupon_left.is_none());
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_checkout_insufficient_stock_changes_nothing(pool: PgPool) {
    let user_id = insert_user(&pool, "farrux").await;
    let address_id = insert_address(&pool, user_id).await;
    let tea = insert_product(&pool, "kok-choy", 10).await;
    let honey = insert_product(&pool, "asal", 1).await;
    insert_coupon(&pool, "BAHOR10", 7, None).await;

    let mut cart = CartManager::open(&pool, Some(user_id), None).await.expect("open cart");
    cart.add_product(&tea, 2).await.expect("add tea");
    cart.add_product(&honey, 3).await.expect("add honey");
    cart.apply_coupon("BAHOR10").await.expect("apply");

    let result = checkout_cart(&pool, cart.cart(), user_id, address_id, "").await;
    match result {
        Err(CheckoutError::InsufficientStock(name)) => assert_eq!(name, "asal"),
        other => panic!("expected insufficient stock, got {other:?}"),
    }

    assert_eq!(order_count(&pool).await, 0);
    assert_eq!(stock_of(&pool, &tea).await, 10);
    assert_eq!(stock_of(&pool, &honey).await, 1);
    assert_eq!(used_count(&pool, "BAHOR10").await, 0);
    assert_eq!(cart.item_count().await.expect("count"), 5);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_checkout_ignores_coupon_used_up_since_applied(pool: PgPool) {
    let user_id = insert_user(&pool, "gulnora").await;
    let address_id = insert_address(&pool, user_id).await;
    let tea = insert_product(&pool, "kok-choy", 10).await;
    insert_coupon(&pool, "BIRMARTA", 7, Some(1)).await;

    let mut cart = CartManager::open(&pool, Some(user_id), None).await.expect("open cart");
    cart.add_product(&tea, 1).await.expect("add");
    cart.apply_coupon("BIRMARTA").await.expect("apply").expect("redeemable");

    sqlx::query("UPDATE coupons SET used_count = 1 WHERE code = 'BIRMARTA'")
        .execute(&pool)
        .await
        .expect("use up coupon");

    let order = checkout_cart(&pool, cart.cart(), user_id, address_id, "")
        .await
        .expect("checkout");
    assert_eq!(order.discount, Decimal::ZERO);
    assert_eq!(order.total, Decimal::new(25000, 0));
    assert!(order.coupon_id.is_none());
    assert_eq!(used_count(&pool, "BIRMARTA").await, 1);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_concurrent_submits_of_one_cart_place_one_order(pool: PgPool) {
    let user_id = insert_user(&pool, "hamid").await;
    let address_id = insert_address(&pool, user_id).await;
    let tea = insert_product(&pool, "kok-choy", 10).await;
    insert_coupon(&pool, "BAHOR10", 7, None).await;

    let mut cart = CartManager::open(&pool, Some(user_id), None).await.expect("open cart");
    cart.add_product(&tea, 2).await.expect("add");
    cart.apply_coupon("BAHOR10").await.expect("apply");
    let snapshot = cart.cart().clone();

    // Hold the product row so both submits are in flight before either commits
    let mut holder = pool.begin().await.expect("begin");
    sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(tea.id)
        .execute(&mut *holder)
        .await
        .expect("lock product");

    let release = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        holder.commit().await.expect("release product");
    };
    let (first, second, ()) = tokio::join!(
        checkout_cart(&pool, &snapshot, user_id, address_id, ""),
        checkout_cart(&pool, &snapshot, user_id, address_id, ""),
        release,
    );

    let placed = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1, "first: {first:?}, second: {second:?}");
    assert!(
        [first, second]
            .into_iter()
            .any(|r| matches!(r, Err(CheckoutError::EmptyCart)))
    );

    assert_eq!(order_count(&pool).await, 1);
    assert_eq!(stock_of(&pool, &tea).await, 8);
    assert_eq!(used_count(&pool, "BAHOR10").await, 1);
}
