//! Dashboard flows against a migrated database.
//!
//! These tests require a `PostgreSQL` server reachable through
//! `DATABASE_URL`; sqlx creates and migrates a scratch database per test.
//!
//! Run with: cargo test -p bozor-integration-tests -- --ignored

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bozor_integration_tests::{
    body_text, dashboard_app, get, location, post_form, send, session_cookie,
};
use bozor_storefront::services::auth::hash_password;

const PASSWORD: &str = "choyxona-42";

async fn insert_user(pool: &PgPool, username: &str, is_staff: bool) -> i32 {
    let hash = hash_password(PASSWORD).expect("hash");
    sqlx::query_scalar(
        "INSERT INTO users (username, email, password_hash, is_staff) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(hash)
    .bind(is_staff)
    .fetch_one(pool)
    .await
    .expect("insert user")
}

async fn insert_category(pool: &PgPool, name: &str, slug: &str) -> i32 {
    sqlx::query_scalar("INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(slug)
        .fetch_one(pool)
        .await
        .expect("insert category")
}

async fn insert_product(pool: &PgPool, category_id: i32, name: &str, slug: &str) -> i32 {
    sqlx::query_scalar(
        "INSERT INTO products (category_id, name, slug, price, stock) \
         VALUES ($1, $2, $3, 25000, 3) RETURNING id",
    )
    .bind(category_id)
    .bind(name)
    .bind(slug)
    .fetch_one(pool)
    .await
    .expect("insert product")
}

/// An order for `user_id` with one line of `product_id`.
async fn insert_order(pool: &PgPool, user_id: i32, product_id: i32) -> i32 {
    let address_id: i32 = sqlx::query_scalar(
        "INSERT INTO addresses (user_id, full_name, phone, line1, city) \
         VALUES ($1, 'Aziza Karimova', '+998901234567', 'Amir Temur 1', 'Toshkent') RETURNING id",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .expect("insert address");

    let order_id: i32 = sqlx::query_scalar(
        "INSERT INTO orders (user_id, status, subtotal, total, shipping_address_id) \
         VALUES ($1, 'paid', 50000, 50000, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(address_id)
    .fetch_one(pool)
    .await
    .expect("insert order");

    sqlx::query(
        "INSERT INTO order_items (order_id, product_id, quantity, unit_price) \
         VALUES ($1, $2, 2, 25000)",
    )
    .bind(order_id)
    .bind(product_id)
    .execute(pool)
    .await
    .expect("insert order item");

    order_id
}

/// Log `username` in and return the session cookie.
async fn login(app: &Router, username: &str) -> String {
    let response = send(
        app,
        post_form(
            "/login",
            &format!("username={username}&password={PASSWORD}&next=%2F"),
            None,
        ),
    )
    .await;
    assert!(response.status().is_redirection(), "login should redirect");
    assert_eq!(location(&response), "/");
    session_cookie(&response).expect("session cookie")
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_staff_login_then_overview(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    insert_user(&pool, "aziza", true).await;
    let app = dashboard_app(pool, media.path());

    let cookie = login(&app, "aziza").await;
    assert!(cookie.starts_with("bozor_dashboard_session="));

    let response = send(&app, get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Overview"));
    assert!(body.contains("Revenue"));

    // A logged-in visit to the login page skips ahead
    let response = send(&app, get("/login?next=%2Fusers", Some(&cookie))).await;
    assert_eq!(location(&response), "/users");
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_customer_cannot_log_in(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    insert_user(&pool, "customer", false).await;
    let app = dashboard_app(pool, media.path());

    let response = send(
        &app,
        post_form("/login", &format!("username=customer&password={PASSWORD}"), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("staff account"));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_deactivated_staff_is_sent_back_to_login(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    let id = insert_user(&pool, "aziza", true).await;
    let app = dashboard_app(pool.clone(), media.path());
    let cookie = login(&app, "aziza").await;

    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .expect("deactivate");

    let response = send(&app, get("/orders", Some(&cookie))).await;
    assert_eq!(location(&response), "/login?next=%2Forders");
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_user_search_and_self_delete(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    let staff_id = insert_user(&pool, "aziza", true).await;
    insert_user(&pool, "bekzod", false).await;
    let app = dashboard_app(pool, media.path());
    let cookie = login(&app, "aziza").await;

    let body = body_text(send(&app, get("/users?q=bek", Some(&cookie))).await).await;
    assert!(body.contains("bekzod"));

    let response = send(
        &app,
        post_form(&format!("/users/{staff_id}/delete"), "", Some(&cookie)),
    )
    .await;
    assert!(location(&response).contains("error=cannot_delete_self"));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_category_with_products_is_not_deleted(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    insert_user(&pool, "aziza", true).await;
    let category_id = insert_category(&pool, "Tea", "tea").await;
    insert_product(&pool, category_id, "Green tea", "green-tea").await;
    let app = dashboard_app(pool.clone(), media.path());
    let cookie = login(&app, "aziza").await;

    let response = send(
        &app,
        post_form(&format!("/categories/{category_id}/delete"), "", Some(&cookie)),
    )
    .await;
    assert_eq!(
        location(&response),
        "/categories?error=category_in_use&detail=Tea"
    );

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(remaining, 1);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_category_slug_gets_suffix(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    insert_user(&pool, "aziza", true).await;
    insert_category(&pool, "Choy", "choy-qahva").await;
    let app = dashboard_app(pool.clone(), media.path());
    let cookie = login(&app, "aziza").await;

    let response = send(
        &app,
        post_form(
            "/categories/create",
            "name=Choy+%26+Qahva&parent=&description=&is_active=on",
            Some(&cookie),
        ),
    )
    .await;
    assert!(location(&response).starts_with("/categories?success=category_created"));

    let slug: String = sqlx::query_scalar("SELECT slug FROM categories WHERE name = 'Choy & Qahva'")
        .fetch_one(&pool)
        .await
        .expect("slug");
    assert_eq!(slug, "choy-qahva-2");
}

fn multipart_product(boundary: &str, fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"main_image\"; \
                 filename=\"tea.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

fn post_multipart(uri: &str, body: Vec<u8>, boundary: &str, cookie: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .header("cookie", cookie)
        .body(Body::from(body))
        .expect("valid request")
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_product_create_with_image_then_clear(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    insert_user(&pool, "aziza", true).await;
    let category_id = insert_category(&pool, "Tea", "tea").await;
    let app = dashboard_app(pool.clone(), media.path());
    let cookie = login(&app, "aziza").await;
    let boundary = "bozor-test-boundary";
    let category = category_id.to_string();

    let body = multipart_product(
        boundary,
        &[
            ("name", "Green tea"),
            ("category", &category),
            ("price", "25000.50"),
            ("stock", "7"),
            ("is_active", "on"),
        ],
        Some(b"\x89PNG fake image"),
    );
    let response = send(&app, post_multipart("/products/create", body, boundary, &cookie)).await;
    assert!(location(&response).starts_with("/products?success=product_created"));

    let (product_id, price): (i32, Decimal) =
        sqlx::query_as("SELECT id, price FROM products WHERE slug = 'green-tea'")
            .fetch_one(&pool)
            .await
            .expect("product");
    assert_eq!(price, Decimal::new(2_500_050, 2));

    let image: String = sqlx::query_scalar(
        "SELECT image FROM product_images WHERE product_id = $1 AND is_default",
    )
    .bind(product_id)
    .fetch_one(&pool)
    .await
    .expect("main image");
    assert!(image.starts_with("products/") && image.ends_with(".png"));
    assert!(media.path().join(&image).exists());

    let body = multipart_product(
        boundary,
        &[
            ("name", "Green tea"),
            ("category", &category),
            ("price", "24000"),
            ("stock", "7"),
            ("is_active", "on"),
            ("clear_main_image", "on"),
        ],
        None,
    );
    let response = send(
        &app,
        post_multipart(&format!("/products/{product_id}/update"), body, boundary, &cookie),
    )
    .await;
    assert!(location(&response).starts_with("/products?success=product_updated"));

    let images: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM product_images WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(images, 0);
    assert!(!media.path().join(&image).exists());
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_product_form_rejects_bad_values(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    insert_user(&pool, "aziza", true).await;
    let category_id = insert_category(&pool, "Tea", "tea").await;
    let app = dashboard_app(pool.clone(), media.path());
    let cookie = login(&app, "aziza").await;
    let boundary = "bozor-test-boundary";
    let category = category_id.to_string();

    let body = multipart_product(
        boundary,
        &[("name", "Green tea"), ("category", &category), ("price", "-5"), ("stock", "1")],
        None,
    );
    let response = send(&app, post_multipart("/products/create", body, boundary, &cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("greater than or equal to 0"));
    let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(products, 0);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_ordered_product_is_not_deleted(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    let staff_id = insert_user(&pool, "aziza", true).await;
    let category_id = insert_category(&pool, "Tea", "tea").await;
    let product_id = insert_product(&pool, category_id, "Green tea", "green-tea").await;
    insert_order(&pool, staff_id, product_id).await;
    let app = dashboard_app(pool, media.path());
    let cookie = login(&app, "aziza").await;

    let response = send(
        &app,
        post_form(&format!("/products/{product_id}/delete"), "", Some(&cookie)),
    )
    .await;
    assert!(location(&response).starts_with("/products?error=product_in_use"));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_order_status_update(pool: PgPool) {
    let media = tempfile::tempdir().expect("temp dir");
    let staff_id = insert_user(&pool, "aziza", true).await;
    let category_id = insert_category(&pool, "Tea", "tea").await;
    let product_id = insert_product(&pool, category_id, "Green tea", "green-tea").await;
    let order_id = insert_order(&pool, staff_id, product_id).await;
    let app = dashboard_app(pool.clone(), media.path());
    let cookie = login(&app, "aziza").await;

    let body = body_text(send(&app, get(&format!("/orders/{order_id}"), Some(&cookie))).await).await;
    assert!(body.contains("Green tea"));
    assert!(body.contains("Amir Temur 1"));

    let response = send(
        &app,
        post_form(
            &format!("/orders/{order_id}"),
            "status=shipped&notes=Sent+with+BTS",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(
        location(&response),
        format!("/orders/{order_id}?success=order_updated")
    );

    let (status, notes): (String, String) =
        sqlx::query_as("SELECT status::text, notes FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(&pool)
            .await
            .expect("order");
    assert_eq!(status, "shipped");
    assert_eq!(notes, "Sent with BTS");

    let response = send(
        &app,
        post_form(&format!("/orders/{order_id}"), "status=lost", Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Select a valid choice"));

    let list = body_text(send(&app, get("/orders?status=shipped", Some(&cookie))).await).await;
    assert!(list.contains(&format!("#{order_id}")));
}
