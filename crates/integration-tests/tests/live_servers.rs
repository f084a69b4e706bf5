//! Smoke tests against running servers.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (bozor-cli migrate)
//! - The storefront running (cargo run -p bozor-storefront)
//! - The dashboard running (cargo run -p bozor-dashboard)
//!
//! Run with: cargo test -p bozor-integration-tests --test live_servers -- --ignored

use reqwest::{Client, StatusCode, redirect::Policy};

fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

fn dashboard_base_url() -> String {
    std::env::var("DASHBOARD_BASE_URL").unwrap_or_else(|_| "http://localhost:3001".to_string())
}

/// Client that keeps cookies and reports redirects instead of following them.
fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

#[tokio::test]
#[ignore = "Requires running storefront and dashboard servers"]
async fn test_both_servers_ready() {
    let client = client();
    for base_url in [storefront_base_url(), dashboard_base_url()] {
        let resp = client
            .get(format!("{base_url}/health/ready"))
            .send()
            .await
            .expect("Failed to reach server");
        assert_eq!(resp.status(), StatusCode::OK, "{base_url}");
    }
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_storefront_public_pages() {
    let client = client();
    let base_url = storefront_base_url();

    for path in ["/", "/catalog", "/cart", "/login", "/register"] {
        let resp = client
            .get(format!("{base_url}{path}"))
            .send()
            .await
            .expect("Failed to get page");
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_storefront_checkout_needs_login() {
    let client = client();
    let base_url = storefront_base_url();

    let resp = client
        .get(format!("{base_url}/checkout"))
        .send()
        .await
        .expect("Failed to get checkout");

    assert!(resp.status().is_redirection());
    let location = resp
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(location.starts_with("/login"));
}

#[tokio::test]
#[ignore = "Requires running dashboard server"]
async fn test_dashboard_requires_staff_session() {
    let client = client();
    let base_url = dashboard_base_url();

    let resp = client
        .get(format!("{base_url}/orders"))
        .send()
        .await
        .expect("Failed to get orders");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let resp = client
        .get(format!("{base_url}/login"))
        .send()
        .await
        .expect("Failed to get login page");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("name=\"username\""));
}
