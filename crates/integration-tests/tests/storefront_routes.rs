//! Storefront routes that answer without touching the database.

use axum::http::StatusCode;

use bozor_integration_tests::{body_text, get, location, send, storefront_app, unreachable_pool};

fn app(media: &tempfile::TempDir) -> axum::Router {
    storefront_app(unreachable_pool(), media.path())
}

#[tokio::test]
async fn test_health_is_ok() {
    let media = tempfile::tempdir().expect("temp dir");
    let response = send(&app(&media), get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let media = tempfile::tempdir().expect("temp dir");
    let response = send(&app(&media), get("/health/ready", None)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_account_requires_login() {
    let media = tempfile::tempdir().expect("temp dir");
    let response = send(&app(&media), get("/account/orders", None)).await;

    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "/login?next=%2Faccount%2Forders");
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let media = tempfile::tempdir().expect("temp dir");
    let response = send(&app(&media), get("/health", None)).await;
    let headers = response.headers();

    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["referrer-policy"], "same-origin");
    assert!(headers.contains_key("content-security-policy"));
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_media_files_are_served() {
    let media = tempfile::tempdir().expect("temp dir");
    std::fs::create_dir_all(media.path().join("products")).expect("mkdir");
    std::fs::write(media.path().join("products/tea.png"), b"png").expect("write");

    let response = send(&app(&media), get("/media/products/tea.png", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "png");

    let missing = send(&app(&media), get("/media/products/none.png", None)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
