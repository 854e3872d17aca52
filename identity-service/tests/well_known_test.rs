mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn test_jwks_is_public_and_cacheable() {
    let app = TestApp::new();

    let response = app.get("/.well-known/jwks.json", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["cache-control"], "public, max-age=300");
    let body = response.json();
    let key = &body["keys"][0];
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["use"], "sig");
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["kid"], "test-key");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::new();

    let health = app.get("/health", None).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.json()["status"], "ok");

    // No recorder is installed in tests.
    let metrics = app.get("/metrics", None).await;
    assert_eq!(metrics.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = TestApp::new();

    let response = app
        .send(
            axum::http::Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.headers["x-request-id"], "req-123");
}
