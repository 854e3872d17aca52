mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::*;
use identity_service::config::IdentityConfig;
use service_core::identity::{CLAIMS_VERSION, ModuleId};

#[tokio::test]
async fn test_code_exchange_issues_tenant_scoped_tokens() {
    let app = TestApp::new();
    let session = app.login(ANA_EMAIL, PASSWORD).await;
    let code = app.authorize(&session, "crm", CRM_REDIRECT).await;

    let response = app.exchange(&code).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["cache-control"], "no-store");
    let body = response.json();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert!(body["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));

    let claims = app.verify(body["access_token"].as_str().unwrap(), "crm");
    assert_eq!(claims.ver, CLAIMS_VERSION);
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.aud, "crm");
    assert_eq!(claims.sub.to_string(), ANA_USER);
    assert_eq!(claims.tenant_id, TestApp::acme_tenant());
    assert_eq!(claims.email, ANA_EMAIL);
    assert_eq!(claims.licensed_modules, vec![ModuleId::Crm, ModuleId::Finance]);
    assert_eq!(claims.exp - claims.iat, 900);
}

#[tokio::test]
async fn test_access_token_is_bound_to_its_audience() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let access_token = tokens["access_token"].as_str().unwrap();

    assert!(
        app.state
            .signer
            .verifier()
            .verify_access_token(access_token, Some("hr"))
            .is_err()
    );
}

#[tokio::test]
async fn test_code_is_single_use() {
    let app = TestApp::new();
    let session = app.login(ANA_EMAIL, PASSWORD).await;
    let code = app.authorize(&session, "crm", CRM_REDIRECT).await;

    assert_eq!(app.exchange(&code).await.status, StatusCode::OK);

    let replay = app.exchange(&code).await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(replay.json()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_concurrent_code_exchange_has_one_winner() {
    let app = TestApp::new();
    let session = app.login(ANA_EMAIL, PASSWORD).await;
    let code = app.authorize(&session, "crm", CRM_REDIRECT).await;

    let (a, b) = tokio::join!(app.exchange(&code), app.exchange(&code));

    let successes = [a.status, b.status]
        .iter()
        .filter(|s| **s == StatusCode::OK)
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let app = TestApp::new();
    let session = app.login(ANA_EMAIL, PASSWORD).await;
    let code = app.authorize(&session, "crm", CRM_REDIRECT).await;

    app.clock.advance(Duration::seconds(61));

    let response = app.exchange(&code).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_code_bound_to_redirect_uri_and_client() {
    let app = TestApp::new();
    let session = app.login(ANA_EMAIL, PASSWORD).await;

    let code = app.authorize(&session, "crm", CRM_REDIRECT).await;
    let wrong_redirect = app
        .post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", "http://localhost:8101/other"),
            ],
            Some(&basic("crm", CRM_SECRET)),
        )
        .await;
    assert_eq!(wrong_redirect.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_redirect.json()["error"], "invalid_grant");

    let code = app.authorize(&session, "crm", CRM_REDIRECT).await;
    let wrong_client = app
        .post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", CRM_REDIRECT),
            ],
            Some(&basic("hr", HR_SECRET)),
        )
        .await;
    assert_eq!(wrong_client.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_client.json()["error"], "invalid_grant");

    // The failed attempt burned the code.
    assert_eq!(app.exchange(&code).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_client_authentication_failures() {
    let app = TestApp::new();
    let form = [("grant_type", "authorization_code"), ("code", "x"), ("redirect_uri", CRM_REDIRECT)];

    let bad_secret = app
        .post_form("/token", &form, Some(&basic("crm", "wrong")))
        .await;
    assert_eq!(bad_secret.status, StatusCode::UNAUTHORIZED);
    assert_eq!(bad_secret.json()["error"], "invalid_client");
    assert!(bad_secret.headers.contains_key("www-authenticate"));

    let anonymous = app.post_form("/token", &form, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let form_auth = app
        .post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", "x"),
                ("redirect_uri", CRM_REDIRECT),
                ("client_id", "crm"),
                ("client_secret", CRM_SECRET),
            ],
            None,
        )
        .await;
    assert_eq!(form_auth.status, StatusCode::BAD_REQUEST);
    assert_eq!(form_auth.json()["error"], "invalid_grant");

    let both = app
        .post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_secret", CRM_SECRET),
            ],
            Some(&basic("crm", CRM_SECRET)),
        )
        .await;
    assert_eq!(both.status, StatusCode::BAD_REQUEST);
    assert_eq!(both.json()["error"], "invalid_request");
}

#[tokio::test]
async fn test_grant_type_validation() {
    let app = TestApp::new();
    let auth = basic("crm", CRM_SECRET);

    let missing = app.post_form("/token", &[], Some(&auth)).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()["error"], "invalid_request");

    let password = app
        .post_form("/token", &[("grant_type", "password")], Some(&auth))
        .await;
    assert_eq!(password.status, StatusCode::BAD_REQUEST);
    assert_eq!(password.json()["error"], "unsupported_grant_type");

    let no_code = app
        .post_form("/token", &[("grant_type", "authorization_code")], Some(&auth))
        .await;
    assert_eq!(no_code.json()["error"], "invalid_request");
}

#[tokio::test]
async fn test_token_budget_is_per_client_not_per_address() {
    let mut config = IdentityConfig::dev_defaults(ISSUER);
    config.rate_limit.token_attempts = 3;
    let app = TestApp::with_config(config);

    let bogus_code = |client: &str, secret: &str, redirect: &str| {
        let body = serde_urlencoded::to_string([
            ("grant_type", "authorization_code"),
            ("code", "never-issued"),
            ("redirect_uri", redirect),
        ])
        .unwrap();
        axum::http::Request::builder()
            .method("POST")
            .uri("/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("authorization", basic(client, secret))
            .body(axum::body::Body::from(body))
            .unwrap()
    };

    // Both modules' gateways run behind the same address.
    let mut crm = Vec::new();
    for _ in 0..4 {
        let response = app
            .send_from("10.0.0.5", bogus_code("crm", CRM_SECRET, CRM_REDIRECT))
            .await;
        crm.push(response.status);
    }
    assert_eq!(
        crm,
        [
            StatusCode::BAD_REQUEST,
            StatusCode::BAD_REQUEST,
            StatusCode::BAD_REQUEST,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );

    let hr = app
        .send_from("10.0.0.5", bogus_code("hr", HR_SECRET, HR_REDIRECT))
        .await;
    assert_eq!(hr.status, StatusCode::BAD_REQUEST);
    assert_eq!(hr.json()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_throttled_client_gets_retry_after() {
    let mut config = IdentityConfig::dev_defaults(ISSUER);
    config.rate_limit.token_attempts = 1;
    let app = TestApp::with_config(config);

    app.refresh("not-a-refresh-token").await;
    let throttled = app.refresh("not-a-refresh-token").await;

    assert_eq!(throttled.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(throttled.headers.contains_key("retry-after"));
    assert_eq!(throttled.json()["error"], "too_many_requests");
}
