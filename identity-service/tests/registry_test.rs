mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::*;
use identity_service::models::TenantStatus;

async fn registry_get(app: &TestApp, uri: &str, authorization: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().uri(uri);
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }
    app.send(builder.body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_license_check() {
    let app = TestApp::new();
    let auth = basic("hr", HR_SECRET);

    let crm = registry_get(
        &app,
        &format!("/registry/tenants/{}/modules/crm", ACME_TENANT),
        Some(&auth),
    )
    .await;
    assert_eq!(crm.status, StatusCode::OK);
    assert_eq!(crm.json()["licensed"], true);

    let hr = registry_get(
        &app,
        &format!("/registry/tenants/{}/modules/hr", ACME_TENANT),
        Some(&auth),
    )
    .await;
    assert_eq!(hr.status, StatusCode::OK);
    assert_eq!(hr.json()["licensed"], false);
    assert_eq!(hr.json()["module_id"], "hr");
}

#[tokio::test]
async fn test_suspended_tenant_has_no_licenses() {
    let app = TestApp::new();
    app.store
        .set_tenant_status(TestApp::acme_tenant(), TenantStatus::Suspended)
        .unwrap();

    let response = registry_get(
        &app,
        &format!("/registry/tenants/{}/modules/crm", ACME_TENANT),
        Some(&basic("crm", CRM_SECRET)),
    )
    .await;
    assert_eq!(response.json()["licensed"], false);
}

#[tokio::test]
async fn test_license_check_errors() {
    let app = TestApp::new();
    let uri = format!("/registry/tenants/{}/modules/crm", ACME_TENANT);

    let anonymous = registry_get(&app, &uri, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let unknown_module = registry_get(
        &app,
        &format!("/registry/tenants/{}/modules/payroll", ACME_TENANT),
        Some(&basic("crm", CRM_SECRET)),
    )
    .await;
    assert_eq!(unknown_module.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_modules() {
    let app = TestApp::new();

    let response = registry_get(&app, "/registry/modules", Some(&basic("crm", CRM_SECRET))).await;

    assert_eq!(response.status, StatusCode::OK);
    let modules = response.json();
    let ids: Vec<&str> = modules
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["module_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 6);
    assert!(ids.contains(&"ai_chat"));
}
