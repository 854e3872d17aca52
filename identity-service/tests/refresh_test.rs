mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::*;
use identity_service::config::IdentityConfig;
use identity_service::db::{
    DirectoryStore, GrantStore, MemoryStore, RotationOutcome, Store, StoreError, TokenStore,
};
use identity_service::models::{
    AuthorizationCode, Client, GrantStatus, ModuleDefinition, ModuleGrant, RefreshToken, Tenant,
    TenantStatus, User,
};
use service_core::identity::ModuleId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Memory store whose grant lookups can be switched off.
struct GrantOutage {
    inner: MemoryStore,
    down: Arc<AtomicBool>,
}

impl GrantOutage {
    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("grants offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for GrantOutage {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        self.inner.find_tenant(tenant_id).await
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.inner.find_user(user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        self.inner.find_client(client_id).await
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        self.inner.list_clients().await
    }
}

#[async_trait]
impl TokenStore for GrantOutage {
    async fn insert_authorization_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        self.inner.insert_authorization_code(code).await
    }

    async fn consume_authorization_code(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        self.inner.consume_authorization_code(code_hash).await
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        self.inner.insert_refresh_token(token).await
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, StoreError> {
        self.inner.find_refresh_token(token_hash).await
    }

    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        successor: RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, StoreError> {
        self.inner
            .rotate_refresh_token(presented_hash, successor, now)
            .await
    }

    async fn revoke_refresh_family(
        &self,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.inner.revoke_refresh_family(family_id, now).await
    }
}

#[async_trait]
impl GrantStore for GrantOutage {
    async fn list_modules(&self) -> Result<Vec<ModuleDefinition>, StoreError> {
        self.inner.list_modules().await
    }

    async fn list_grants(&self, tenant_id: Uuid) -> Result<Vec<ModuleGrant>, StoreError> {
        self.check()?;
        self.inner.list_grants(tenant_id).await
    }

    async fn find_grant(
        &self,
        tenant_id: Uuid,
        module_id: ModuleId,
    ) -> Result<Option<ModuleGrant>, StoreError> {
        self.check()?;
        self.inner.find_grant(tenant_id, module_id).await
    }
}

#[async_trait]
impl Store for GrantOutage {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn test_refresh_rotates_token() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap();

    let response = app.refresh(r0).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    let r1 = body["refresh_token"].as_str().unwrap();
    assert_ne!(r0, r1);
    app.verify(body["access_token"].as_str().unwrap(), "crm");
}

#[tokio::test]
async fn test_refresh_reuse_revokes_family() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap().to_string();

    let rotated = app.refresh(&r0).await.json();
    let r1 = rotated["refresh_token"].as_str().unwrap().to_string();

    let replay = app.refresh(&r0).await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(replay.json()["error"], "invalid_grant");

    // The legitimate successor went down with the family.
    let successor = app.refresh(&r1).await;
    assert_eq!(successor.status, StatusCode::BAD_REQUEST);
    assert_eq!(successor.json()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_concurrent_refresh_has_at_most_one_winner() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap().to_string();

    let (a, b) = tokio::join!(app.refresh(&r0), app.refresh(&r0));

    let winners: Vec<_> = [&a, &b]
        .into_iter()
        .filter(|r| r.status == StatusCode::OK)
        .collect();
    assert_eq!(winners.len(), 1);

    // The loser's replay revoked the family, including the winner's token.
    let r1 = winners[0].json()["refresh_token"].as_str().unwrap().to_string();
    assert_eq!(app.refresh(&r1).await.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.refresh(&r0).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_by_other_client_is_rejected() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap();

    let response = app
        .post_form(
            "/token",
            &[("grant_type", "refresh_token"), ("refresh_token", r0)],
            Some(&basic("hr", HR_SECRET)),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // Still usable by its own client.
    assert_eq!(app.refresh(r0).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_picks_up_license_changes() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap();

    app.store
        .set_grant_status(TestApp::acme_tenant(), ModuleId::Finance, GrantStatus::Expired)
        .unwrap();

    let body = app.refresh(r0).await.json();
    let claims = app.verify(body["access_token"].as_str().unwrap(), "crm");
    assert_eq!(claims.licensed_modules, vec![ModuleId::Crm]);
}

#[tokio::test]
async fn test_refresh_fails_for_suspended_tenant() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap();

    app.store
        .set_tenant_status(TestApp::acme_tenant(), TenantStatus::Suspended)
        .unwrap();

    let response = app.refresh(r0).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_revoke_kills_refresh_token() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap();
    let auth = basic("crm", CRM_SECRET);

    let revoked = app.post_form("/revoke", &[("token", r0)], Some(&auth)).await;
    assert_eq!(revoked.status, StatusCode::OK);

    assert_eq!(app.refresh(r0).await.status, StatusCode::BAD_REQUEST);

    let unknown = app
        .post_form("/revoke", &[("token", "never-issued")], Some(&auth))
        .await;
    assert_eq!(unknown.status, StatusCode::OK);

    let missing = app.post_form("/revoke", &[], Some(&auth)).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()["error"], "invalid_request");
}

#[tokio::test]
async fn test_revoke_ignores_other_clients_token() {
    let app = TestApp::new();
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap();

    let response = app
        .post_form("/revoke", &[("token", r0)], Some(&basic("hr", HR_SECRET)))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    assert_eq!(app.refresh(r0).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_failed_refresh_leaves_token_usable() {
    let down = Arc::new(AtomicBool::new(false));
    let switch = down.clone();
    let app = TestApp::with_backend(IdentityConfig::dev_defaults(ISSUER), move |store| {
        Arc::new(GrantOutage {
            inner: store.clone(),
            down: switch,
        })
    });
    let tokens = app.sign_in_to_crm().await;
    let r0 = tokens["refresh_token"].as_str().unwrap();

    down.store(true, Ordering::SeqCst);
    let failed = app.refresh(r0).await;
    assert!(failed.status.is_server_error(), "{}", failed.status);

    // Nothing was rotated, so the retry is not mistaken for reuse.
    down.store(false, Ordering::SeqCst);
    let retried = app.refresh(r0).await;
    assert_eq!(retried.status, StatusCode::OK, "{}", retried.text());
    app.verify(retried.json()["access_token"].as_str().unwrap(), "crm");
}
