use crate::config::TokenSettings;
use crate::db::{RotationOutcome, Store};
use crate::models::{AuthorizationCode, Client, RefreshToken, User};
use crate::services::error::TokenError;
use crate::services::jwt::TokenSigner;
use crate::services::metrics;
use crate::services::registry::StoreRegistry;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use service_core::identity::{AccessTokenClaims, CLAIMS_VERSION, Clock};
use service_core::utils::{generate_token, hash_secret};
use std::sync::Arc;
use uuid::Uuid;

/// Token endpoint response body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn Store>,
    signer: TokenSigner,
    registry: StoreRegistry,
    clock: Arc<dyn Clock>,
    settings: TokenSettings,
}

impl TokenService {
    pub fn new(
        store: Arc<dyn Store>,
        signer: TokenSigner,
        registry: StoreRegistry,
        clock: Arc<dyn Clock>,
        settings: TokenSettings,
    ) -> Self {
        Self {
            store,
            signer,
            registry,
            clock,
            settings,
        }
    }

    /// Mint a single-use code bound to (client, redirect_uri, user, tenant).
    /// The caller has already checked the redirect URI against the client.
    pub async fn issue_authorization_code(
        &self,
        client: &Client,
        redirect_uri: &str,
        user: &User,
    ) -> Result<String, TokenError> {
        let now = self.clock.now();
        let code = generate_token();

        self.store
            .insert_authorization_code(AuthorizationCode {
                code_hash: hash_secret(&code),
                client_id: client.client_id.clone(),
                redirect_uri: redirect_uri.to_string(),
                user_id: user.user_id,
                tenant_id: user.tenant_id,
                expires_utc: now + Duration::seconds(self.settings.authorization_code_ttl_seconds),
                created_utc: now,
            })
            .await?;

        tracing::info!(
            client_id = %client.client_id,
            user_id = %user.user_id,
            tenant_id = %user.tenant_id,
            "Authorization code issued"
        );
        Ok(code)
    }

    /// `authorization_code` grant. The code is consumed before any check so a
    /// failed attempt still burns it.
    pub async fn exchange_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, TokenError> {
        let now = self.clock.now();

        let Some(record) = self
            .store
            .consume_authorization_code(&hash_secret(code))
            .await?
        else {
            tracing::warn!(client_id = %client.client_id, "Unknown or already used authorization code");
            return Err(TokenError::InvalidGrant("authorization code is invalid or already used"));
        };

        if record.is_expired_at(now) {
            return Err(TokenError::InvalidGrant("authorization code expired"));
        }
        if record.client_id != client.client_id {
            tracing::warn!(
                client_id = %client.client_id,
                issued_to = %record.client_id,
                "Authorization code presented by a different client"
            );
            return Err(TokenError::InvalidGrant("authorization code was issued to another client"));
        }
        if record.redirect_uri != redirect_uri {
            return Err(TokenError::InvalidGrant("redirect_uri does not match the authorization request"));
        }

        let user = self.load_subject(record.user_id, record.tenant_id).await?;
        let family_id = Uuid::new_v4();
        let (refresh_token, refresh_record) =
            self.new_refresh_token(client, &user, family_id, now);
        self.store.insert_refresh_token(refresh_record).await?;

        let response = self.build_response(client, &user, refresh_token, now).await?;
        metrics::record_token_issued("authorization_code");
        tracing::info!(
            client_id = %client.client_id,
            user_id = %user.user_id,
            tenant_id = %user.tenant_id,
            family_id = %family_id,
            "Authorization code exchanged"
        );
        Ok(response)
    }

    /// `refresh_token` grant with rotation and reuse detection.
    pub async fn refresh(
        &self,
        client: &Client,
        presented: &str,
    ) -> Result<TokenResponse, TokenError> {
        let now = self.clock.now();
        let presented_hash = hash_secret(presented);

        let Some(current) = self.store.find_refresh_token(&presented_hash).await? else {
            return Err(TokenError::InvalidGrant("refresh token is invalid"));
        };

        if current.client_id != client.client_id {
            tracing::warn!(
                client_id = %client.client_id,
                issued_to = %current.client_id,
                family_id = %current.family_id,
                "Refresh token presented by a different client"
            );
            return Err(TokenError::InvalidGrant("refresh token was issued to another client"));
        }

        if current.is_dead() {
            return Err(self.contain_reuse(current.family_id, now).await);
        }
        if current.expires_utc <= now {
            return Err(TokenError::InvalidGrant("refresh token expired"));
        }

        let user = match self.load_subject(current.user_id, current.tenant_id).await {
            Ok(user) => user,
            Err(err) => {
                self.store
                    .revoke_refresh_family(current.family_id, now)
                    .await?;
                return Err(err);
            }
        };

        let (refresh_token, successor) =
            self.new_refresh_token(client, &user, current.family_id, now);
        // Rotation is the commit point; nothing after it may fail.
        let response = self.build_response(client, &user, refresh_token, now).await?;

        match self
            .store
            .rotate_refresh_token(&presented_hash, successor, now)
            .await?
        {
            RotationOutcome::Rotated { .. } => {}
            // Lost a race against another rotation of the same token.
            RotationOutcome::Dead { previous } => {
                return Err(self.contain_reuse(previous.family_id, now).await);
            }
            RotationOutcome::Expired { .. } => {
                return Err(TokenError::InvalidGrant("refresh token expired"));
            }
            RotationOutcome::Missing => {
                return Err(TokenError::InvalidGrant("refresh token is invalid"));
            }
        }

        metrics::record_token_issued("refresh_token");
        tracing::info!(
            client_id = %client.client_id,
            user_id = %user.user_id,
            family_id = %current.family_id,
            "Refresh token rotated"
        );
        Ok(response)
    }

    /// Revoke the whole family of a refresh token. Unknown tokens and tokens
    /// belonging to other clients are ignored.
    pub async fn revoke(&self, client: &Client, presented: &str) -> Result<(), TokenError> {
        let Some(current) = self
            .store
            .find_refresh_token(&hash_secret(presented))
            .await?
        else {
            return Ok(());
        };

        if current.client_id != client.client_id {
            tracing::warn!(
                client_id = %client.client_id,
                family_id = %current.family_id,
                "Ignoring revocation of another client's token"
            );
            return Ok(());
        }

        let revoked = self
            .store
            .revoke_refresh_family(current.family_id, self.clock.now())
            .await?;
        tracing::info!(
            client_id = %client.client_id,
            family_id = %current.family_id,
            revoked,
            "Refresh token family revoked"
        );
        Ok(())
    }

    async fn contain_reuse(&self, family_id: Uuid, now: DateTime<Utc>) -> TokenError {
        match self.store.revoke_refresh_family(family_id, now).await {
            Ok(revoked) => {
                metrics::record_refresh_reuse();
                tracing::warn!(
                    family_id = %family_id,
                    revoked,
                    "Refresh token reuse detected, family revoked"
                );
                TokenError::RefreshTheftSuspected { family_id }
            }
            Err(e) => {
                tracing::error!(family_id = %family_id, error = %e, "Failed to revoke token family");
                TokenError::Store(e)
            }
        }
    }

    async fn load_subject(&self, user_id: Uuid, tenant_id: Uuid) -> Result<User, TokenError> {
        let tenant = self
            .store
            .find_tenant(tenant_id)
            .await?
            .ok_or(TokenError::InvalidGrant("tenant no longer exists"))?;
        if !tenant.is_active() {
            return Err(TokenError::TenantSuspended);
        }

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(TokenError::InvalidGrant("user no longer exists"))?;
        if !user.enabled || user.tenant_id != tenant_id {
            return Err(TokenError::UserDisabled);
        }
        Ok(user)
    }

    fn new_refresh_token(
        &self,
        client: &Client,
        user: &User,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> (String, RefreshToken) {
        let token = generate_token();
        let record = RefreshToken {
            token_id: Uuid::new_v4(),
            token_hash: hash_secret(&token),
            family_id,
            client_id: client.client_id.clone(),
            user_id: user.user_id,
            tenant_id: user.tenant_id,
            expires_utc: now + Duration::days(self.settings.refresh_token_ttl_days),
            created_utc: now,
            rotated_utc: None,
            revoked_utc: None,
        };
        (token, record)
    }

    async fn build_response(
        &self,
        client: &Client,
        user: &User,
        refresh_token: String,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, TokenError> {
        let licensed_modules = self.registry.licensed_modules(user.tenant_id).await?;
        let ttl = self.settings.access_token_ttl_seconds;

        let claims = AccessTokenClaims {
            ver: CLAIMS_VERSION,
            iss: self.signer.issuer().to_string(),
            aud: client.client_id.clone(),
            sub: user.user_id,
            email: user.email.clone(),
            tenant_id: user.tenant_id,
            licensed_modules,
            roles: user.roles.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl,
            jti: Uuid::new_v4(),
        };

        let access_token = self
            .signer
            .sign_access_token(&claims)
            .map_err(TokenError::Signing)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: ttl,
            refresh_token,
        })
    }
}
