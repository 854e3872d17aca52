use crate::error::IssuerError;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::identity::ModuleId;
use service_core::observability::TracedClientExt;
use std::time::Duration;
use uuid::Uuid;

/// Token pair returned by the issuer's `/token` endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Back-channel operations the gateway needs from the issuer.
#[async_trait]
pub trait IssuerApi: Send + Sync + 'static {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, IssuerError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IssuerError>;

    async fn revoke(&self, refresh_token: &str) -> Result<(), IssuerError>;

    async fn check_license(&self, tenant_id: Uuid, module: ModuleId) -> Result<bool, IssuerError>;
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct LicenseCheck {
    licensed: bool,
}

/// `IssuerApi` over HTTP, authenticated as this module's OAuth client.
pub struct HttpIssuerClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: Secret<String>,
}

impl HttpIssuerClient {
    pub fn new(
        base_url: &str,
        client_id: &str,
        client_secret: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<reqwest::Response, IssuerError> {
        self.client
            .traced_post(&self.url(path))
            .basic_auth(&self.client_id, self.client_secret.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(transport_error)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, IssuerError> {
        let response = self.post_form("/token", form).await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<TokenSet>()
                .await
                .map_err(|e| IssuerError::Unavailable(format!("malformed token response: {}", e)));
        }

        Err(rejection(status, response).await)
    }
}

fn transport_error(err: reqwest::Error) -> IssuerError {
    if err.is_timeout() {
        IssuerError::Timeout
    } else {
        IssuerError::Unavailable(err.to_string())
    }
}

async fn rejection(status: reqwest::StatusCode, response: reqwest::Response) -> IssuerError {
    // Throttling says nothing about the credential that was presented.
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return IssuerError::Unavailable(format!("issuer returned {}", status));
    }
    let error = response
        .json::<OAuthErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| "unknown_error".to_string());
    IssuerError::Rejected {
        status: status.as_u16(),
        error,
    }
}

#[async_trait]
impl IssuerApi for HttpIssuerClient {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, IssuerError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IssuerError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), IssuerError> {
        let response = self
            .post_form(
                "/revoke",
                &[("token", refresh_token), ("token_type_hint", "refresh_token")],
            )
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(rejection(status, response).await)
        }
    }

    async fn check_license(&self, tenant_id: Uuid, module: ModuleId) -> Result<bool, IssuerError> {
        let url = self.url(&format!("/registry/tenants/{}/modules/{}", tenant_id, module));
        let response = self
            .client
            .traced_get(&url)
            .basic_auth(&self.client_id, self.client_secret.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<LicenseCheck>()
                .await
                .map(|body| body.licensed)
                .map_err(|e| IssuerError::Unavailable(format!("malformed registry response: {}", e)));
        }

        Err(rejection(status, response).await)
    }
}
