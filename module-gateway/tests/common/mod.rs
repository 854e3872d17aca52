//! Test harness for a module gateway: the real router in front of a scripted
//! issuer, driven with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use module_gateway::{
    GatewayState, build_router,
    config::GatewayConfig,
    error::IssuerError,
    services::{IssuerApi, TokenSet},
};
use service_core::identity::{AccessTokenClaims, CLAIMS_VERSION, ManualClock, ModuleId, TokenVerifier};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

pub const ISSUER: &str = "http://issuer.test";
pub const MODULE_URL: &str = "http://crm.test";
const PRIVATE_KEY: &str = include_str!("../../../fixtures/dev-signing-key.pem");
const PUBLIC_KEY: &str = include_str!("../../../fixtures/dev-signing-key.pub.pem");

pub const GOOD_CODE: &str = "good-code";
pub const ANA_EMAIL: &str = "ana@acme.test";

pub fn acme_tenant() -> Uuid {
    "8d3c1f52-5b6e-4d0a-9a57-1f2f4b0e7a01".parse().unwrap()
}

pub fn ana() -> Uuid {
    "5f1e9c3a-7d2b-4a6e-8c0f-3b9d2e1a4c11".parse().unwrap()
}

/// Claims the scripted issuer puts in tokens for ana at `audience`.
pub fn claims_for(audience: ModuleId, licensed_modules: Vec<ModuleId>, ttl: i64) -> AccessTokenClaims {
    let now = chrono::Utc::now().timestamp();
    AccessTokenClaims {
        ver: CLAIMS_VERSION,
        iss: ISSUER.to_string(),
        aud: audience.as_str().to_string(),
        sub: ana(),
        email: ANA_EMAIL.to_string(),
        tenant_id: acme_tenant(),
        licensed_modules,
        roles: vec!["admin".to_string()],
        iat: now,
        exp: now + ttl,
        jti: Uuid::new_v4(),
    }
}

pub fn sign(claims: &AccessTokenClaims) -> String {
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

/// In-process stand-in for the issuer's back channel.
pub struct MockIssuer {
    module: ModuleId,
    /// Snapshot placed in newly minted access tokens.
    pub snapshot: Mutex<Vec<ModuleId>>,
    /// Modules the registry endpoint reports as licensed.
    pub registry_grants: Mutex<HashSet<ModuleId>>,
    pub registry_down: AtomicBool,
    pub token_endpoint_down: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
    codes: Mutex<HashSet<String>>,
    live_refresh_tokens: Mutex<HashSet<String>>,
    pub revoked: Mutex<Vec<String>>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub license_calls: AtomicUsize,
}

impl MockIssuer {
    pub fn new(module: ModuleId, snapshot: Vec<ModuleId>) -> Self {
        Self {
            module,
            registry_grants: Mutex::new(snapshot.iter().copied().collect()),
            snapshot: Mutex::new(snapshot),
            registry_down: AtomicBool::new(false),
            token_endpoint_down: AtomicBool::new(false),
            delay: Mutex::new(None),
            codes: Mutex::new(HashSet::from([GOOD_CODE.to_string()])),
            live_refresh_tokens: Mutex::new(HashSet::new()),
            revoked: Mutex::new(Vec::new()),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            license_calls: AtomicUsize::new(0),
        }
    }

    pub fn grant(&self, module: ModuleId) {
        self.registry_grants.lock().unwrap().insert(module);
    }

    pub fn revoke_grant(&self, module: ModuleId) {
        self.registry_grants.lock().unwrap().remove(&module);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// A token pair as the issuer would return it, with a live refresh token.
    pub fn mint(&self) -> TokenSet {
        let snapshot = self.snapshot.lock().unwrap().clone();
        let refresh_token = format!("rt-{}", Uuid::new_v4());
        self.live_refresh_tokens
            .lock()
            .unwrap()
            .insert(refresh_token.clone());
        TokenSet {
            access_token: sign(&claims_for(self.module, snapshot, 900)),
            refresh_token,
            expires_in: 900,
            token_type: "Bearer".to_string(),
        }
    }

    pub fn is_live(&self, refresh_token: &str) -> bool {
        self.live_refresh_tokens.lock().unwrap().contains(refresh_token)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn invalid_grant() -> IssuerError {
        IssuerError::Rejected {
            status: 400,
            error: "invalid_grant".to_string(),
        }
    }
}

#[async_trait]
impl IssuerApi for MockIssuer {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, IssuerError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.token_endpoint_down.load(Ordering::SeqCst) {
            return Err(IssuerError::Unavailable("connection refused".to_string()));
        }
        if redirect_uri != format!("{}/oauth/callback", MODULE_URL) {
            return Err(Self::invalid_grant());
        }
        if !self.codes.lock().unwrap().remove(code) {
            return Err(Self::invalid_grant());
        }
        Ok(self.mint())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IssuerError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.token_endpoint_down.load(Ordering::SeqCst) {
            return Err(IssuerError::Unavailable("connection refused".to_string()));
        }
        if !self.live_refresh_tokens.lock().unwrap().remove(refresh_token) {
            return Err(Self::invalid_grant());
        }
        Ok(self.mint())
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), IssuerError> {
        self.pause().await;
        if self.token_endpoint_down.load(Ordering::SeqCst) {
            return Err(IssuerError::Unavailable("connection refused".to_string()));
        }
        self.live_refresh_tokens.lock().unwrap().remove(refresh_token);
        self.revoked.lock().unwrap().push(refresh_token.to_string());
        Ok(())
    }

    async fn check_license(&self, _tenant_id: Uuid, module: ModuleId) -> Result<bool, IssuerError> {
        self.license_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.registry_down.load(Ordering::SeqCst) {
            return Err(IssuerError::Unavailable("connection refused".to_string()));
        }
        Ok(self.registry_grants.lock().unwrap().contains(&module))
    }
}

pub struct TestGateway {
    pub router: Router,
    pub state: GatewayState,
    pub issuer: Arc<MockIssuer>,
    pub clock: Arc<ManualClock>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn location(&self) -> String {
        self.headers[header::LOCATION].to_str().unwrap().to_string()
    }

    pub fn location_url(&self) -> Url {
        Url::parse(&self.location()).unwrap()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.location_url()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn set_cookie_header(&self, name: &str) -> Option<String> {
        self.set_cookie_headers()
            .into_iter()
            .find(|v| v.starts_with(&format!("{}=", name)))
    }

    /// Value of the named cookie from `Set-Cookie`, if set.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.set_cookie_header(name)?;
        let pair = header.split(';').next()?;
        pair.split_once('=').map(|(_, value)| value.to_string())
    }

    /// Both session cookies were expired on this response.
    pub fn clears_session(&self) -> bool {
        ["access_token", "refresh_token"].iter().all(|name| {
            self.set_cookie_header(name)
                .is_some_and(|h| h.starts_with(&format!("{}=;", name)) && h.contains("Max-Age=0"))
        })
    }
}

/// Browser request headers for a top-level navigation.
pub const NAVIGATION: &[(&str, &str)] = &[
    ("accept", "text/html,application/xhtml+xml"),
    ("sec-fetch-mode", "navigate"),
];

/// Headers of a `fetch()` from the module's own UI.
pub const API: &[(&str, &str)] = &[("accept", "application/json"), ("sec-fetch-mode", "cors")];

impl TestGateway {
    /// A CRM gateway whose tokens carry `snapshot`.
    pub fn new(snapshot: Vec<ModuleId>) -> Self {
        Self::for_module(ModuleId::Crm, snapshot)
    }

    pub fn for_module(module: ModuleId, snapshot: Vec<ModuleId>) -> Self {
        let issuer = Arc::new(MockIssuer::new(module, snapshot));
        let mut config = GatewayConfig::dev_defaults(module, MODULE_URL, ISSUER, "test-secret");
        config.issuer_timeout = Duration::from_millis(200);

        let verifier = TokenVerifier::from_rsa_pem(PUBLIC_KEY.as_bytes(), ISSUER).unwrap();
        let clock = Arc::new(ManualClock::default());
        let state = GatewayState::with_clock(config, verifier, issuer.clone(), clock.clone());
        let router = build_router(state.clone());

        Self {
            router,
            state,
            issuer,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        cookies: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        if !cookies.is_empty() {
            let cookie = cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)], cookies: &[(&str, &str)]) -> TestResponse {
        self.request("GET", uri, headers, cookies).await
    }

    /// Complete the callback with the scripted good code; returns the pair
    /// of cookie values the browser would now hold.
    pub async fn sign_in(&self) -> (String, String) {
        let response = self
            .get(&format!("/oauth/callback?code={}&state=%2F", GOOD_CODE), NAVIGATION, &[])
            .await;
        assert_eq!(response.status, StatusCode::FOUND, "{}", response.text());
        (
            response.cookie("access_token").unwrap(),
            response.cookie("refresh_token").unwrap(),
        )
    }

    /// A session whose access token has already expired.
    pub fn expired_session(&self) -> (String, String) {
        let fresh = self.issuer.mint();
        let snapshot = self.issuer.snapshot.lock().unwrap().clone();
        let expired = sign(&claims_for(self.state.config.module_id, snapshot, -60));
        (expired, fresh.refresh_token)
    }
}
