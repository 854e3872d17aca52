//! Test harness for the issuer: a router over a seeded in-memory store,
//! driven with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode, header},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use identity_service::{
    AppState, build_router,
    config::IdentityConfig,
    db::{MemoryStore, Store},
    services::{SeedFile, TokenSigner},
};
use service_core::identity::{AccessTokenClaims, ManualClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

pub const ISSUER: &str = "http://issuer.test";
pub const PRIVATE_KEY: &str = include_str!("../../../fixtures/dev-signing-key.pem");
pub const PUBLIC_KEY: &str = include_str!("../../../fixtures/dev-signing-key.pub.pem");
const SEED: &str = include_str!("../../../fixtures/dev-seed.json");

pub const ACME_TENANT: &str = "8d3c1f52-5b6e-4d0a-9a57-1f2f4b0e7a01";
pub const ANA_EMAIL: &str = "ana@acme.test";
pub const ANA_USER: &str = "5f1e9c3a-7d2b-4a6e-8c0f-3b9d2e1a4c11";
pub const PASSWORD: &str = "correct horse battery staple";

pub const CRM_REDIRECT: &str = "http://localhost:8101/oauth/callback";
pub const HR_REDIRECT: &str = "http://localhost:8102/oauth/callback";
pub const CRM_SECRET: &str = "dev-crm-secret";
pub const HR_SECRET: &str = "dev-hr-secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryStore,
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

    pub fn location(&self) -> Url {
        let location = self.headers[header::LOCATION].to_str().unwrap();
        Url::parse(location)
            .or_else(|_| Url::parse(ISSUER).and_then(|base| base.join(location)))
            .unwrap()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.location()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Value of the named cookie from `Set-Cookie`, if set.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| {
                let pair = v.split(';').next()?;
                let (key, value) = pair.split_once('=')?;
                (key.trim() == name).then(|| value.to_string())
            })
    }

    pub fn set_cookie_header(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&format!("{}=", name)))
            .map(str::to_string)
    }
}

pub fn basic(client_id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", client_id, secret)))
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(IdentityConfig::dev_defaults(ISSUER))
    }

    pub fn with_config(config: IdentityConfig) -> Self {
        Self::with_backend(config, |store| Arc::new(store.clone()))
    }

    /// `backend` wraps the seeded memory store; `self.store` stays the
    /// unwrapped one for fixtures.
    pub fn with_backend(
        config: IdentityConfig,
        backend: impl FnOnce(&MemoryStore) -> Arc<dyn Store>,
    ) -> Self {
        let store = MemoryStore::new();
        let seed: SeedFile = serde_json::from_str(SEED).unwrap();
        seed.apply(&store).unwrap();

        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let signer = TokenSigner::from_pem(
            PRIVATE_KEY.as_bytes(),
            PUBLIC_KEY.as_bytes(),
            "test-key",
            ISSUER,
        )
        .unwrap();

        let state =
            AppState::with_clock(config, backend(&store), signer, clock.clone()).unwrap();
        let router = build_router(state.clone());

        Self {
            router,
            state,
            store,
            clock,
        }
    }

    pub fn acme_tenant() -> Uuid {
        ACME_TENANT.parse().unwrap()
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

    /// Send as if the TCP peer were `peer`.
    pub async fn send_from(&self, peer: &str, mut request: Request<Body>) -> TestResponse {
        let addr = SocketAddr::new(peer.parse().unwrap(), 51000);
        request.extensions_mut().insert(ConnectInfo(addr));
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("idp_session={}", cookie));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        form: &[(&str, &str)],
        authorization: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(authorization) = authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        let body = serde_urlencoded::to_string(form).unwrap();
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Sign in and return the issuer session cookie value.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .post_form("/login", &[("email", email), ("password", password)], None)
            .await;
        assert_eq!(response.status, StatusCode::FOUND, "{}", response.text());
        response.cookie("idp_session").unwrap()
    }

    pub fn authorize_uri(client_id: &str, redirect_uri: &str, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state)
            .finish();
        format!("/authorize?{}", query)
    }

    /// Run `/authorize` with an existing session and return the code.
    pub async fn authorize(&self, session: &str, client_id: &str, redirect_uri: &str) -> String {
        let response = self
            .get(&Self::authorize_uri(client_id, redirect_uri, "/"), Some(session))
            .await;
        assert_eq!(response.status, StatusCode::FOUND);
        response.query_param("code").unwrap()
    }

    pub async fn exchange(&self, code: &str) -> TestResponse {
        self.post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", CRM_REDIRECT),
            ],
            Some(&basic("crm", CRM_SECRET)),
        )
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> TestResponse {
        self.post_form(
            "/token",
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
            Some(&basic("crm", CRM_SECRET)),
        )
        .await
    }

    /// Full browser flow for ana at the CRM client; returns the token response.
    pub async fn sign_in_to_crm(&self) -> serde_json::Value {
        let session = self.login(ANA_EMAIL, PASSWORD).await;
        let code = self.authorize(&session, "crm", CRM_REDIRECT).await;
        let response = self.exchange(&code).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        response.json()
    }

    pub fn verify(&self, access_token: &str, audience: &str) -> AccessTokenClaims {
        self.state
            .signer
            .verifier()
            .verify_access_token(access_token, Some(audience))
            .unwrap()
    }
}
