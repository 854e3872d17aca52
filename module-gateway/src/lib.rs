pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod session;

use axum::{
    Router,
    extract::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use config::{CALLBACK_PATH, GatewayConfig};
use error::IssuerError;
use metrics_exporter_prometheus::PrometheusHandle;
use middleware::{LicenseGate, gateway_middleware, license_gate_middleware};
use service_core::identity::{
    AccessTokenClaims, CachedRegistry, Clock, LicenseCache, SystemClock, TokenVerifier, VerifyError,
};
use service_core::middleware::{
    REQUEST_ID_HEADER, metrics_middleware, request_id_middleware, security_headers_middleware,
};
use services::{IssuerApi, RemoteRegistry};
use session::SessionCookies;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Everything a module gateway needs per request.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub verifier: TokenVerifier,
    pub issuer: Arc<dyn IssuerApi>,
    pub cookies: SessionCookies,
    pub gate: LicenseGate,
    pub metrics: Option<PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, verifier: TokenVerifier, issuer: Arc<dyn IssuerApi>) -> Self {
        Self::with_clock(config, verifier, issuer, Arc::new(SystemClock))
    }

    /// `clock` drives the license cache only; token expiry is checked
    /// against wall time.
    pub fn with_clock(
        config: GatewayConfig,
        verifier: TokenVerifier,
        issuer: Arc<dyn IssuerApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = CachedRegistry::new(
            RemoteRegistry::new(issuer.clone()),
            LicenseCache::with_clock(config.license_cache_ttl(), clock),
            config.issuer_timeout,
        );

        Self {
            cookies: SessionCookies::new(&config),
            gate: LicenseGate::new(Arc::new(registry)),
            config: Arc::new(config),
            verifier,
            issuer,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Local verification; the token must have been minted for this module.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, VerifyError> {
        self.verifier
            .verify_access_token(token, Some(self.config.client_id()))
    }

    /// Bound a back-channel call by `ISSUER_TIMEOUT_MS`.
    pub async fn call_issuer<T, F>(&self, call: F) -> Result<T, IssuerError>
    where
        F: Future<Output = Result<T, IssuerError>>,
    {
        tokio::time::timeout(self.config.issuer_timeout, call)
            .await
            .map_err(|_| IssuerError::Timeout)?
    }

    pub(crate) fn attach(&self, request: &mut Request, claims: AccessTokenClaims) {
        let extensions = request.extensions_mut();
        extensions.insert(claims);
        extensions.insert(self.gate.clone());
    }
}

pub fn build_router(state: GatewayState) -> Router {
    let module = state.config.module_id;

    // Pages of the module itself: signed in and licensed.
    let licensed = Router::new()
        .route("/", get(handlers::host::index))
        .route("/api/me", get(handlers::host::me))
        .route_layer(from_fn_with_state(module, license_gate_middleware));

    // Signed in, any license.
    let authenticated = Router::new()
        .route(
            "/api/modules/:module_id/access",
            get(handlers::host::module_access),
        )
        .merge(licensed)
        .route_layer(from_fn_with_state(state.clone(), gateway_middleware));

    Router::new()
        .route(CALLBACK_PATH, get(handlers::callback::callback))
        .route("/auth/logout", post(handlers::logout::logout))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(authenticated)
        .with_state(state)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
}
