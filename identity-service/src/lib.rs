pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use service_core::error::AppError;
use service_core::identity::{Clock, SystemClock};
use service_core::middleware::{
    IpRateLimit, KeyedRateLimiter, REQUEST_ID_HEADER, create_ip_rate_limiter,
    create_keyed_rate_limiter, ip_rate_limit_middleware, metrics_middleware,
    request_id_middleware, security_headers_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::db::Store;
use crate::services::{StoreRegistry, TokenService, TokenSigner};

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn Store>,
    pub signer: TokenSigner,
    pub tokens: TokenService,
    pub registry: StoreRegistry,
    pub clock: Arc<dyn Clock>,
    pub login_rate_limit: IpRateLimit,
    /// Keyed by authenticated `client_id`; every user of a module shares it.
    pub client_rate_limiter: KeyedRateLimiter<String>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn Store>,
        signer: TokenSigner,
    ) -> Result<Self, AppError> {
        Self::with_clock(config, store, signer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: IdentityConfig,
        store: Arc<dyn Store>,
        signer: TokenSigner,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let registry = StoreRegistry::new(store.clone(), clock.clone());
        let tokens = TokenService::new(
            store.clone(),
            signer.clone(),
            registry.clone(),
            clock.clone(),
            config.tokens,
        );
        let login_rate_limit = IpRateLimit::new(
            create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            )?,
            &config.rate_limit.trusted_proxies,
        );
        let client_rate_limiter = create_keyed_rate_limiter(
            config.rate_limit.token_attempts,
            config.rate_limit.token_window_seconds,
        )?;

        Ok(Self {
            config,
            store,
            signer,
            tokens,
            registry,
            clock,
            login_rate_limit,
            client_rate_limiter,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({
            "status": "ok",
            "service": state.config.service_name,
            "version": state.config.service_version,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed: store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let login_limit = state.login_rate_limit.clone();

    let app = Router::new()
        .route("/", get(handlers::session::home))
        .route(
            "/login",
            get(handlers::session::login_page).merge(
                post(handlers::session::login)
                    .layer(from_fn_with_state(login_limit, ip_rate_limit_middleware)),
            ),
        )
        .route("/logout", post(handlers::session::logout))
        .route("/authorize", get(handlers::authorize::authorize))
        .route("/token", post(handlers::token::token))
        .route("/revoke", post(handlers::token::revoke))
        .route("/userinfo", get(handlers::userinfo::userinfo))
        .route("/registry/modules", get(handlers::registry::list_modules))
        .route(
            "/registry/tenants/:tenant_id/modules/:module_id",
            get(handlers::registry::check_license),
        )
        .route("/.well-known/jwks.json", get(handlers::well_known::jwks))
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .with_state(state.clone())
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
        .layer(from_fn(request_id_middleware));

    match cors_layer(&state.config.allowed_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}
