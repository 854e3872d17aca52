use module_gateway::{
    GatewayState, build_router,
    config::GatewayConfig,
    services::{HttpIssuerClient, metrics::init_metrics},
};
use service_core::error::AppError;
use service_core::identity::TokenVerifier;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = GatewayConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    let metrics_handle = init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        module_id = %config.module_id,
        issuer = %config.issuer_url,
        "Starting module host"
    );

    let verifier = TokenVerifier::from_pem_file(&config.jwt_public_key_path, config.issuer_url.clone())?;
    let issuer = HttpIssuerClient::new(
        &config.issuer_internal_url,
        config.client_id(),
        config.client_secret.clone(),
        config.issuer_timeout,
    )
    .map_err(AppError::ConfigError)?;

    let state = GatewayState::new(config.clone(), verifier, Arc::new(issuer)).with_metrics(metrics_handle);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
