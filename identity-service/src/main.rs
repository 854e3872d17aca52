use identity_service::{
    AppState, build_router,
    config::IdentityConfig,
    db::{MemoryStore, PgStore, Store},
    services::{SeedFile, TokenSigner, metrics::init_metrics, validate_catalog},
};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = IdentityConfig::from_env()?;

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
        issuer = %config.issuer_url,
        "Starting identity service"
    );

    let signer = TokenSigner::from_files(&config.jwt, &config.issuer_url)?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            store.migrate().await?;
            tracing::info!("Connected to Postgres and applied migrations");
            Arc::new(store)
        }
        None => {
            let store = MemoryStore::new();
            let seed_file = config
                .seed_file
                .clone()
                .unwrap_or_else(|| "fixtures/dev-seed.json".to_string());
            SeedFile::load(&seed_file)?.apply(&store)?;
            tracing::warn!(seed_file = %seed_file, "Using in-memory store; state is lost on restart");
            Arc::new(store)
        }
    };

    validate_catalog(store.as_ref()).await?;

    let state = AppState::new(config.clone(), store, signer)?.with_metrics(metrics_handle);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
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
