use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;

/// Install the global Prometheus recorder. Call once per process.
pub fn init_metrics() -> Result<PrometheusHandle, AppError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to install metrics recorder: {}", e)))
}

pub fn record_token_issued(grant_type: &'static str) {
    counter!("oauth_tokens_issued_total", "grant_type" => grant_type).increment(1);
}

pub fn record_refresh_reuse() {
    counter!("oauth_refresh_reuse_total").increment(1);
}

pub fn record_login(outcome: &'static str) {
    counter!("identity_logins_total", "outcome" => outcome).increment(1);
}
