use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;

pub fn init_metrics() -> Result<PrometheusHandle, AppError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to install metrics recorder: {}", e)))
}

/// `outcome` is one of `snapshot`, `registry_allow`, `deny`, `registry_error`.
pub fn record_license_decision(module: &'static str, outcome: &'static str) {
    counter!("license_gate_decisions_total", "module" => module, "outcome" => outcome).increment(1);
}

pub fn record_refresh(outcome: &'static str) {
    counter!("gateway_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_callback(outcome: &'static str) {
    counter!("gateway_callback_total", "outcome" => outcome).increment(1);
}
