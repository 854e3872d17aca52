use crate::GatewayState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// GET /health
pub async fn health_check(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "module": state.config.module_id,
    }))
}
