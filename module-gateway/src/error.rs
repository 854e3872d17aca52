use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use service_core::identity::ModuleId;
use thiserror::Error;
use uuid::Uuid;

/// Failures talking to the issuer's back channel.
#[derive(Debug, Error)]
pub enum IssuerError {
    /// The issuer answered with an OAuth error such as `invalid_grant`.
    #[error("issuer rejected request: {error}")]
    Rejected { status: u16, error: String },

    #[error("issuer unavailable: {0}")]
    Unavailable(String),

    #[error("issuer call timed out")]
    Timeout,
}

/// Why a browser or API caller could not be signed in. Every variant is
/// answered the same way on the wire: the caller is unauthenticated.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing, spent or expired code. Signing in again fixes it.
    #[error("authorization code rejected: {0}")]
    AuthorizationCode(String),

    /// The issuer refused this client outright; retrying would loop.
    #[error("authorization refused by issuer: {0}")]
    AuthorizationDenied(String),

    #[error("refresh rejected")]
    RefreshRejected,

    #[error("issuer unavailable: {0}")]
    IssuerUnavailable(String),
}

impl From<IssuerError> for GatewayError {
    fn from(err: IssuerError) -> Self {
        match err {
            IssuerError::Rejected { .. } => GatewayError::RefreshRejected,
            other => GatewayError::IssuerUnavailable(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            GatewayError::IssuerUnavailable(detail) => {
                tracing::error!(error = %detail, "Issuer unavailable, failing closed");
            }
            other => tracing::debug!(error = %other, "Request unauthenticated"),
        }
        unauthorized()
    }
}

/// License gate outcome for a request that did not get through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("no verified identity on request")]
    Unauthenticated,

    #[error("module {module_id} is not licensed for tenant {tenant_id}")]
    NotLicensed { module_id: ModuleId, tenant_id: Uuid },

    #[error("license registry unavailable for module {module_id}, tenant {tenant_id}")]
    RegistryUnavailable { module_id: ModuleId, tenant_id: Uuid },
}

impl AccessError {
    pub fn module_id(&self) -> Option<ModuleId> {
        match self {
            AccessError::Unauthenticated => None,
            AccessError::NotLicensed { module_id, .. }
            | AccessError::RegistryUnavailable { module_id, .. } => Some(*module_id),
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        match self {
            AccessError::Unauthenticated => unauthorized(),
            AccessError::NotLicensed { module_id, .. }
            | AccessError::RegistryUnavailable { module_id, .. } => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "module_not_licensed",
                    "moduleId": module_id,
                })),
            )
                .into_response(),
        }
    }
}

pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}
