use crate::AppState;
use crate::middleware::AuthenticatedClient;
use crate::models::ModuleDefinition;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use service_core::error::AppError;
use service_core::identity::ModuleId;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct LicenseCheckResponse {
    pub tenant_id: Uuid,
    pub module_id: ModuleId,
    pub licensed: bool,
}

/// GET /registry/tenants/:tenant_id/modules/:module_id
///
/// Authoritative license lookup for module hosts. Requires client
/// authentication but any registered client may ask about any tenant.
pub async fn check_license(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    Path((tenant_id, module_id)): Path<(Uuid, String)>,
) -> Result<Json<LicenseCheckResponse>, AppError> {
    let module_id: ModuleId = module_id
        .parse()
        .map_err(|e| AppError::NotFound(anyhow::anyhow!("{}", e)))?;

    let licensed = state
        .registry
        .check(tenant_id, module_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, %tenant_id, %module_id, "License lookup failed");
            AppError::ServiceUnavailable
        })?;

    tracing::debug!(
        client_id = %client.client_id,
        %tenant_id,
        %module_id,
        licensed,
        "License checked"
    );

    Ok(Json(LicenseCheckResponse {
        tenant_id,
        module_id,
        licensed,
    }))
}

/// GET /registry/modules
pub async fn list_modules(
    State(state): State<AppState>,
    AuthenticatedClient(_client): AuthenticatedClient,
) -> Result<Json<Vec<ModuleDefinition>>, AppError> {
    Ok(Json(state.registry.list_modules().await?))
}
