//! Per-module license checks.
//!
//! The token's `licensed_modules` snapshot answers most requests without any
//! I/O. A miss is confirmed against the registry, since the snapshot may
//! predate an upgrade, and only then refused.

use crate::GatewayState;
use crate::error::AccessError;
use crate::services::metrics;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{Extensions, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use service_core::identity::{AccessTokenClaims, ModuleId, ModuleRegistry, RegistryError};
use std::sync::Arc;
use uuid::Uuid;

/// Who may use a module on this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAccess {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub module_id: ModuleId,
}

#[derive(Clone)]
pub struct LicenseGate {
    registry: Arc<dyn ModuleRegistry>,
}

impl LicenseGate {
    pub fn new(registry: Arc<dyn ModuleRegistry>) -> Self {
        Self { registry }
    }

    pub async fn check(
        &self,
        claims: &AccessTokenClaims,
        module: ModuleId,
    ) -> Result<ModuleAccess, AccessError> {
        let access = ModuleAccess {
            tenant_id: claims.tenant_id,
            user_id: claims.sub,
            module_id: module,
        };

        if claims.has_module(module) {
            metrics::record_license_decision(module.as_str(), "snapshot");
            return Ok(access);
        }

        match self.registry.is_module_licensed(claims.tenant_id, module).await {
            Ok(true) => {
                metrics::record_license_decision(module.as_str(), "registry_allow");
                tracing::info!(
                    module_id = %module,
                    tenant_id = %claims.tenant_id,
                    "Module licensed after token was issued"
                );
                Ok(access)
            }
            Ok(false) => {
                metrics::record_license_decision(module.as_str(), "deny");
                tracing::info!(
                    module_id = %module,
                    tenant_id = %claims.tenant_id,
                    user_id = %claims.sub,
                    "Module not licensed"
                );
                Err(AccessError::NotLicensed {
                    module_id: module,
                    tenant_id: claims.tenant_id,
                })
            }
            Err(e) => {
                metrics::record_license_decision(module.as_str(), "registry_error");
                match &e {
                    RegistryError::Timeout => tracing::error!(
                        module_id = %module,
                        tenant_id = %claims.tenant_id,
                        "License registry timed out, denying access"
                    ),
                    RegistryError::Unavailable(detail) => tracing::error!(
                        module_id = %module,
                        tenant_id = %claims.tenant_id,
                        error = %detail,
                        "License registry unavailable, denying access"
                    ),
                }
                Err(AccessError::RegistryUnavailable {
                    module_id: module,
                    tenant_id: claims.tenant_id,
                })
            }
        }
    }
}

/// License check against whatever the gateway attached to the request.
/// May be called any number of times per request.
pub async fn require_module_access(
    extensions: &Extensions,
    module: ModuleId,
) -> Result<ModuleAccess, AccessError> {
    let Some(claims) = extensions.get::<AccessTokenClaims>() else {
        return Err(AccessError::Unauthenticated);
    };
    let Some(gate) = extensions.get::<LicenseGate>() else {
        tracing::error!(module_id = %module, "License gate used without the gateway middleware");
        return Err(AccessError::Unauthenticated);
    };

    gate.check(claims, module).await
}

/// Route layer refusing requests whose tenant does not hold `module`.
pub async fn license_gate_middleware(
    State(module): State<ModuleId>,
    mut request: Request,
    next: Next,
) -> Response {
    match require_module_access(request.extensions(), module).await {
        Ok(access) => {
            request.extensions_mut().insert(access);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Access to the module this gateway fronts.
#[axum::async_trait]
impl FromRequestParts<GatewayState> for ModuleAccess {
    type Rejection = AccessError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &GatewayState,
    ) -> Result<Self, Self::Rejection> {
        let module = state.config.module_id;
        if let Some(access) = parts.extensions.get::<ModuleAccess>()
            && access.module_id == module
        {
            return Ok(*access);
        }
        require_module_access(&parts.extensions, module).await
    }
}
