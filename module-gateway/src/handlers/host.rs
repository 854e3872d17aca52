//! The module's own pages. They only ever run behind the gateway and the
//! license gate for this module.

use crate::GatewayState;
use crate::middleware::{ModuleAccess, require_module_access};
use askama::Template;
use axum::{
    Extension, Json,
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use service_core::identity::{AccessTokenClaims, ModuleId};
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: String,
    pub tenant_id: Uuid,
    pub roles: Vec<String>,
    pub licensed_modules: Vec<ModuleId>,
    pub access: ModuleAccess,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub module: ModuleId,
    pub email: String,
}

/// GET /
pub async fn index(
    State(state): State<GatewayState>,
    Extension(claims): Extension<AccessTokenClaims>,
    _access: ModuleAccess,
) -> IndexTemplate {
    IndexTemplate {
        module: state.config.module_id,
        email: claims.email,
    }
}

/// GET /api/me
pub async fn me(Extension(claims): Extension<AccessTokenClaims>, access: ModuleAccess) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: claims.sub,
        email: claims.email,
        tenant_id: claims.tenant_id,
        roles: claims.roles,
        licensed_modules: claims.licensed_modules,
        access,
    })
}

/// GET /api/modules/:module_id/access
///
/// Lets the UI ask about other modules, e.g. to grey out links the tenant
/// has not bought.
pub async fn module_access(Path(module_id): Path<String>, request: Request) -> Response {
    let Ok(module) = module_id.parse::<ModuleId>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown_module", "moduleId": module_id })),
        )
            .into_response();
    };

    match require_module_access(request.extensions(), module).await {
        Ok(access) => Json(json!({ "licensed": true, "access": access })).into_response(),
        Err(e) => e.into_response(),
    }
}
