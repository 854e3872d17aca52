use crate::AppState;
use crate::middleware::BearerClaims;
use crate::models::UserProfile;
use axum::{Json, extract::State};
use serde::Serialize;
use service_core::error::AppError;
use service_core::identity::ModuleId;

#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub licensed_modules: Vec<ModuleId>,
}

/// GET /userinfo
///
/// `licensed_modules` is read from the store, so it can be fresher than the
/// snapshot embedded in the presented token.
pub async fn userinfo(
    State(state): State<AppState>,
    BearerClaims(claims): BearerClaims,
) -> Result<Json<UserInfoResponse>, AppError> {
    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .filter(|u| u.enabled && u.tenant_id == claims.tenant_id)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Subject no longer active")))?;

    let licensed_modules = state.registry.licensed_modules(user.tenant_id).await?;

    Ok(Json(UserInfoResponse {
        profile: UserProfile::from(&user),
        licensed_modules,
    }))
}
