use crate::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use service_core::error::AppError;
use service_core::identity::AccessTokenClaims;

/// Verified access-token claims from an `Authorization: Bearer` header.
/// Tokens minted for any registered module are accepted here.
pub struct BearerClaims(pub AccessTokenClaims);

#[axum::async_trait]
impl FromRequestParts<AppState> for BearerClaims {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Authorization(bearer) = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing bearer token")))?;

        let claims = state
            .signer
            .verifier()
            .verify_access_token(bearer.token(), None)
            .map_err(|e| {
                tracing::debug!(error = %e, "Bearer token rejected");
                AppError::Unauthorized(anyhow::anyhow!(e))
            })?;

        Ok(BearerClaims(claims))
    }
}
