use crate::GatewayState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;

/// POST /auth/logout
///
/// Revokes the refresh token family at the issuer, then expires both cookies.
/// A failed revocation is logged; the cookies are cleared regardless.
pub async fn logout(State(state): State<GatewayState>, jar: CookieJar) -> Response {
    if let Some(refresh_token) = state.cookies.refresh_token(&jar) {
        match state.call_issuer(state.issuer.revoke(refresh_token)).await {
            Ok(()) => tracing::info!("Refresh token revoked at issuer"),
            Err(e) => tracing::error!(error = %e, "Failed to revoke refresh token during logout"),
        }
    }

    (
        state.cookies.clear(jar),
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response()
}
