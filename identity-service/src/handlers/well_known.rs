use crate::AppState;
use crate::services::JwkSet;
use axum::{
    Json,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};

/// GET /.well-known/jwks.json
pub async fn jwks(State(state): State<AppState>) -> Response {
    let keys: JwkSet = state.signer.jwks();
    let mut response = Json(keys).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=300"),
    );
    response
}
