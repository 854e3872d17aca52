use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Plain `302 Found`, the status browsers and OAuth clients expect from
/// `/authorize` and from a gateway bouncing an unauthenticated navigation.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::error!("Refusing to emit redirect with invalid Location header");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
