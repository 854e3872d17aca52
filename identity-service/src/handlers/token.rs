use crate::AppState;
use crate::handlers::error::OAuthError;
use crate::middleware::{ClientCredentials, authenticate_client, throttle_client};
use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

fn no_store(response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, OAuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{} is required", name)))
}

/// POST /token
#[tracing::instrument(skip_all, fields(grant_type = tracing::field::Empty))]
pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(request) = form.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;

    let credentials = ClientCredentials::resolve(
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    )?;
    let client = authenticate_client(state.store.as_ref(), &credentials).await?;
    throttle_client(&state.client_rate_limiter, &client)?;

    let grant_type = required(&request.grant_type, "grant_type")?;
    tracing::Span::current().record("grant_type", grant_type);

    let response = match grant_type {
        "authorization_code" => {
            let code = required(&request.code, "code")?;
            let redirect_uri = required(&request.redirect_uri, "redirect_uri")?;
            state.tokens.exchange_code(&client, code, redirect_uri).await?
        }
        "refresh_token" => {
            let refresh_token = required(&request.refresh_token, "refresh_token")?;
            state.tokens.refresh(&client, refresh_token).await?
        }
        other => {
            return Err(OAuthError::UnsupportedGrantType(format!(
                "grant_type '{}' is not supported",
                other
            )));
        }
    };

    Ok(no_store(Json(response)))
}

/// POST /revoke
///
/// Revokes the refresh token's whole family. Unknown tokens still get 200.
pub async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<RevokeRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(request) = form.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;

    let credentials = ClientCredentials::resolve(
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    )?;
    let client = authenticate_client(state.store.as_ref(), &credentials).await?;
    throttle_client(&state.client_rate_limiter, &client)?;

    let token = required(&request.token, "token")?;
    if request.token_type_hint.as_deref() == Some("access_token") {
        tracing::debug!(client_id = %client.client_id, "Access tokens cannot be revoked; ignoring");
        return Ok(no_store(StatusCode::OK));
    }

    state.tokens.revoke(&client, token).await?;
    Ok(no_store(StatusCode::OK))
}
