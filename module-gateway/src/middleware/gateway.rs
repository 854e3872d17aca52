//! Per-request sign-in check for a module.
//!
//! A valid access-token cookie is verified locally and its claims attached to
//! the request. Otherwise the refresh cookie is spent once at the issuer, and
//! if that fails too the caller is sent into the authorization flow (browser
//! navigations) or gets a 401 (everything else). Cookies are cleared only
//! when the issuer rejects the refresh token, not when it cannot be reached.

use crate::GatewayState;
use crate::config::{CALLBACK_PATH, GatewayConfig};
use crate::error::{GatewayError, unauthorized};
use crate::services::{TokenSet, metrics};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use service_core::identity::{AccessTokenClaims, VerifyError};
use service_core::utils::found;
use url::Url;

pub async fn gateway_middleware(
    State(state): State<GatewayState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let access_token = state.cookies.access_token(&jar).map(str::to_string);
    let refresh_token = state.cookies.refresh_token(&jar).map(str::to_string);

    if let Some(token) = &access_token {
        match state.verify(token) {
            Ok(claims) => {
                state.attach(&mut request, claims);
                return next.run(request).await;
            }
            Err(VerifyError::Expired) => tracing::debug!("Access token expired"),
            Err(e) => tracing::info!(error = %e, "Access token rejected"),
        }
    }

    if let Some(refresh_token) = refresh_token {
        match refresh_session(&state, &refresh_token).await {
            Ok((tokens, claims)) => {
                metrics::record_refresh("success");
                tracing::info!(
                    user_id = %claims.sub,
                    tenant_id = %claims.tenant_id,
                    "Session refreshed transparently"
                );
                state.attach(&mut request, claims);
                let jar = state.cookies.store(jar, &tokens);
                let response = next.run(request).await;
                return (jar, response).into_response();
            }
            Err(GatewayError::RefreshRejected) => {
                metrics::record_refresh("rejected");
                tracing::info!("Refresh token rejected by issuer, clearing session");
                return deny(&state, &request, state.cookies.clear(jar));
            }
            // The issuer never judged the token; fail closed but keep it.
            Err(e) => {
                metrics::record_refresh("failure");
                tracing::error!(error = %e, "Transparent refresh failed, session kept for retry");
                return deny(&state, &request, jar);
            }
        }
    }

    if access_token.is_some() {
        return deny(&state, &request, state.cookies.clear(jar));
    }
    deny(&state, &request, jar)
}

async fn refresh_session(
    state: &GatewayState,
    refresh_token: &str,
) -> Result<(TokenSet, AccessTokenClaims), GatewayError> {
    let tokens = state.call_issuer(state.issuer.refresh(refresh_token)).await?;
    let claims = state.verify(&tokens.access_token).map_err(|e| {
        GatewayError::IssuerUnavailable(format!("issuer returned an unverifiable token: {}", e))
    })?;
    Ok((tokens, claims))
}

fn deny(state: &GatewayState, request: &Request, jar: CookieJar) -> Response {
    if !is_navigation(request.method(), request.headers()) {
        return (jar, unauthorized()).into_response();
    }

    let original = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    match authorize_url(&state.config, sanitize_return_path(Some(original))) {
        Ok(url) => (jar, found(url.as_str())).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Cannot build authorize URL from ISSUER_URL");
            (jar, unauthorized()).into_response()
        }
    }
}

/// A top-level browser navigation, as opposed to a fetch/XHR or API client.
pub fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    let fetch_mode_navigate = headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|mode| mode.eq_ignore_ascii_case("navigate"));
    if fetch_mode_navigate {
        return true;
    }

    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));

    (method == Method::GET || method == Method::HEAD) && accepts_html
}

/// `{issuer}/authorize?response_type=code&client_id=..&redirect_uri=..&state=..`
pub fn authorize_url(config: &GatewayConfig, state: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("{}/authorize", config.issuer_url))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", config.client_id())
        .append_pair("redirect_uri", &config.redirect_uri())
        .append_pair("state", state);
    Ok(url)
}

/// Only a path on this module may be restored after sign-in. Anything that
/// could leave the origin, or loop back into the callback, becomes `/`.
pub fn sanitize_return_path(state: Option<&str>) -> &str {
    let Some(candidate) = state else {
        return "/";
    };

    let path = candidate.split(['?', '#']).next().unwrap_or_default();
    let acceptable = candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.contains('\\')
        && !candidate.chars().any(char::is_control)
        && path != CALLBACK_PATH;

    if acceptable { candidate } else { "/" }
}
