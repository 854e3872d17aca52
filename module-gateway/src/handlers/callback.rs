use crate::GatewayState;
use crate::error::{GatewayError, IssuerError};
use crate::middleware::{authorize_url, is_navigation, sanitize_return_path};
use crate::services::metrics;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use service_core::utils::found;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /oauth/callback
///
/// Trades the authorization code for a token pair, stores it in cookies and
/// sends the browser back to the path it originally asked for.
///
/// A failed exchange leaves a still-valid session alone, so reloading a spent
/// callback URL is harmless. Without one, a bad or spent code sends browser
/// navigations back through `/authorize`.
#[tracing::instrument(skip_all)]
pub async fn callback(
    State(state): State<GatewayState>,
    method: Method,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let target = sanitize_return_path(params.state.as_deref());

    let error = match complete_sign_in(&state, &params).await {
        Ok(tokens) => {
            if let Some(requested) = params.state.as_deref()
                && requested != target
            {
                tracing::warn!(state = %requested, "Rejected return path after sign-in");
            }
            metrics::record_callback("success");
            return (state.cookies.store(jar, &tokens), found(target)).into_response();
        }
        Err(e) => e,
    };

    let live_session = state
        .cookies
        .access_token(&jar)
        .and_then(|token| state.verify(token).ok());
    if let Some(claims) = live_session {
        metrics::record_callback("already_signed_in");
        tracing::info!(
            error = %error,
            user_id = %claims.sub,
            "Callback failed but the session is still valid"
        );
        return found(target).into_response();
    }

    metrics::record_callback("failure");
    let jar = state.cookies.clear(jar);

    if matches!(error, GatewayError::AuthorizationCode(_)) && is_navigation(&method, &headers) {
        match authorize_url(&state.config, target) {
            Ok(url) => {
                tracing::info!(error = %error, "Restarting sign-in after a bad authorization code");
                return (jar, found(url.as_str())).into_response();
            }
            Err(e) => tracing::error!(error = %e, "Cannot build authorize URL from ISSUER_URL"),
        }
    }

    (jar, error).into_response()
}

async fn complete_sign_in(
    state: &GatewayState,
    params: &CallbackParams,
) -> Result<crate::services::TokenSet, GatewayError> {
    if let Some(error) = &params.error {
        tracing::info!(error = %error, "Issuer returned an authorization error");
        return Err(GatewayError::AuthorizationDenied(error.clone()));
    }
    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return Err(GatewayError::AuthorizationCode("missing code".to_string()));
    };

    let redirect_uri = state.config.redirect_uri();
    let tokens = state
        .call_issuer(state.issuer.exchange_code(code, &redirect_uri))
        .await
        .map_err(|e| match e {
            IssuerError::Rejected { error, .. } if error == "invalid_grant" => {
                tracing::warn!(error = %error, "Issuer rejected authorization code");
                GatewayError::AuthorizationCode(error)
            }
            IssuerError::Rejected { status, error } => {
                tracing::error!(status, error = %error, "Issuer refused the code exchange for this client");
                GatewayError::AuthorizationDenied(error)
            }
            other => GatewayError::from(other),
        })?;

    let claims = state.verify(&tokens.access_token).map_err(|e| {
        GatewayError::IssuerUnavailable(format!("issuer returned an unverifiable token: {}", e))
    })?;
    tracing::info!(
        user_id = %claims.sub,
        tenant_id = %claims.tenant_id,
        "User signed in to module"
    );

    Ok(tokens)
}
