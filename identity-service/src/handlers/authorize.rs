use crate::AppState;
use crate::handlers::error::OAuthError;
use crate::handlers::session::{SESSION_COOKIE, current_session, session_user};
use axum::{
    extract::{OriginalUri, Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use service_core::utils::found;
use url::{Url, form_urlencoded};

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
}

/// GET /authorize
///
/// Client and redirect URI problems are answered here and never bounced to
/// the redirect URI; a client we cannot trust gets no redirect at all.
#[tracing::instrument(skip_all, fields(client_id = tracing::field::Empty))]
pub async fn authorize(
    State(state): State<AppState>,
    jar: CookieJar,
    OriginalUri(original_uri): OriginalUri,
    Query(params): Query<AuthorizeParams>,
) -> Result<Response, OAuthError> {
    let client_id = params
        .client_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;
    tracing::Span::current().record("client_id", client_id);

    let Some(client) = state.store.find_client(client_id).await? else {
        tracing::warn!("Authorization request for unknown client");
        return Err(OAuthError::InvalidClient("unknown client".to_string()));
    };
    if !client.enabled {
        return Err(OAuthError::UnauthorizedClient("client is disabled".to_string()));
    }

    let redirect_uri = params.redirect_uri.as_deref().unwrap_or_default();
    if !client.allows_redirect(redirect_uri) {
        tracing::warn!(redirect_uri, "Redirect URI is not registered for client");
        return Err(OAuthError::InvalidRedirectUri(
            "redirect_uri is not registered for this client".to_string(),
        ));
    }

    if params.response_type.as_deref() != Some("code") {
        return redirect_to_client(
            redirect_uri,
            &[("error", "unsupported_response_type")],
            params.state.as_deref(),
        );
    }

    let user = match current_session(&state, &jar) {
        Some(session) => session_user(&state, &session).await?,
        None => None,
    };

    let Some(user) = user else {
        let return_to = original_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/authorize");
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("return_to", return_to)
            .finish();

        let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
        return Ok((jar, found(&format!("/login?{}", query))).into_response());
    };

    let code = state
        .tokens
        .issue_authorization_code(&client, redirect_uri, &user)
        .await?;

    redirect_to_client(redirect_uri, &[("code", code.as_str())], params.state.as_deref())
}

fn redirect_to_client(
    redirect_uri: &str,
    pairs: &[(&str, &str)],
    state: Option<&str>,
) -> Result<Response, OAuthError> {
    let mut url = Url::parse(redirect_uri).map_err(|_| {
        OAuthError::InvalidRedirectUri("registered redirect_uri is not an absolute URL".to_string())
    })?;

    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }

    Ok(found(url.as_str()))
}
