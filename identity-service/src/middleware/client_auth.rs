use crate::AppState;
use crate::db::Store;
use crate::handlers::error::OAuthError;
use crate::models::Client;
use axum::{extract::FromRequestParts, http::HeaderMap, http::request::Parts};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Basic};
use service_core::middleware::{KeyedRateLimiter, charge};
use service_core::utils::verify_secret;

pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ClientCredentials {
    /// HTTP Basic takes precedence; otherwise both form fields must be set.
    /// Using both mechanisms at once is rejected.
    pub fn resolve(
        headers: &HeaderMap,
        form_client_id: Option<&str>,
        form_client_secret: Option<&str>,
    ) -> Result<Self, OAuthError> {
        if let Some(Authorization(basic)) = headers.typed_get::<Authorization<Basic>>() {
            if form_client_secret.is_some() {
                return Err(OAuthError::InvalidRequest(
                    "multiple client authentication methods".to_string(),
                ));
            }
            return Ok(Self {
                client_id: basic.username().to_string(),
                client_secret: basic.password().to_string(),
            });
        }

        match (form_client_id, form_client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() => Ok(Self {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => Err(OAuthError::InvalidClient(
                "client authentication required".to_string(),
            )),
        }
    }
}

/// Look up the client and check its secret in constant time.
pub async fn authenticate_client(
    store: &dyn Store,
    credentials: &ClientCredentials,
) -> Result<Client, OAuthError> {
    let Some(client) = store.find_client(&credentials.client_id).await? else {
        tracing::warn!(client_id = %credentials.client_id, "Unknown client");
        return Err(OAuthError::InvalidClient("client authentication failed".to_string()));
    };

    if !verify_secret(&credentials.client_secret, &client.client_secret_hash) {
        tracing::warn!(client_id = %credentials.client_id, "Client secret mismatch");
        return Err(OAuthError::InvalidClient("client authentication failed".to_string()));
    }

    if !client.enabled {
        return Err(OAuthError::UnauthorizedClient("client is disabled".to_string()));
    }

    Ok(client)
}

/// Charge one back-channel call to an authenticated client's budget.
pub fn throttle_client(limiter: &KeyedRateLimiter<String>, client: &Client) -> Result<(), OAuthError> {
    charge(limiter, &client.client_id).map_err(|wait| {
        tracing::warn!(client_id = %client.client_id, "Client rate limit exceeded");
        OAuthError::TooManyRequests(wait.as_secs().max(1))
    })
}

/// Client authenticated by HTTP Basic, for endpoints without a form body.
pub struct AuthenticatedClient(pub Client);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedClient {
    type Rejection = OAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credentials = ClientCredentials::resolve(&parts.headers, None, None)?;
        let client = authenticate_client(state.store.as_ref(), &credentials).await?;
        Ok(AuthenticatedClient(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header};

    fn basic(id: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.typed_insert(Authorization::basic(id, secret));
        headers
    }

    #[test]
    fn test_basic_credentials() {
        let creds = ClientCredentials::resolve(&basic("crm", "s3cret"), None, None).unwrap();
        assert_eq!(creds.client_id, "crm");
        assert_eq!(creds.client_secret, "s3cret");
    }

    #[test]
    fn test_form_credentials() {
        let creds = ClientCredentials::resolve(&HeaderMap::new(), Some("hr"), Some("x")).unwrap();
        assert_eq!(creds.client_id, "hr");
    }

    #[test]
    fn test_both_methods_rejected() {
        let err = ClientCredentials::resolve(&basic("crm", "a"), Some("crm"), Some("a")).unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn test_missing_credentials() {
        let err = ClientCredentials::resolve(&HeaderMap::new(), Some("crm"), None).unwrap_err();
        assert_eq!(err.code(), "invalid_client");

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        let err = ClientCredentials::resolve(&headers, None, None).unwrap_err();
        assert_eq!(err.code(), "invalid_client");
    }
}
