use serde::Serialize;
use service_core::identity::ModuleId;

/// A registered module application. Each module instance authenticates to
/// the issuer as exactly one confidential client.
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub client_id: String,
    pub module_id: ModuleId,
    #[serde(skip_serializing)]
    pub client_secret_hash: String,
    pub redirect_uris: Vec<String>,
    pub enabled: bool,
}

impl Client {
    /// Exact string comparison; no prefix, wildcard or normalization rules.
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}
