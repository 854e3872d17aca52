use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Single-use code bound to the client, redirect URI, user and tenant it was
/// issued for. Only the SHA-256 of the code is stored.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code_hash: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc <= now
    }
}
