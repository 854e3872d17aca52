use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Opaque, rotating refresh token record.
///
/// `family_id` is shared by every token descended from one authorization
/// code exchange; presenting a rotated or revoked member kills the family.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token_id: Uuid,
    pub token_hash: String,
    pub family_id: Uuid,
    pub client_id: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub rotated_utc: Option<DateTime<Utc>>,
    pub revoked_utc: Option<DateTime<Utc>>,
}

impl RefreshToken {
    /// Rotated or revoked: a replay of this token is treated as theft.
    pub fn is_dead(&self) -> bool {
        self.rotated_utc.is_some() || self.revoked_utc.is_some()
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_dead() && self.expires_utc > now
    }
}
