use serde::Serialize;
use uuid::Uuid;

/// A person who can sign in to the issuer. Belongs to exactly one tenant.
#[derive(Clone)]
pub struct User {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    /// Stored lowercased; unique across the issuer.
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub enabled: bool,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("tenant_id", &self.tenant_id)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Public view of a user, safe to return from `/userinfo`.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            sub: user.user_id,
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            name: user.display_name.clone(),
            roles: user.roles.clone(),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
