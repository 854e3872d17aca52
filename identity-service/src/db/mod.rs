//! Persistence traits for the issuer and their two implementations.
//!
//! Every operation that must be atomic against concurrent requests
//! (authorization-code consumption, refresh rotation, family revocation) is a
//! single trait method so each backend can make it atomic in its own way.
pub mod memory;
pub mod postgres;

use crate::models::{
    AuthorizationCode, Client, ModuleDefinition, ModuleGrant, RefreshToken, Tenant, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::identity::ModuleId;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a compare-and-swap refresh rotation.
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// The presented token was live; it is now rotated and the successor stored.
    Rotated { previous: RefreshToken },
    /// The presented token had already been rotated or revoked.
    Dead { previous: RefreshToken },
    Expired { previous: RefreshToken },
    Missing,
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// `email` must already be normalized.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_authorization_code(&self, code: AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically remove and return the code. A second call for the same
    /// hash returns `None`.
    async fn consume_authorization_code(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError>;

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Mark the presented token rotated and store `successor`, only if the
    /// presented token is still live at `now`. Exactly one of any number of
    /// concurrent callers presenting the same token gets `Rotated`.
    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        successor: RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, StoreError>;

    /// Revoke every not-yet-revoked token in the family. Returns how many
    /// records changed.
    async fn revoke_refresh_family(
        &self,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn list_modules(&self) -> Result<Vec<ModuleDefinition>, StoreError>;

    async fn list_grants(&self, tenant_id: Uuid) -> Result<Vec<ModuleGrant>, StoreError>;

    async fn find_grant(
        &self,
        tenant_id: Uuid,
        module_id: ModuleId,
    ) -> Result<Option<ModuleGrant>, StoreError>;
}

/// Everything the issuer needs from persistence.
#[async_trait]
pub trait Store: DirectoryStore + TokenStore + GrantStore + 'static {
    async fn ping(&self) -> Result<(), StoreError>;
}
