//! Development seed data for the in-memory store.

use crate::db::MemoryStore;
use crate::models::{
    Client, GrantStatus, ModuleDefinition, ModuleGrant, Tenant, TenantStatus, User,
    normalize_email,
};
use crate::utils::password::{Password, hash_password};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use service_core::identity::ModuleId;
use service_core::utils::hash_secret;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Deserialize, Default)]
pub struct SeedFile {
    #[serde(default)]
    pub tenants: Vec<SeedTenant>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
    #[serde(default)]
    pub clients: Vec<SeedClient>,
    #[serde(default)]
    pub grants: Vec<SeedGrant>,
}

#[derive(Debug, Deserialize)]
pub struct SeedTenant {
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub status: TenantStatus,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    /// Plaintext; hashed on load. Dev only.
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedClient {
    pub client_id: String,
    pub module_id: ModuleId,
    /// Plaintext; hashed on load. Dev only.
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedGrant {
    pub tenant_id: Uuid,
    pub module_id: ModuleId,
    pub plan: String,
    #[serde(default)]
    pub status: GrantStatus,
    #[serde(default)]
    pub expires_utc: Option<DateTime<Utc>>,
}

impl SeedFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to read seed file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid seed file {}: {}", path.display(), e))
        })
    }

    pub fn apply(self, store: &MemoryStore) -> Result<(), AppError> {
        let counts = (
            self.tenants.len(),
            self.users.len(),
            self.clients.len(),
            self.grants.len(),
        );

        for tenant in self.tenants {
            store.insert_tenant(Tenant {
                tenant_id: tenant.tenant_id,
                name: tenant.name,
                status: tenant.status,
                created_utc: Utc::now(),
            })?;
        }

        for user in self.users {
            let password_hash = hash_password(&Password::new(user.password))?;
            store.insert_user(User {
                user_id: user.user_id,
                tenant_id: user.tenant_id,
                email: normalize_email(&user.email),
                password_hash: password_hash.into_string(),
                display_name: user.display_name,
                roles: user.roles,
                enabled: true,
            })?;
        }

        for module in self.modules {
            store.insert_module(module)?;
        }

        for client in self.clients {
            store.insert_client(Client {
                client_id: client.client_id,
                module_id: client.module_id,
                client_secret_hash: hash_secret(&client.client_secret),
                redirect_uris: client.redirect_uris,
                enabled: true,
            })?;
        }

        for grant in self.grants {
            store.upsert_grant(ModuleGrant {
                tenant_id: grant.tenant_id,
                module_id: grant.module_id,
                plan: grant.plan,
                status: grant.status,
                expires_utc: grant.expires_utc,
            })?;
        }

        tracing::info!(
            tenants = counts.0,
            users = counts.1,
            clients = counts.2,
            grants = counts.3,
            "Seed data loaded"
        );
        Ok(())
    }
}
