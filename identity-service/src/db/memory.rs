use super::{DirectoryStore, GrantStore, RotationOutcome, Store, StoreError, TokenStore};
use crate::models::{
    AuthorizationCode, Client, GrantStatus, ModuleDefinition, ModuleGrant, RefreshToken, Tenant,
    TenantStatus, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::identity::ModuleId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    tenants: HashMap<Uuid, Tenant>,
    users: HashMap<Uuid, User>,
    clients: BTreeMap<String, Client>,
    modules: BTreeMap<String, ModuleDefinition>,
    grants: HashMap<(Uuid, ModuleId), ModuleGrant>,
    codes: HashMap<String, AuthorizationCode>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

/// In-process store for development and tests.
///
/// All tables sit behind one lock, so code consumption and refresh rotation
/// are atomic with respect to every other operation.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Tables>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.0
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.0
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    // Seeding and administration. These back the dev seed file and tests;
    // the issuer itself never creates tenants, users, clients or grants.

    pub fn insert_tenant(&self, tenant: Tenant) -> Result<(), StoreError> {
        self.write()?.tenants.insert(tenant.tenant_id, tenant);
        Ok(())
    }

    pub fn set_tenant_status(&self, tenant_id: Uuid, status: TenantStatus) -> Result<(), StoreError> {
        if let Some(tenant) = self.write()?.tenants.get_mut(&tenant_id) {
            tenant.status = status;
        }
        Ok(())
    }

    pub fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.write()?.users.insert(user.user_id, user);
        Ok(())
    }

    pub fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        self.write()?.clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    pub fn insert_module(&self, module: ModuleDefinition) -> Result<(), StoreError> {
        self.write()?.modules.insert(module.module_id.clone(), module);
        Ok(())
    }

    pub fn upsert_grant(&self, grant: ModuleGrant) -> Result<(), StoreError> {
        self.write()?
            .grants
            .insert((grant.tenant_id, grant.module_id), grant);
        Ok(())
    }

    pub fn set_grant_status(
        &self,
        tenant_id: Uuid,
        module_id: ModuleId,
        status: GrantStatus,
    ) -> Result<(), StoreError> {
        if let Some(grant) = self.write()?.grants.get_mut(&(tenant_id, module_id)) {
            grant.status = status;
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.read()?.tenants.get(&tenant_id).cloned())
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.read()?.clients.get(client_id).cloned())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        Ok(self.read()?.clients.values().cloned().collect())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_authorization_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        self.write()?.codes.insert(code.code_hash.clone(), code);
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self.write()?.codes.remove(code_hash))
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        self.write()?
            .refresh_tokens
            .insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.read()?.refresh_tokens.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        presented_hash: &str,
        successor: RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, StoreError> {
        let mut tables = self.write()?;

        let Some(existing) = tables.refresh_tokens.get_mut(presented_hash) else {
            return Ok(RotationOutcome::Missing);
        };

        if existing.is_dead() {
            return Ok(RotationOutcome::Dead {
                previous: existing.clone(),
            });
        }
        if existing.expires_utc <= now {
            return Ok(RotationOutcome::Expired {
                previous: existing.clone(),
            });
        }

        existing.rotated_utc = Some(now);
        let previous = existing.clone();
        tables
            .refresh_tokens
            .insert(successor.token_hash.clone(), successor);

        Ok(RotationOutcome::Rotated { previous })
    }

    async fn revoke_refresh_family(
        &self,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let mut revoked = 0;

        for token in tables
            .refresh_tokens
            .values_mut()
            .filter(|t| t.family_id == family_id && t.revoked_utc.is_none())
        {
            token.revoked_utc = Some(now);
            revoked += 1;
        }

        Ok(revoked)
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn list_modules(&self) -> Result<Vec<ModuleDefinition>, StoreError> {
        Ok(self.read()?.modules.values().cloned().collect())
    }

    async fn list_grants(&self, tenant_id: Uuid) -> Result<Vec<ModuleGrant>, StoreError> {
        let mut grants: Vec<ModuleGrant> = self
            .read()?
            .grants
            .values()
            .filter(|g| g.tenant_id == tenant_id)
            .cloned()
            .collect();
        grants.sort_by_key(|g| g.module_id);
        Ok(grants)
    }

    async fn find_grant(
        &self,
        tenant_id: Uuid,
        module_id: ModuleId,
    ) -> Result<Option<ModuleGrant>, StoreError> {
        Ok(self.read()?.grants.get(&(tenant_id, module_id)).cloned())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}
