use crate::db::{Store, StoreError};
use crate::models::ModuleDefinition;
use async_trait::async_trait;
use service_core::error::AppError;
use service_core::identity::{Clock, ModuleId, ModuleRegistry, RegistryError};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Authoritative, uncached license lookups straight from the store.
#[derive(Clone)]
pub struct StoreRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl StoreRegistry {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Modules the tenant holds an active grant for right now. Empty for a
    /// missing or suspended tenant.
    pub async fn licensed_modules(&self, tenant_id: Uuid) -> Result<Vec<ModuleId>, StoreError> {
        match self.store.find_tenant(tenant_id).await? {
            Some(tenant) if tenant.is_active() => {}
            _ => return Ok(Vec::new()),
        }

        let now = self.clock.now();
        let mut modules: Vec<ModuleId> = self
            .store
            .list_grants(tenant_id)
            .await?
            .into_iter()
            .filter(|g| g.is_active_at(now))
            .map(|g| g.module_id)
            .collect();
        modules.sort();
        modules.dedup();
        Ok(modules)
    }

    pub async fn check(&self, tenant_id: Uuid, module: ModuleId) -> Result<bool, StoreError> {
        match self.store.find_tenant(tenant_id).await? {
            Some(tenant) if tenant.is_active() => {}
            _ => return Ok(false),
        }

        let now = self.clock.now();
        Ok(self
            .store
            .find_grant(tenant_id, module)
            .await?
            .is_some_and(|g| g.is_active_at(now)))
    }

    pub async fn list_modules(&self) -> Result<Vec<ModuleDefinition>, StoreError> {
        self.store.list_modules().await
    }
}

#[async_trait]
impl ModuleRegistry for StoreRegistry {
    async fn is_module_licensed(
        &self,
        tenant_id: Uuid,
        module: ModuleId,
    ) -> Result<bool, RegistryError> {
        self.check(tenant_id, module)
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    }
}

/// Cross-check the stored module catalog and client registrations against
/// the compiled `ModuleId` enum. Unknown ids abort startup; enum variants
/// with no catalog entry are only reported.
pub async fn validate_catalog(store: &dyn Store) -> Result<(), AppError> {
    let definitions = store.list_modules().await?;

    let mut known = BTreeSet::new();
    for definition in &definitions {
        let module = definition.module_id.parse::<ModuleId>().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Module catalog is out of sync: {}", e))
        })?;
        known.insert(module);
    }

    for module in ModuleId::ALL {
        if !known.contains(&module) {
            tracing::warn!(module_id = %module, "Module has no catalog definition");
        }
    }

    // Client rows are parsed into `ModuleId` on load, so an unknown module
    // surfaces here as a corrupt record.
    let clients = store.list_clients().await.map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Client registry is out of sync: {}", e))
    })?;
    for client in &clients {
        if !known.contains(&client.module_id) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Client '{}' references module '{}' which has no catalog definition",
                client.client_id,
                client.module_id
            )));
        }
    }

    tracing::info!(
        modules = definitions.len(),
        clients = clients.len(),
        "Module catalog validated"
    );
    Ok(())
}
