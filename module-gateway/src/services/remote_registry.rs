use crate::services::issuer_client::IssuerApi;
use async_trait::async_trait;
use service_core::identity::{ModuleId, ModuleRegistry, RegistryError};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::IssuerError;

/// The issuer's registry endpoint seen as a [`ModuleRegistry`]. Wrapped in a
/// `CachedRegistry` by the license gate.
#[derive(Clone)]
pub struct RemoteRegistry {
    issuer: Arc<dyn IssuerApi>,
}

impl RemoteRegistry {
    pub fn new(issuer: Arc<dyn IssuerApi>) -> Self {
        Self { issuer }
    }
}

#[async_trait]
impl ModuleRegistry for RemoteRegistry {
    async fn is_module_licensed(
        &self,
        tenant_id: Uuid,
        module: ModuleId,
    ) -> Result<bool, RegistryError> {
        self.issuer
            .check_license(tenant_id, module)
            .await
            .map_err(|e| match e {
                IssuerError::Timeout => RegistryError::Timeout,
                other => RegistryError::Unavailable(other.to_string()),
            })
    }
}
