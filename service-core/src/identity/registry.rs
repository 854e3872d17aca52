use super::module_id::ModuleId;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    #[error("registry lookup timed out")]
    Timeout,
}

/// Authoritative answer to "does this tenant hold an active grant for this
/// module right now?".
#[async_trait]
pub trait ModuleRegistry: Send + Sync + 'static {
    async fn is_module_licensed(
        &self,
        tenant_id: Uuid,
        module: ModuleId,
    ) -> Result<bool, RegistryError>;
}

#[async_trait]
impl<T: ModuleRegistry + ?Sized> ModuleRegistry for Arc<T> {
    async fn is_module_licensed(
        &self,
        tenant_id: Uuid,
        module: ModuleId,
    ) -> Result<bool, RegistryError> {
        (**self).is_module_licensed(tenant_id, module).await
    }
}
