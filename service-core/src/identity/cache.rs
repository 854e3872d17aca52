use super::clock::{Clock, SystemClock};
use super::module_id::ModuleId;
use super::registry::{ModuleRegistry, RegistryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    licensed: bool,
    expires_at: DateTime<Utc>,
}

/// Short-TTL memo of license decisions keyed by (tenant, module).
///
/// Grants and denials share one TTL, so a revoked grant may be honored, and a
/// new grant refused, for at most `ttl` after the change.
#[derive(Clone)]
pub struct LicenseCache {
    entries: Arc<DashMap<(Uuid, ModuleId), CacheEntry>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl LicenseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(45)),
            clock,
        }
    }

    pub fn get(&self, tenant_id: Uuid, module: ModuleId) -> Option<bool> {
        let key = (tenant_id, module);
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(&key)
            && entry.expires_at > now
        {
            return Some(entry.licensed);
        }

        self.entries.remove_if(&key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn insert(&self, tenant_id: Uuid, module: ModuleId, licensed: bool) {
        let expires_at = self.clock.now() + self.ttl;
        self.entries
            .insert((tenant_id, module), CacheEntry { licensed, expires_at });
    }
}

/// Registry decorator that bounds every lookup with a timeout and memoizes
/// answers in a [`LicenseCache`]. Failures are returned, never cached.
pub struct CachedRegistry<R> {
    inner: R,
    cache: LicenseCache,
    timeout: Duration,
}

impl<R: ModuleRegistry> CachedRegistry<R> {
    pub fn new(inner: R, cache: LicenseCache, timeout: Duration) -> Self {
        Self {
            inner,
            cache,
            timeout,
        }
    }
}

#[async_trait]
impl<R: ModuleRegistry> ModuleRegistry for CachedRegistry<R> {
    async fn is_module_licensed(
        &self,
        tenant_id: Uuid,
        module: ModuleId,
    ) -> Result<bool, RegistryError> {
        if let Some(licensed) = self.cache.get(tenant_id, module) {
            return Ok(licensed);
        }

        let licensed = tokio::time::timeout(
            self.timeout,
            self.inner.is_module_licensed(tenant_id, module),
        )
        .await
        .map_err(|_| RegistryError::Timeout)??;

        self.cache.insert(tenant_id, module, licensed);
        Ok(licensed)
    }
}
