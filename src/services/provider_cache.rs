//! Read-mostly snapshot of provider configuration
//!
//! Loaded lazily from the provider store and replaced wholesale on
//! [`ProviderCache::invalidate`]. Disabled and deleted providers stay in the
//! snapshot so candidate materialization can tell "dropped" from "unknown".

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::StorageResult;
use crate::models::Provider;
use crate::repositories::ProviderRepository;

pub type ProviderSnapshot = Arc<HashMap<String, Arc<Provider>>>;

pub struct ProviderCache {
    repo: Arc<dyn ProviderRepository>,
    snapshot: RwLock<Option<ProviderSnapshot>>,
}

impl ProviderCache {
    pub fn new(repo: Arc<dyn ProviderRepository>) -> Self {
        Self {
            repo,
            snapshot: RwLock::new(None),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ProviderRepository> {
        &self.repo
    }

    /// Current snapshot, loading it on first use or after invalidation
    pub async fn snapshot(&self) -> StorageResult<ProviderSnapshot> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let mut slot = self.snapshot.write().await;
        if let Some(snapshot) = slot.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let providers = self.repo.list_all().await?;
        debug!(providers = providers.len(), "Loaded provider snapshot");
        let snapshot: ProviderSnapshot = Arc::new(
            providers
                .into_iter()
                .map(|p| (p.id.clone(), Arc::new(p)))
                .collect(),
        );
        *slot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub async fn get(&self, id: &str) -> StorageResult<Option<Arc<Provider>>> {
        Ok(self.snapshot().await?.get(id).cloned())
    }

    /// Drop the snapshot; the next read reloads it
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
        debug!("Provider snapshot invalidated");
    }
}

impl std::fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderType;
    use crate::repositories::InMemoryProviderRepository;

    #[tokio::test]
    async fn test_snapshot_is_reused_until_invalidated() {
        let repo = Arc::new(InMemoryProviderRepository::new([Provider::new("p1", ProviderType::Xtream)]));
        let cache = ProviderCache::new(repo.clone());

        assert!(cache.get("p1").await.unwrap().is_some());
        repo.put(Provider::new("p2", ProviderType::Agtv)).await;
        assert!(cache.get("p2").await.unwrap().is_none());

        cache.invalidate().await;
        assert!(cache.get("p2").await.unwrap().is_some());
    }
}
