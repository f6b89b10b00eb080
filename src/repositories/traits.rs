//! Repository trait definitions
//!
//! The job engine and the source selector only ever talk to storage through
//! these traits, so the backing store (in-memory, JSON file, a real database)
//! stays swappable and tests can inject failing stores.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::errors::StorageResult;
use crate::models::{
    CatalogItem, JobRecord, JobRecordPatch, MediaSource, MediaType, Provider, ProviderDetails,
    ProviderType, Title, TitleDetails,
};

/// Persisted per-job history
///
/// All writes for a given job name come from a single engine writer, so
/// implementations only need to make each call atomic.
#[async_trait]
pub trait JobHistoryRepository: Send + Sync {
    /// Latest record for a job
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - The job has history
    /// * `Ok(None)` - The job never ran
    /// * `Err(StorageError)` - The store could not be read
    async fn get_last(&self, name: &str) -> StorageResult<Option<JobRecord>>;

    /// Apply `patch` to the job's record, creating an idle record first if
    /// needed, and return the result
    async fn upsert(&self, name: &str, patch: JobRecordPatch) -> StorageResult<JobRecord>;

    /// Rewrite every `running` record to `cancelled`
    ///
    /// # Returns
    ///
    /// The number of records rewritten
    async fn reset_running_to_cancelled(&self) -> StorageResult<usize>;

    /// All records, ordered by name
    async fn list(&self) -> StorageResult<Vec<JobRecord>>;
}

/// Filters for [`ProviderRepository::list_enabled`]
#[derive(Debug, Clone, Default)]
pub struct ProviderListOptions {
    pub provider_type: Option<ProviderType>,
}

impl ProviderListOptions {
    pub fn of_type(provider_type: ProviderType) -> Self {
        Self {
            provider_type: Some(provider_type),
        }
    }

    pub fn matches(&self, provider: &Provider) -> bool {
        provider.is_usable()
            && self
                .provider_type
                .is_none_or(|wanted| wanted == provider.provider_type)
    }
}

/// Provider configuration store
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// Enabled, non-deleted providers matching `opts`, ordered by priority
    async fn list_enabled(&self, opts: ProviderListOptions) -> StorageResult<Vec<Provider>>;

    async fn get(&self, id: &str) -> StorageResult<Option<Provider>>;

    /// Every provider including disabled and deleted ones
    async fn list_all(&self) -> StorageResult<Vec<Provider>>;

    /// Replace the provider's reported account state
    async fn update_details(&self, id: &str, details: ProviderDetails) -> StorageResult<()>;

    async fn set_enabled(&self, id: &str, enabled: bool) -> StorageResult<()>;
}

/// Outcome of a source prune
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PruneStats {
    pub sources_removed: usize,
    pub titles_removed: usize,
}

/// Consolidated title store
#[async_trait]
pub trait TitleRepository: Send + Sync {
    /// Sources attached to a movie, channel or show episode
    ///
    /// # Returns
    ///
    /// An empty list when the title or the episode is unknown
    async fn find_media(
        &self,
        title_id: &str,
        media_type: MediaType,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> StorageResult<Vec<MediaSource>>;

    async fn get(&self, title_id: &str, media_type: MediaType) -> StorageResult<Option<Title>>;

    /// Merge a provider's catalog items into the consolidated titles
    ///
    /// # Returns
    ///
    /// The number of titles created or changed
    async fn upsert_catalog_items(&self, items: Vec<CatalogItem>) -> StorageResult<usize>;

    /// Shows that are listed by some provider but have no episodes yet
    async fn list_shows_missing_episodes(&self, limit: usize) -> StorageResult<Vec<Title>>;

    /// Attach the episodes of one provider's details to a show
    ///
    /// # Returns
    ///
    /// The number of episode sources added
    async fn attach_episodes(
        &self,
        title_id: &str,
        provider_id: &str,
        details: TitleDetails,
    ) -> StorageResult<usize>;

    /// Drop sources whose provider is not in `live_providers`, then titles
    /// left with nothing to play
    async fn prune_sources(&self, live_providers: &HashSet<String>) -> StorageResult<PruneStats>;

    async fn count(&self) -> StorageResult<usize>;
}
