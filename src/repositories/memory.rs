//! In-memory provider and title stores
//!
//! Both can be seeded from a JSON catalog snapshot
//! (`{"providers": [...], "titles": [...]}`) and written back to one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::traits::{PruneStats, ProviderListOptions, ProviderRepository, TitleRepository};
use crate::errors::{StorageError, StorageResult};
use crate::models::{
    CatalogItem, MediaSource, MediaType, Provider, ProviderDetails, ProviderRef, Title, TitleDetails,
};
use crate::utils::{Clock, SystemClock};

/// Serialized form of the provider and title stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub titles: Vec<Title>,
}

impl CatalogSnapshot {
    pub async fn load(path: &Path) -> StorageResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            StorageError::unavailable(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        let snapshot: Self = serde_json::from_slice(&bytes)?;
        info!(
            "Loaded catalog snapshot from {}: {} providers, {} titles",
            path.display(),
            snapshot.providers.len(),
            snapshot.titles.len()
        );
        Ok(snapshot)
    }

    /// Write atomically via a temp file
    pub async fn save(&self, path: &Path) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| StorageError::persist_failed("catalog", e.to_string()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| StorageError::persist_failed("catalog", e.to_string()))?;
        debug!("Saved catalog snapshot to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProviderRepository {
    providers: RwLock<BTreeMap<String, Provider>>,
}

impl InMemoryProviderRepository {
    pub fn new<I: IntoIterator<Item = Provider>>(providers: I) -> Self {
        Self {
            providers: RwLock::new(providers.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    /// Insert or replace a provider
    pub async fn put(&self, provider: Provider) {
        self.providers.write().await.insert(provider.id.clone(), provider);
    }

    pub async fn remove(&self, id: &str) -> Option<Provider> {
        self.providers.write().await.remove(id)
    }

    async fn modify(&self, id: &str, f: impl FnOnce(&mut Provider)) -> StorageResult<()> {
        let mut providers = self.providers.write().await;
        let provider = providers.get_mut(id).ok_or_else(|| StorageError::RecordNotFound {
            collection: "providers".to_string(),
            id: id.to_string(),
        })?;
        f(provider);
        Ok(())
    }
}

#[async_trait]
impl ProviderRepository for InMemoryProviderRepository {
    async fn list_enabled(&self, opts: ProviderListOptions) -> StorageResult<Vec<Provider>> {
        let mut providers: Vec<Provider> = self
            .providers
            .read()
            .await
            .values()
            .filter(|p| opts.matches(p))
            .cloned()
            .collect();
        providers.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(providers)
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Provider>> {
        Ok(self.providers.read().await.get(id).cloned())
    }

    async fn list_all(&self) -> StorageResult<Vec<Provider>> {
        Ok(self.providers.read().await.values().cloned().collect())
    }

    async fn update_details(&self, id: &str, details: ProviderDetails) -> StorageResult<()> {
        self.modify(id, |p| p.provider_details = details).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> StorageResult<()> {
        self.modify(id, |p| p.enabled = enabled).await
    }
}

type TitleKey = (MediaType, String);

#[derive(Debug)]
pub struct InMemoryTitleRepository {
    titles: RwLock<BTreeMap<TitleKey, Title>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryTitleRepository {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryTitleRepository {
    pub fn new<I: IntoIterator<Item = Title>>(titles: I) -> Self {
        Self::with_clock(titles, Arc::new(SystemClock))
    }

    pub fn with_clock<I: IntoIterator<Item = Title>>(titles: I, clock: Arc<dyn Clock>) -> Self {
        Self {
            titles: RwLock::new(
                titles
                    .into_iter()
                    .map(|t| ((t.media_type, t.id.clone()), t))
                    .collect(),
            ),
            clock,
        }
    }

    pub async fn put(&self, title: Title) {
        self.titles
            .write()
            .await
            .insert((title.media_type, title.id.clone()), title);
    }

    pub async fn all(&self) -> Vec<Title> {
        self.titles.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TitleRepository for InMemoryTitleRepository {
    async fn find_media(
        &self,
        title_id: &str,
        media_type: MediaType,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> StorageResult<Vec<MediaSource>> {
        let titles = self.titles.read().await;
        Ok(titles
            .get(&(media_type, title_id.to_string()))
            .map(|t| t.media_sources(season, episode).to_vec())
            .unwrap_or_default())
    }

    async fn get(&self, title_id: &str, media_type: MediaType) -> StorageResult<Option<Title>> {
        Ok(self
            .titles
            .read()
            .await
            .get(&(media_type, title_id.to_string()))
            .cloned())
    }

    async fn upsert_catalog_items(&self, items: Vec<CatalogItem>) -> StorageResult<usize> {
        let now = self.clock.utc_now();
        let mut titles = self.titles.write().await;
        let mut touched = HashSet::new();

        for item in items {
            let title_id = item.title_id();
            let key = (item.media_type, title_id.clone());
            let title = titles
                .entry(key.clone())
                .or_insert_with(|| Title::new(title_id, item.media_type, item.name.clone()));
            let before = title.clone();

            title.add_provider_ref(ProviderRef {
                provider_id: item.provider_id.clone(),
                item_id: item.item_id.clone(),
            });
            if let Some(url) = item.stream_url {
                title.add_source(MediaSource::new(item.provider_id, url));
            }
            if *title != before {
                title.updated_at = Some(now);
                touched.insert(key);
            }
        }

        Ok(touched.len())
    }

    async fn list_shows_missing_episodes(&self, limit: usize) -> StorageResult<Vec<Title>> {
        Ok(self
            .titles
            .read()
            .await
            .values()
            .filter(|t| {
                t.media_type == MediaType::Tvshows && t.episodes.is_empty() && !t.provider_refs.is_empty()
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn attach_episodes(
        &self,
        title_id: &str,
        provider_id: &str,
        details: TitleDetails,
    ) -> StorageResult<usize> {
        let now = self.clock.utc_now();
        let mut titles = self.titles.write().await;
        let title = titles
            .get_mut(&(MediaType::Tvshows, title_id.to_string()))
            .ok_or_else(|| StorageError::RecordNotFound {
                collection: "titles".to_string(),
                id: title_id.to_string(),
            })?;

        let before: usize = title.episodes.iter().map(|e| e.sources.len()).sum();
        for episode in details.episodes {
            title.add_episode_source(
                episode.season,
                episode.episode,
                episode.name,
                MediaSource::new(provider_id, episode.stream_url),
            );
        }
        let after: usize = title.episodes.iter().map(|e| e.sources.len()).sum();
        if after != before {
            title.updated_at = Some(now);
        }
        Ok(after - before)
    }

    async fn prune_sources(&self, live_providers: &HashSet<String>) -> StorageResult<PruneStats> {
        let mut titles = self.titles.write().await;
        let mut stats = PruneStats::default();
        let alive = |provider_id: &String| live_providers.contains(provider_id);

        for title in titles.values_mut() {
            let before = title.sources.len();
            title.sources.retain(|s| alive(&s.provider_id));
            stats.sources_removed += before - title.sources.len();

            for episode in &mut title.episodes {
                let before = episode.sources.len();
                episode.sources.retain(|s| alive(&s.provider_id));
                stats.sources_removed += before - episode.sources.len();
            }
            title.episodes.retain(|e| !e.sources.is_empty());
            title.provider_refs.retain(|r| alive(&r.provider_id));
        }

        let before = titles.len();
        titles.retain(|_, title| !title.is_orphaned());
        stats.titles_removed = before - titles.len();
        Ok(stats)
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.titles.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EpisodeDetails, ProviderType};

    fn movie_item(provider_id: &str, item_id: &str, name: &str) -> CatalogItem {
        CatalogItem {
            provider_id: provider_id.into(),
            item_id: item_id.into(),
            media_type: MediaType::Movies,
            name: name.into(),
            external_id: None,
            stream_url: Some(format!("/movie/u/p/{item_id}.mkv")),
            category: None,
        }
    }

    #[tokio::test]
    async fn test_list_enabled_filters_and_orders() {
        let mut disabled = Provider::new("p-disabled", ProviderType::Xtream);
        disabled.enabled = false;
        let mut deleted = Provider::new("p-deleted", ProviderType::Xtream);
        deleted.deleted = true;
        let mut low = Provider::new("p-low", ProviderType::Agtv);
        low.priority = 5;
        let high = Provider::new("p-high", ProviderType::Xtream);

        let repo = InMemoryProviderRepository::new([disabled, deleted, low, high]);
        let ids: Vec<String> = repo
            .list_enabled(ProviderListOptions::default())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["p-high", "p-low"]);

        let xtream = repo
            .list_enabled(ProviderListOptions::of_type(ProviderType::Xtream))
            .await
            .unwrap();
        assert_eq!(xtream.len(), 1);
        assert_eq!(repo.list_all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_catalog_items_merge_across_providers() {
        let repo = InMemoryTitleRepository::default();
        let changed = repo
            .upsert_catalog_items(vec![
                movie_item("p1", "10", "Heat"),
                movie_item("p2", "77", "heat"),
            ])
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let sources = repo.find_media("heat", MediaType::Movies, None, None).await.unwrap();
        assert_eq!(sources.len(), 2);

        // a second identical sync changes nothing
        let changed = repo
            .upsert_catalog_items(vec![movie_item("p1", "10", "Heat")])
            .await
            .unwrap();
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn test_attach_episodes_and_lookup() {
        let repo = InMemoryTitleRepository::default();
        repo.upsert_catalog_items(vec![CatalogItem {
            provider_id: "p1".into(),
            item_id: "900".into(),
            media_type: MediaType::Tvshows,
            name: "Show".into(),
            external_id: Some("55".into()),
            stream_url: None,
            category: None,
        }])
        .await
        .unwrap();

        let missing = repo.list_shows_missing_episodes(10).await.unwrap();
        assert_eq!(missing.len(), 1);

        let added = repo
            .attach_episodes(
                "tmdb-55",
                "p1",
                TitleDetails {
                    item_id: "900".into(),
                    plot: None,
                    episodes: vec![EpisodeDetails {
                        season: 1,
                        episode: 1,
                        name: None,
                        stream_url: "/series/u/p/9001.mkv".into(),
                    }],
                },
            )
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert!(repo.list_shows_missing_episodes(10).await.unwrap().is_empty());
        assert_eq!(
            repo.find_media("tmdb-55", MediaType::Tvshows, Some(1), Some(1))
                .await
                .unwrap(),
            vec![MediaSource::new("p1", "/series/u/p/9001.mkv")]
        );
    }

    #[tokio::test]
    async fn test_prune_drops_dead_providers_and_orphans() {
        let repo = InMemoryTitleRepository::default();
        repo.upsert_catalog_items(vec![
            movie_item("p1", "1", "Shared"),
            movie_item("p2", "2", "Shared"),
            movie_item("p2", "3", "Only Dead"),
        ])
        .await
        .unwrap();

        let live: HashSet<String> = ["p1".to_string()].into();
        let stats = repo.prune_sources(&live).await.unwrap();

        assert_eq!(stats.sources_removed, 2);
        assert_eq!(stats.titles_removed, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        let snapshot = CatalogSnapshot {
            providers: vec![Provider::new("p1", ProviderType::Xtream)],
            titles: vec![Title::new("heat", MediaType::Movies, "Heat")],
        };
        snapshot.save(&path).await.unwrap();

        let loaded = CatalogSnapshot::load(&path).await.unwrap();
        assert_eq!(loaded.providers, snapshot.providers);
        assert_eq!(loaded.titles, snapshot.titles);
    }
}
