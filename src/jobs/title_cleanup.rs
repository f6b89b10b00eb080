//! Drop sources of deleted or vanished providers, then empty titles

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::JobServices;
use crate::job_scheduling::{JobContext, JobHandler};

pub struct TitleCleanupJob {
    services: Arc<JobServices>,
}

impl TitleCleanupJob {
    pub fn new(services: Arc<JobServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for TitleCleanupJob {
    async fn execute(&self, ctx: JobContext) -> anyhow::Result<Value> {
        // disabled providers keep their sources; they may come back
        let live: HashSet<String> = self
            .services
            .providers
            .list_all()
            .await?
            .into_iter()
            .filter(|p| !p.deleted)
            .map(|p| p.id)
            .collect();
        ctx.checkpoint()?;

        let stats = self.services.titles.prune_sources(&live).await?;
        info!(
            sources_removed = stats.sources_removed,
            titles_removed = stats.titles_removed,
            "Title cleanup finished"
        );
        Ok(serde_json::to_value(stats)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvidersConfig;
    use crate::jobs::testing::{context, fixture, xtream};
    use crate::models::{MediaSource, MediaType, ProviderRef, Title};
    use crate::repositories::TitleRepository;

    fn title(id: &str, providers: &[&str]) -> Title {
        let mut title = Title::new(id, MediaType::Movies, id);
        for provider_id in providers {
            title.add_provider_ref(ProviderRef {
                provider_id: provider_id.to_string(),
                item_id: "1".into(),
            });
            title.add_source(MediaSource::new(*provider_id, "/movie/u/p/1.mp4"));
        }
        title
    }

    #[tokio::test]
    async fn test_prunes_deleted_and_absent_providers() {
        let mut deleted = xtream("gone");
        deleted.deleted = true;
        let mut disabled = xtream("paused");
        disabled.enabled = false;
        let fx = fixture(vec![xtream("live"), deleted, disabled], ProvidersConfig::default());
        fx.titles.put(title("shared", &["live", "gone"])).await;
        fx.titles.put(title("orphan", &["gone", "absent"])).await;
        fx.titles.put(title("paused-only", &["paused"])).await;

        let result = TitleCleanupJob::new(fx.services.clone())
            .execute(context("title_cleanup"))
            .await
            .unwrap();

        assert_eq!(result["sources_removed"], 3);
        assert_eq!(result["titles_removed"], 1);
        assert_eq!(fx.titles.count().await.unwrap(), 2);
        assert!(fx.titles.get("orphan", MediaType::Movies).await.unwrap().is_none());
    }
}
