//! Fill in episode lists for shows that have none yet

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{JobServices, cancelled, is_cancellation};
use crate::job_scheduling::{JobContext, JobHandler};
use crate::models::MediaType;

#[derive(Debug, Default, Serialize)]
struct DetailsRefreshSummary {
    shows_checked: usize,
    episodes_added: usize,
    fetch_errors: usize,
}

pub struct DetailsRefreshJob {
    services: Arc<JobServices>,
}

impl DetailsRefreshJob {
    pub fn new(services: Arc<JobServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for DetailsRefreshJob {
    async fn execute(&self, ctx: JobContext) -> anyhow::Result<Value> {
        let batch = self.services.config.details_batch_size;
        let shows = self.services.titles.list_shows_missing_episodes(batch).await?;
        let providers = self.services.provider_cache.snapshot().await?;
        let mut summary = DetailsRefreshSummary::default();

        for show in shows {
            ctx.checkpoint()?;
            summary.shows_checked += 1;

            for provider_ref in &show.provider_refs {
                let Some(provider) = providers
                    .get(&provider_ref.provider_id)
                    .filter(|p| p.is_usable())
                else {
                    continue;
                };
                let Ok(client) = self.services.clients.get(provider.provider_type) else {
                    continue;
                };

                match client
                    .fetch_details(&ctx.token, provider, MediaType::Tvshows, &provider_ref.item_id)
                    .await
                {
                    Ok(details) => {
                        let added = self
                            .services
                            .titles
                            .attach_episodes(&show.id, &provider.id, details)
                            .await?;
                        debug!(title_id = %show.id, provider_id = %provider.id, added, "Episodes attached");
                        summary.episodes_added += added;
                    }
                    Err(e) if is_cancellation(&e) => return Err(cancelled(&ctx)),
                    Err(e) => {
                        warn!(
                            title_id = %show.id,
                            provider_id = %provider.id,
                            error = %e,
                            "Details fetch failed"
                        );
                        summary.fetch_errors += 1;
                    }
                }
            }
        }

        info!(
            shows = summary.shows_checked,
            episodes = summary.episodes_added,
            errors = summary.fetch_errors,
            "Details refresh finished"
        );
        Ok(serde_json::to_value(summary)?)
    }
}
