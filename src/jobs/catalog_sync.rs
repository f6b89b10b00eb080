//! Pull every enabled provider's catalog into the title store

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use super::{JobServices, cancelled, is_cancellation};
use crate::config::defaults::CANCELLATION_CHECK_EVERY;
use crate::job_scheduling::{JobContext, JobHandler};
use crate::models::MediaType;
use crate::repositories::ProviderListOptions;

#[derive(Debug, Default, Serialize)]
struct CatalogSyncSummary {
    providers_synced: usize,
    providers_skipped: usize,
    items_fetched: usize,
    titles_changed: usize,
    fetch_errors: usize,
}

pub struct CatalogSyncJob {
    services: Arc<JobServices>,
}

impl CatalogSyncJob {
    pub fn new(services: Arc<JobServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for CatalogSyncJob {
    async fn execute(&self, ctx: JobContext) -> anyhow::Result<Value> {
        let providers = self
            .services
            .providers
            .list_enabled(ProviderListOptions::default())
            .await?;
        let mut summary = CatalogSyncSummary::default();

        for provider in providers {
            ctx.checkpoint()?;
            let client = match self.services.clients.get(provider.provider_type) {
                Ok(client) => client,
                Err(e) => {
                    debug!(provider_id = %provider.id, "Skipping catalog sync: {}", e);
                    summary.providers_skipped += 1;
                    continue;
                }
            };

            for media_type in MediaType::iter() {
                ctx.checkpoint()?;
                let items = match client.fetch_catalog(&ctx.token, &provider, media_type).await {
                    Ok(items) => items,
                    Err(e) if is_cancellation(&e) => return Err(cancelled(&ctx)),
                    Err(e) => {
                        warn!(
                            provider_id = %provider.id,
                            media_type = %media_type,
                            error = %e,
                            "Catalog fetch failed"
                        );
                        summary.fetch_errors += 1;
                        continue;
                    }
                };

                summary.items_fetched += items.len();
                for batch in items.chunks(CANCELLATION_CHECK_EVERY) {
                    ctx.checkpoint()?;
                    summary.titles_changed += self.services.titles.upsert_catalog_items(batch.to_vec()).await?;
                }
                debug!(
                    provider_id = %provider.id,
                    media_type = %media_type,
                    items = items.len(),
                    "Catalog fetched"
                );
            }
            summary.providers_synced += 1;
        }

        info!(
            providers = summary.providers_synced,
            items = summary.items_fetched,
            changed = summary.titles_changed,
            errors = summary.fetch_errors,
            "Catalog sync finished"
        );
        Ok(serde_json::to_value(summary)?)
    }
}
