//! Re-authenticate providers and record their connection budget
//!
//! A provider that fails authentication is marked inactive, and disabled
//! outright when `providers.disable_on_auth_failure` is set. Either way its
//! cached selector decisions are dropped. The provider snapshot is reloaded
//! after every run.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{JobServices, cancelled, is_cancellation};
use crate::job_scheduling::{JobContext, JobHandler};
use crate::models::ProviderDetails;
use crate::repositories::ProviderListOptions;

#[derive(Debug, Default, Serialize)]
struct ProviderRefreshSummary {
    refreshed: Vec<String>,
    unavailable: Vec<String>,
    disabled: Vec<String>,
    skipped: usize,
}

pub struct ProviderRefreshJob {
    services: Arc<JobServices>,
}

impl ProviderRefreshJob {
    pub fn new(services: Arc<JobServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobHandler for ProviderRefreshJob {
    async fn execute(&self, ctx: JobContext) -> anyhow::Result<Value> {
        let repo = &self.services.providers;
        let providers = repo.list_enabled(ProviderListOptions::default()).await?;
        let mut summary = ProviderRefreshSummary::default();

        for provider in providers {
            ctx.checkpoint()?;
            let Ok(client) = self.services.clients.get(provider.provider_type) else {
                debug!(provider_id = %provider.id, provider_type = %provider.provider_type, "No client, skipping refresh");
                summary.skipped += 1;
                continue;
            };

            match client.authenticate(&ctx.token, &provider).await {
                Ok(details) => {
                    debug!(
                        provider_id = %provider.id,
                        max_connections = details.max_connections,
                        active_connections = details.active_connections,
                        "Provider refreshed"
                    );
                    repo.update_details(&provider.id, details).await?;
                    summary.refreshed.push(provider.id);
                }
                Err(e) if is_cancellation(&e) => return Err(cancelled(&ctx)),
                Err(e) => {
                    warn!(provider_id = %provider.id, error = %e, "Provider authentication failed");
                    let details = ProviderDetails {
                        active: false,
                        ..provider.provider_details.clone()
                    };
                    repo.update_details(&provider.id, details).await?;
                    if self.services.config.disable_on_auth_failure {
                        repo.set_enabled(&provider.id, false).await?;
                        warn!(provider_id = %provider.id, "Provider disabled after authentication failure");
                        summary.disabled.push(provider.id.clone());
                    }
                    self.services.decisions.invalidate_provider(&provider.id);
                    summary.unavailable.push(provider.id);
                }
            }
        }

        self.services.provider_cache.invalidate().await;
        info!(
            refreshed = summary.refreshed.len(),
            unavailable = summary.unavailable.len(),
            disabled = summary.disabled.len(),
            "Provider refresh finished"
        );
        Ok(serde_json::to_value(summary)?)
    }
}
