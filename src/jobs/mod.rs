//! Built-in job bodies
//!
//! Each job is a [`JobHandler`] registered under a fixed name. Descriptors
//! in the configuration decide whether and when they run; a descriptor for a
//! name with no body here fails engine construction.

use std::sync::Arc;

use crate::config::ProvidersConfig;
use crate::errors::{JobError, ProviderError};
use crate::job_scheduling::{JobContext, JobHandler};
use crate::repositories::{ProviderRepository, TitleRepository};
use crate::services::{DecisionCache, ProviderCache};
use crate::sources::ProviderClientFactory;

pub mod catalog_sync;
pub mod details_refresh;
pub mod provider_refresh;
pub mod title_cleanup;

pub use catalog_sync::CatalogSyncJob;
pub use details_refresh::DetailsRefreshJob;
pub use provider_refresh::ProviderRefreshJob;
pub use title_cleanup::TitleCleanupJob;

pub const CATALOG_SYNC: &str = "catalog_sync";
pub const DETAILS_REFRESH: &str = "details_refresh";
pub const PROVIDER_REFRESH: &str = "provider_refresh";
pub const TITLE_CLEANUP: &str = "title_cleanup";

/// Stores, clients and caches shared by the built-in jobs
pub struct JobServices {
    pub providers: Arc<dyn ProviderRepository>,
    pub titles: Arc<dyn TitleRepository>,
    pub clients: ProviderClientFactory,
    pub provider_cache: Arc<ProviderCache>,
    pub decisions: Arc<DecisionCache>,
    pub config: ProvidersConfig,
}

impl std::fmt::Debug for JobServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobServices")
            .field("clients", &self.clients)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Every built-in body keyed by job name
pub fn builtin_handlers(services: Arc<JobServices>) -> Vec<(String, Arc<dyn JobHandler>)> {
    vec![
        (
            CATALOG_SYNC.to_string(),
            Arc::new(CatalogSyncJob::new(Arc::clone(&services))) as Arc<dyn JobHandler>,
        ),
        (
            DETAILS_REFRESH.to_string(),
            Arc::new(DetailsRefreshJob::new(Arc::clone(&services))),
        ),
        (
            PROVIDER_REFRESH.to_string(),
            Arc::new(ProviderRefreshJob::new(Arc::clone(&services))),
        ),
        (TITLE_CLEANUP.to_string(), Arc::new(TitleCleanupJob::new(services))),
    ]
}

/// Turn a provider call's cancellation into the job's own
fn cancelled(ctx: &JobContext) -> anyhow::Error {
    JobError::Cancelled {
        name: ctx.name.clone(),
    }
    .into()
}

fn is_cancellation(error: &ProviderError) -> bool {
    matches!(error, ProviderError::Cancelled)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider client and job fixtures

    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use super::JobServices;
    use crate::config::{ProvidersConfig, SelectorConfig};
    use crate::errors::{ProviderError, ProviderResult};
    use crate::job_scheduling::{JobContext, TriggerContext};
    use crate::models::{CatalogItem, MediaType, Provider, ProviderDetails, ProviderType, TitleDetails};
    use crate::repositories::{InMemoryProviderRepository, InMemoryTitleRepository};
    use crate::services::{DecisionCache, ProviderCache};
    use crate::sources::{ProviderClient, ProviderClientFactory};

    #[derive(Default)]
    pub struct ScriptedClient {
        pub catalogs: Mutex<HashMap<(String, MediaType), Vec<CatalogItem>>>,
        pub details: Mutex<HashMap<(String, String), TitleDetails>>,
        pub accounts: Mutex<HashMap<String, ProviderDetails>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn called(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedClient {
        fn provider_type(&self) -> ProviderType {
            ProviderType::Xtream
        }

        async fn fetch_catalog(
            &self,
            token: &CancellationToken,
            provider: &Provider,
            media_type: MediaType,
        ) -> ProviderResult<Vec<CatalogItem>> {
            if token.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            self.called(format!("catalog:{}:{media_type}", provider.id));
            Ok(self
                .catalogs
                .lock()
                .unwrap()
                .get(&(provider.id.clone(), media_type))
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_details(
            &self,
            _token: &CancellationToken,
            provider: &Provider,
            _media_type: MediaType,
            item_id: &str,
        ) -> ProviderResult<TitleDetails> {
            self.called(format!("details:{}:{item_id}", provider.id));
            self.details
                .lock()
                .unwrap()
                .get(&(provider.id.clone(), item_id.to_string()))
                .cloned()
                .ok_or_else(|| ProviderError::Http {
                    status: 404,
                    message: "Not Found".into(),
                })
        }

        async fn authenticate(&self, _token: &CancellationToken, provider: &Provider) -> ProviderResult<ProviderDetails> {
            self.called(format!("auth:{}", provider.id));
            self.accounts
                .lock()
                .unwrap()
                .get(&provider.id)
                .cloned()
                .ok_or_else(|| ProviderError::unavailable(&provider.id, "account expired"))
        }
    }

    pub fn xtream(id: &str) -> Provider {
        Provider {
            username: Some("u".into()),
            password: Some("p".into()),
            streams_urls: vec![format!("http://{id}.example")],
            ..Provider::new(id, ProviderType::Xtream)
        }
    }

    pub struct Fixture {
        pub services: Arc<JobServices>,
        pub providers: Arc<InMemoryProviderRepository>,
        pub titles: Arc<InMemoryTitleRepository>,
        pub client: Arc<ScriptedClient>,
    }

    pub fn fixture(providers: Vec<Provider>, config: ProvidersConfig) -> Fixture {
        let provider_repo = Arc::new(InMemoryProviderRepository::new(providers));
        let titles = Arc::new(InMemoryTitleRepository::default());
        let client = Arc::new(ScriptedClient::default());
        let services = Arc::new(JobServices {
            providers: provider_repo.clone(),
            titles: titles.clone(),
            clients: ProviderClientFactory::new().register(client.clone()),
            provider_cache: Arc::new(ProviderCache::new(provider_repo.clone())),
            decisions: Arc::new(DecisionCache::new(&SelectorConfig::default())),
            config,
        });
        Fixture {
            services,
            providers: provider_repo,
            titles,
            client,
        }
    }

    pub fn context(name: &str) -> JobContext {
        JobContext {
            name: name.into(),
            run_id: Uuid::new_v4(),
            token: CancellationToken::new(),
            trigger: TriggerContext::manual(None),
            deadline: None,
        }
    }
}
