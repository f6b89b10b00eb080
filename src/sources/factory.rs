//! Provider client factory
//!
//! Maps a provider type to the client that speaks its dialect. New dialects
//! are added by registering another client; callers never match on types.

use std::collections::HashMap;
use std::sync::Arc;

use super::traits::ProviderClient;
use super::xtream::XtreamClient;
use crate::config::Config;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::ProviderType;

#[derive(Clone, Default)]
pub struct ProviderClientFactory {
    clients: HashMap<ProviderType, Arc<dyn ProviderClient>>,
}

impl ProviderClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every built-in client registered
    ///
    /// AGTV exposes no catalog API, so only Xtream has a client.
    pub fn with_defaults(config: &Config) -> ProviderResult<Self> {
        let xtream = XtreamClient::new(config.providers.request_timeout, &config.prober.user_agent)?;
        Ok(Self::new().register(Arc::new(xtream)))
    }

    /// Register (or replace) the client for its provider type
    pub fn register(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.insert(client.provider_type(), client);
        self
    }

    /// Client for a provider type
    ///
    /// # Errors
    /// `ProviderError::Unsupported` when no client speaks the dialect
    pub fn get(&self, provider_type: ProviderType) -> ProviderResult<Arc<dyn ProviderClient>> {
        self.clients
            .get(&provider_type)
            .cloned()
            .ok_or_else(|| ProviderError::Unsupported {
                provider_type: provider_type.to_string(),
            })
    }

    pub fn supports(&self, provider_type: ProviderType) -> bool {
        self.clients.contains_key(&provider_type)
    }
}

impl std::fmt::Debug for ProviderClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClientFactory")
            .field("types", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}
