//! Provider client trait definitions
//!
//! A [`ProviderClient`] speaks one upstream dialect. Jobs use it to refresh
//! catalogs and account state; the selector only needs its probe method.
//! Every call takes the caller's cancellation token and returns
//! [`ProviderError::Cancelled`](crate::errors::ProviderError::Cancelled)
//! as soon as it is flipped.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderResult;
use crate::models::{CatalogItem, MediaType, ProbeMethod, Provider, ProviderDetails, ProviderType, TitleDetails};

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The dialect this client speaks
    fn provider_type(&self) -> ProviderType;

    /// List everything the provider offers for one media type
    async fn fetch_catalog(
        &self,
        token: &CancellationToken,
        provider: &Provider,
        media_type: MediaType,
    ) -> ProviderResult<Vec<CatalogItem>>;

    /// Fetch the details of one item, including episodes for shows
    async fn fetch_details(
        &self,
        token: &CancellationToken,
        provider: &Provider,
        media_type: MediaType,
        item_id: &str,
    ) -> ProviderResult<TitleDetails>;

    /// Check the account and report its connection budget
    ///
    /// Fails with `ProviderError::Unavailable` when the provider rejects the
    /// credentials or reports the account as not active.
    async fn authenticate(
        &self,
        token: &CancellationToken,
        provider: &Provider,
    ) -> ProviderResult<ProviderDetails>;

    fn probe_method(&self) -> ProbeMethod {
        self.provider_type().probe_method()
    }
}
