//! Service layer for upstream source selection
//!
//! Services sit between the repositories and the callers (jobs, CLI):
//! - `HealthTracker`: recent 502s and selections per provider
//! - `DecisionCache`: per-user memo of the last winning choice
//! - `UrlProber`: bounded validation of one candidate URL
//! - `ProviderCache`: read-mostly provider snapshot
//! - `SourceSelector`: the candidate pipeline that ties them together

pub mod candidates;
pub mod decision_cache;
pub mod health_tracker;
pub mod provider_cache;
pub mod source_selector;
pub mod url_prober;

pub use candidates::{Candidate, RoundRobin};
pub use decision_cache::{Decision, DecisionCache};
pub use health_tracker::{BAD_GATEWAY, HealthTracker, ProviderHealth};
pub use provider_cache::{ProviderCache, ProviderSnapshot};
pub use source_selector::{Selection, SourceRequest, SourceSelector};
pub use url_prober::{ProbeFailure, ProbeResult, ProbeStats, ProbeStatsSnapshot, Prober, UrlProber};
