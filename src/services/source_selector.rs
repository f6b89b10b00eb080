//! Picks one working upstream URL for a title or channel
//!
//! Pipeline per request:
//! 1. return a fresh cached decision unless its provider has recent 502s
//! 2. materialize candidates from the title's sources and provider bases
//! 3. order deterministically, score by load and health, rotate near-ties
//! 4. race the first few candidates, cancelling the losers on the first win
//! 5. fall back to the rest one at a time
//!
//! A winning choice is cached per user and counted toward the provider's
//! selection history. Exhausting every candidate yields `None`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::candidates::{self, Candidate, RoundRobin};
use super::decision_cache::DecisionCache;
use super::health_tracker::{BAD_GATEWAY, HealthTracker};
use super::provider_cache::ProviderCache;
use super::url_prober::{ProbeResult, Prober};
use crate::config::SelectorConfig;
use crate::models::MediaType;
use crate::observability::AppObservability;
use crate::repositories::TitleRepository;
use crate::utils::url::obfuscate_credentials;

/// What to play and for whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub title_id: String,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub username: String,
}

fn part(value: Option<u32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl SourceRequest {
    pub fn new<T: Into<String>, U: Into<String>>(title_id: T, media_type: MediaType, username: U) -> Self {
        Self {
            title_id: title_id.into(),
            media_type,
            season: None,
            episode: None,
            username: username.into(),
        }
    }

    pub fn with_episode(mut self, season: u32, episode: u32) -> Self {
        self.season = Some(season);
        self.episode = Some(episode);
        self
    }

    /// `mediaType|titleId|season|episode`, shared by every user
    pub fn title_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.media_type,
            self.title_id,
            part(self.season),
            part(self.episode)
        )
    }

    /// Per-user decision cache key
    pub fn cache_key(&self) -> String {
        format!("{}|{}", self.username, self.title_key())
    }
}

/// The chosen upstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub provider_id: String,
    pub url: String,
    pub from_cache: bool,
    pub probe: Option<ProbeResult>,
}

pub struct SourceSelector {
    titles: Arc<dyn TitleRepository>,
    providers: Arc<ProviderCache>,
    prober: Arc<dyn Prober>,
    health: Arc<HealthTracker>,
    cache: Arc<DecisionCache>,
    round_robin: RoundRobin,
    config: SelectorConfig,
    observability: Option<AppObservability>,
}

impl SourceSelector {
    pub fn new(
        config: SelectorConfig,
        titles: Arc<dyn TitleRepository>,
        providers: Arc<ProviderCache>,
        prober: Arc<dyn Prober>,
        health: Arc<HealthTracker>,
    ) -> Self {
        Self {
            cache: Arc::new(DecisionCache::new(&config)),
            round_robin: RoundRobin::new(config.cache_capacity),
            titles,
            providers,
            prober,
            health,
            config,
            observability: None,
        }
    }

    /// Share a decision cache with other writers (provider refresh)
    pub fn with_decision_cache(mut self, cache: Arc<DecisionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_observability(mut self, observability: AppObservability) -> Self {
        self.observability = Some(observability);
        self
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn cache(&self) -> &Arc<DecisionCache> {
        &self.cache
    }

    pub fn providers(&self) -> &Arc<ProviderCache> {
        &self.providers
    }

    /// URL of the best working source, or `None`
    pub async fn get_best_source(&self, request: &SourceRequest, token: &CancellationToken) -> Option<String> {
        self.select(request, token).await.map(|selection| selection.url)
    }

    /// Like [`get_best_source`](Self::get_best_source) but with details of
    /// the choice
    pub async fn select(&self, request: &SourceRequest, token: &CancellationToken) -> Option<Selection> {
        if request.username.is_empty() {
            warn!(title_id = %request.title_id, "Source request without a username");
            return None;
        }

        let cache_key = request.cache_key();
        if let Some(hit) = self.cached(&cache_key).await {
            return Some(hit);
        }

        let sources = match self
            .titles
            .find_media(&request.title_id, request.media_type, request.season, request.episode)
            .await
        {
            Ok(sources) => sources,
            Err(e) => {
                warn!(title_id = %request.title_id, error = %e, "Failed to load title sources");
                return None;
            }
        };
        let providers = match self.providers.snapshot().await {
            Ok(providers) => providers,
            Err(e) => {
                warn!(error = %e, "Failed to load providers");
                return None;
            }
        };

        let mut candidates = candidates::materialize(&sources, &providers);
        if candidates.is_empty() {
            info!(title_id = %request.title_id, media_type = %request.media_type, "No candidates for title");
            return None;
        }
        candidates::order(&mut candidates);
        candidates::score_and_rank(&mut candidates, &self.health);
        self.round_robin
            .apply(&request.title_key(), &mut candidates, self.config.tie_window);

        debug!(
            title_id = %request.title_id,
            candidates = candidates.len(),
            best_score = candidates[0].load_score,
            "Probing candidates"
        );

        let race_len = self.config.race_width.min(candidates.len());
        let (raced, rest) = candidates.split_at(race_len);
        let winner = match self.race(raced, token).await {
            Some(winner) => Some(winner),
            None => self.sequential(rest, token).await,
        };

        let Some((candidate, probe)) = winner else {
            info!(title_id = %request.title_id, tried = candidates.len(), "No working source");
            return None;
        };

        self.cache
            .insert(cache_key, candidate.provider_id(), &candidate.url);
        self.health.record_selection(candidate.provider_id());
        info!(
            title_id = %request.title_id,
            provider_id = %candidate.provider_id(),
            url = %obfuscate_credentials(&candidate.url),
            score = candidate.load_score,
            "Selected source"
        );

        Some(Selection {
            provider_id: candidate.provider_id().to_string(),
            url: candidate.url,
            from_cache: false,
            probe: Some(probe),
        })
    }

    async fn cached(&self, cache_key: &str) -> Option<Selection> {
        let decision = self.cache.get(cache_key)?;
        let recent_502 = self.health.recent_502_count(&decision.provider_id);
        let usable = matches!(
            self.providers.get(&decision.provider_id).await,
            Ok(Some(provider)) if provider.is_usable()
        );
        if recent_502 > 0 || !usable {
            debug!(
                key = %cache_key,
                provider_id = %decision.provider_id,
                recent_502,
                usable,
                "Cached decision invalidated"
            );
            self.cache.invalidate(cache_key);
            return None;
        }

        debug!(key = %cache_key, provider_id = %decision.provider_id, "Decision cache hit");
        Some(Selection {
            provider_id: decision.provider_id,
            url: decision.url,
            from_cache: true,
            probe: None,
        })
    }

    /// Probe `raced` concurrently; the first valid result wins and the
    /// remaining probes are cancelled before returning
    async fn race(&self, raced: &[Candidate], token: &CancellationToken) -> Option<(Candidate, ProbeResult)> {
        if raced.is_empty() {
            return None;
        }

        let race_token = token.child_token();
        let mut probes = JoinSet::new();
        for (index, candidate) in raced.iter().enumerate() {
            let prober = Arc::clone(&self.prober);
            let url = candidate.url.clone();
            let provider_type = candidate.provider.provider_type;
            let probe_token = race_token.clone();
            probes.spawn(async move { (index, prober.probe(&url, provider_type, &probe_token).await) });
        }

        let mut winner = None;
        while let Some(joined) = probes.join_next().await {
            let Ok((index, result)) = joined else {
                continue;
            };
            let candidate = &raced[index];
            self.observe(candidate, &result);
            if result.is_valid {
                winner = Some((candidate.clone(), result));
                break;
            }
        }

        race_token.cancel();
        probes.shutdown().await;
        winner
    }

    async fn sequential(&self, rest: &[Candidate], token: &CancellationToken) -> Option<(Candidate, ProbeResult)> {
        for candidate in rest {
            if token.is_cancelled() {
                return None;
            }
            let result = self
                .prober
                .probe(&candidate.url, candidate.provider.provider_type, token)
                .await;
            self.observe(candidate, &result);
            if result.is_valid {
                return Some((candidate.clone(), result));
            }
        }
        None
    }

    /// Log a probe outcome and feed failures into the health ring
    fn observe(&self, candidate: &Candidate, result: &ProbeResult) {
        let outcome = result.outcome_label();
        if result.counts_as_bad_gateway() {
            self.health.record_error(candidate.provider_id(), BAD_GATEWAY);
        }
        if let Some(observability) = &self.observability {
            observability.record_probe_outcome(candidate.provider_id(), &outcome);
        }
        info!(
            provider_id = %candidate.provider_id(),
            url = %obfuscate_credentials(&candidate.url),
            outcome = %outcome,
            valid = result.is_valid,
            elapsed_ms = result.response_time.as_millis() as u64,
            "Probe outcome"
        );
    }

    /// Drop every cached decision for a provider and reload provider config
    pub async fn invalidate_provider(&self, provider_id: &str) {
        self.cache.invalidate_provider(provider_id);
        self.providers.invalidate().await;
    }

    /// Periodically drop expired decisions and aged health events
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let events = self.health.sweep();
                    let decisions = self.cache.purge_expired();
                    debug!(events, decisions, "Selector sweep finished");
                }
            }
        }
    }
}

impl std::fmt::Debug for SourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSelector")
            .field("config", &self.config)
            .field("cached_decisions", &self.cache.len())
            .finish_non_exhaustive()
    }
}
