//! Candidate materialization, ordering and load scoring
//!
//! A candidate is one concrete `(provider, absolute URL)` pair. The selector
//! builds them from a title's sources, orders them deterministically, scores
//! them by load and health (lower is better), then rotates near-ties so
//! equally good providers share the traffic.

use lru::LruCache;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::health_tracker::HealthTracker;
use super::provider_cache::ProviderSnapshot;
use crate::models::{MediaSource, Provider, ProviderType};
use crate::utils::url::{is_absolute, join_base, obfuscate_credentials};

const PENALTY_PER_502: f64 = 10_000.0;
const BONUS_PER_FREE_CONNECTION: f64 = 100.0;
const HIGH_UTILIZATION: f64 = 0.8;
const HIGH_UTILIZATION_PENALTY: f64 = 500.0;
const PENALTY_PER_RECENT_SELECTION: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: Arc<Provider>,
    pub url: String,
    pub load_score: f64,
}

impl Candidate {
    pub fn new(provider: Arc<Provider>, url: String) -> Self {
        Self {
            provider,
            url,
            load_score: 0.0,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider.id
    }
}

/// Resolve sources into candidates
///
/// Absolute URLs are used as-is; root-relative paths are joined with every
/// stream base of their provider. Sources whose provider is unknown,
/// disabled or deleted are dropped, as are duplicate pairs.
pub fn materialize(sources: &[MediaSource], providers: &ProviderSnapshot) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for source in sources {
        let Some(provider) = providers.get(&source.provider_id) else {
            debug!(provider_id = %source.provider_id, "Dropping source of unknown provider");
            continue;
        };
        if !provider.is_usable() {
            debug!(provider_id = %provider.id, "Dropping source of disabled or deleted provider");
            continue;
        }

        let urls: Vec<String> = if is_absolute(&source.url) {
            vec![source.url.clone()]
        } else if source.url.starts_with('/') {
            provider
                .streams_urls
                .iter()
                .map(|base| join_base(base, &source.url))
                .collect()
        } else {
            debug!(
                provider_id = %provider.id,
                url = %obfuscate_credentials(&source.url),
                "Dropping source with unusable URL"
            );
            Vec::new()
        };

        for url in urls {
            if seen.insert((provider.id.clone(), url.clone())) {
                candidates.push(Candidate::new(Arc::clone(provider), url));
            }
        }
    }

    candidates
}

/// Deterministic pre-scoring order
///
/// Type rank first, then connection availability (descending) between two
/// Xtream providers, then priority, then provider id.
pub fn order(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| compare_initial(&a.provider, &b.provider));
}

fn compare_initial(a: &Provider, b: &Provider) -> Ordering {
    a.provider_type
        .rank()
        .cmp(&b.provider_type.rank())
        .then_with(|| {
            if a.provider_type == ProviderType::Xtream && b.provider_type == ProviderType::Xtream {
                b.provider_details
                    .availability()
                    .total_cmp(&a.provider_details.availability())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.id.cmp(&b.id))
}

/// Load score of one provider; lower is better
pub fn load_score(provider: &Provider, health: &HealthTracker) -> f64 {
    let mut score = PENALTY_PER_502 * health.recent_502_count(&provider.id) as f64;

    match provider.provider_type {
        ProviderType::Xtream => {
            let details = &provider.provider_details;
            score -= BONUS_PER_FREE_CONNECTION * details.free_connections() as f64;
            if details.utilization() > HIGH_UTILIZATION {
                score += HIGH_UTILIZATION_PENALTY;
            }
        }
        ProviderType::Agtv => {
            score += PENALTY_PER_RECENT_SELECTION * health.recent_selection_count(&provider.id) as f64;
        }
        ProviderType::Unknown => {}
    }

    score
}

/// Score every candidate and sort by score; equal scores fall back to
/// priority, then provider id
pub fn score_and_rank(candidates: &mut [Candidate], health: &HealthTracker) {
    for candidate in candidates.iter_mut() {
        candidate.load_score = load_score(&candidate.provider, health);
    }
    candidates.sort_by(|a, b| {
        a.load_score
            .total_cmp(&b.load_score)
            .then_with(|| a.provider.priority.cmp(&b.provider.priority))
            .then_with(|| a.provider.id.cmp(&b.provider.id))
    });
}

/// Number of leading candidates within `window` points of the best score
pub fn tie_group_len(candidates: &[Candidate], window: f64) -> usize {
    let Some(best) = candidates.first().map(|c| c.load_score) else {
        return 0;
    };
    candidates
        .iter()
        .take_while(|c| c.load_score - best <= window)
        .count()
}

/// Per-title rotation pointers for near-tied candidates
#[derive(Debug)]
pub struct RoundRobin {
    pointers: Mutex<LruCache<String, usize>>,
}

impl RoundRobin {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            pointers: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Pick the next of `group_len` tied candidates for `key`
    pub fn next_index(&self, key: &str, group_len: usize) -> usize {
        if group_len <= 1 {
            return 0;
        }
        let mut pointers = self.pointers.lock().unwrap_or_else(|e| e.into_inner());
        let index = pointers.get(key).copied().unwrap_or(0) % group_len;
        pointers.put(key.to_string(), index + 1);
        index
    }

    /// Rotate the tie group of `candidates` and move the pick to the front
    pub fn apply(&self, key: &str, candidates: &mut [Candidate], window: f64) {
        let group = tie_group_len(candidates, window);
        let index = self.next_index(key, group);
        if index > 0 {
            let chosen = candidates[index].provider_id().to_string();
            candidates[..=index].rotate_right(1);
            debug!(key = %key, provider_id = %chosen, tied = group, "Round-robin moved candidate to front");
        }
    }
}
