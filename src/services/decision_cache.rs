//! Short-lived memo of the selector's winning choice per user and title

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::SelectorConfig;
use crate::utils::{Clock, SystemClock};

/// A cached `(provider, url)` decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub provider_id: String,
    pub url: String,
    pub cached_at: Instant,
}

/// TTL-bounded LRU of decisions keyed by `user|mediaType|titleId|season|episode`
#[derive(Debug)]
pub struct DecisionCache {
    entries: Mutex<LruCache<String, Decision>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DecisionCache {
    pub fn new(config: &SelectorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &SelectorConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: config.cache_ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Decision>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fresh(&self, decision: &Decision, now: Instant) -> bool {
        now.saturating_duration_since(decision.cached_at) < self.ttl
    }

    /// Fresh decision for `key`; expired entries are dropped on the way
    pub fn get(&self, key: &str) -> Option<Decision> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let decision = entries.get(key).cloned()?;
        if self.is_fresh(&decision, now) {
            Some(decision)
        } else {
            entries.pop(key);
            None
        }
    }

    pub fn insert(&self, key: String, provider_id: &str, url: &str) {
        let decision = Decision {
            provider_id: provider_id.to_string(),
            url: url.to_string(),
            cached_at: self.clock.now(),
        };
        self.lock().put(key, decision);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().pop(key).is_some()
    }

    /// Drop every decision pointing at `provider_id`
    pub fn invalidate_provider(&self, provider_id: &str) -> usize {
        let mut entries = self.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, d)| d.provider_id == provider_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        if !stale.is_empty() {
            debug!(provider_id = %provider_id, dropped = stale.len(), "Invalidated cached decisions");
        }
        stale.len()
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, d)| !self.is_fresh(d, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn cache(capacity: usize) -> (DecisionCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = SelectorConfig {
            cache_capacity: capacity,
            ..SelectorConfig::default()
        };
        (DecisionCache::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let (cache, clock) = cache(10);
        cache.insert("u1|movies|t1|-|-".into(), "p1", "http://a/1");

        clock.advance(Duration::from_secs(29));
        assert_eq!(cache.get("u1|movies|t1|-|-").unwrap().provider_id, "p1");

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("u1|movies|t1|-|-").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (cache, _clock) = cache(2);
        cache.insert("a".into(), "p1", "u");
        cache.insert("b".into(), "p1", "u");
        cache.get("a");
        cache.insert("c".into(), "p1", "u");

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_provider_and_purge() {
        let (cache, clock) = cache(10);
        cache.insert("a".into(), "p1", "u");
        cache.insert("b".into(), "p2", "u");
        assert_eq!(cache.invalidate_provider("p1"), 1);
        assert!(cache.get("a").is_none());

        clock.advance(Duration::from_secs(31));
        assert_eq!(cache.purge_expired(), 1);
        assert!(!cache.invalidate("b"));
    }
}
