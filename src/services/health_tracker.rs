//! Per-provider health signals for the source selector
//!
//! Two rolling windows per provider: error events (HTTP status, with network
//! failures recorded as 502) and successful selections. Both live behind one
//! lock so every read-modify-write of a provider's ring is atomic.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{HealthConfig, SelectorConfig};
use crate::utils::{Clock, SystemClock};

/// Status recorded for 502s and network failures
pub const BAD_GATEWAY: u16 = 502;

#[derive(Debug, Clone, Copy)]
struct ErrorEvent {
    at: Instant,
    status: u16,
}

#[derive(Debug, Default)]
struct HealthState {
    errors: HashMap<String, VecDeque<ErrorEvent>>,
    selections: HashMap<String, VecDeque<Instant>>,
}

/// Health summary of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub recent_502: usize,
    pub retained_errors: usize,
    pub recent_selections: usize,
}

#[derive(Debug)]
pub struct HealthTracker {
    state: Mutex<HealthState>,
    error_window: Duration,
    selection_window: Duration,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl HealthTracker {
    pub fn new(selector: &SelectorConfig, health: &HealthConfig) -> Self {
        Self::with_clock(selector, health, Arc::new(SystemClock))
    }

    pub fn with_clock(selector: &SelectorConfig, health: &HealthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(HealthState::default()),
            error_window: selector.error_window,
            selection_window: selector.selection_window,
            // never drop events the scorer still needs
            retention: health.retention.max(selector.error_window),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HealthState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn within(now: Instant, at: Instant, window: Duration) -> bool {
        now.saturating_duration_since(at) < window
    }

    pub fn record_error(&self, provider_id: &str, status: u16) {
        let now = self.clock.now();
        let retention = self.retention;
        let mut state = self.lock();
        let ring = state.errors.entry(provider_id.to_string()).or_default();
        while ring.front().is_some_and(|e| !Self::within(now, e.at, retention)) {
            ring.pop_front();
        }
        ring.push_back(ErrorEvent { at: now, status });
        debug!(provider_id = %provider_id, status, retained = ring.len(), "Recorded provider error");
    }

    /// 502s (and network failures) inside the error window
    pub fn recent_502_count(&self, provider_id: &str) -> usize {
        let now = self.clock.now();
        self.lock().errors.get(provider_id).map_or(0, |ring| {
            ring.iter()
                .filter(|e| e.status == BAD_GATEWAY && Self::within(now, e.at, self.error_window))
                .count()
        })
    }

    pub fn record_selection(&self, provider_id: &str) {
        let now = self.clock.now();
        let window = self.selection_window;
        let mut state = self.lock();
        let ring = state.selections.entry(provider_id.to_string()).or_default();
        while ring.front().is_some_and(|at| !Self::within(now, *at, window)) {
            ring.pop_front();
        }
        ring.push_back(now);
    }

    /// Selections inside the selection window
    pub fn recent_selection_count(&self, provider_id: &str) -> usize {
        let now = self.clock.now();
        self.lock().selections.get(provider_id).map_or(0, |ring| {
            ring.iter()
                .filter(|at| Self::within(now, **at, self.selection_window))
                .count()
        })
    }

    /// Drop error events past retention and stale selections
    ///
    /// # Returns
    ///
    /// The number of events dropped
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.lock();
        let mut dropped = 0;

        for ring in state.errors.values_mut() {
            let before = ring.len();
            ring.retain(|e| Self::within(now, e.at, self.retention));
            dropped += before - ring.len();
        }
        state.errors.retain(|_, ring| !ring.is_empty());

        for ring in state.selections.values_mut() {
            let before = ring.len();
            ring.retain(|at| Self::within(now, *at, self.selection_window));
            dropped += before - ring.len();
        }
        state.selections.retain(|_, ring| !ring.is_empty());

        dropped
    }

    /// Sweep every `interval` until `token` is cancelled
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let dropped = self.sweep();
                    debug!(dropped, "Health sweep finished");
                }
            }
        }
    }

    /// Health of every provider with retained events, sorted by id
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let mut ids: Vec<String> = {
            let state = self.lock();
            state
                .errors
                .keys()
                .chain(state.selections.keys())
                .cloned()
                .collect()
        };
        ids.sort();
        ids.dedup();

        ids.into_iter()
            .map(|provider_id| ProviderHealth {
                recent_502: self.recent_502_count(&provider_id),
                retained_errors: self.lock().errors.get(&provider_id).map_or(0, VecDeque::len),
                recent_selections: self.recent_selection_count(&provider_id),
                provider_id,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn tracker() -> (HealthTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let tracker = HealthTracker::with_clock(
            &SelectorConfig::default(),
            &HealthConfig::default(),
            clock.clone(),
        );
        (tracker, clock)
    }

    #[test]
    fn test_502s_age_out_of_the_error_window() {
        let (tracker, clock) = tracker();
        tracker.record_error("p1", BAD_GATEWAY);
        tracker.record_error("p1", 404);
        assert_eq!(tracker.recent_502_count("p1"), 1);
        assert_eq!(tracker.recent_502_count("p2"), 0);

        clock.advance(Duration::from_secs(59));
        assert_eq!(tracker.recent_502_count("p1"), 1);

        clock.advance(Duration::from_secs(2));
        assert_eq!(tracker.recent_502_count("p1"), 0);
    }

    #[test]
    fn test_sweep_honours_retention() {
        let (tracker, clock) = tracker();
        tracker.record_error("p1", BAD_GATEWAY);
        tracker.record_selection("p1");

        clock.advance(Duration::from_secs(120));
        // the selection is stale, the error is retained for five minutes
        assert_eq!(tracker.sweep(), 1);
        assert_eq!(tracker.snapshot()[0].retained_errors, 1);

        clock.advance(Duration::from_secs(200));
        assert_eq!(tracker.sweep(), 1);
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn test_selection_window() {
        let (tracker, clock) = tracker();
        tracker.record_selection("agtv");
        tracker.record_selection("agtv");
        assert_eq!(tracker.recent_selection_count("agtv"), 2);

        clock.advance(Duration::from_secs(61));
        tracker.record_selection("agtv");
        assert_eq!(tracker.recent_selection_count("agtv"), 1);
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_events() {
        let tracker = Arc::new(HealthTracker::new(&SelectorConfig::default(), &HealthConfig::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record_error("p1", BAD_GATEWAY);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.recent_502_count("p1"), 800);
    }
}
