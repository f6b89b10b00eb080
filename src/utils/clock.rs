//! Monotonic and wall-clock time sources
//!
//! Everything that ages data (error rings, decision cache, selection history)
//! reads time through [`Clock`] so tests can move time by hand. The system
//! clock is built on `tokio::time::Instant`, which also honours
//! `tokio::time::pause()` in async tests.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic instant used for ageing and deadlines
    fn now(&self) -> Instant;

    /// Wall-clock time used for persisted timestamps
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Clock backed by the tokio timer and the system wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for deterministic tests
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(Instant, DateTime<Utc>)>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new((Instant::now(), Utc::now())),
        }
    }

    /// Move both clocks forward
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.0 += by;
        state.1 += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_both_time_sources() {
        let clock = ManualClock::new();
        let start = clock.now();
        let start_utc = clock.utc_now();

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now() - start, Duration::from_secs(90));
        assert_eq!((clock.utc_now() - start_utc).num_seconds(), 90);
    }

    #[test]
    fn test_manual_clock_is_frozen_between_advances() {
        let clock = ManualClock::new();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.now(), a);
    }
}
