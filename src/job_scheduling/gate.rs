//! Admission control for job executions
//!
//! One map of running job names guards both rules: a job never runs twice
//! at once (single-flight) and never overlaps a job it conflicts with.
//! Both checks and the insert happen under one lock so two concurrent
//! admissions cannot both succeed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

type RunningMap = HashMap<String, CancellationToken>;

/// Why admission was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denied {
    AlreadyRunning,
    /// Names of the running conflicting jobs, sorted
    BlockedBy(Vec<String>),
}

/// Single-flight and conflict gate keyed by job name
#[derive(Debug, Default)]
pub struct JobGate {
    running: Arc<Mutex<RunningMap>>,
    conflicts: HashMap<String, HashSet<String>>,
}

impl JobGate {
    /// `conflicts` must already be symmetric
    pub fn new(conflicts: HashMap<String, HashSet<String>>) -> Self {
        Self {
            running: Arc::default(),
            conflicts,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunningMap> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit `name`, registering `token` as its cancellation handle
    ///
    /// Conflicts are checked before the single-flight rule.
    pub fn try_acquire(&self, name: &str, token: CancellationToken) -> Result<GatePermit, Denied> {
        let mut running = self.lock();

        if let Some(conflicts) = self.conflicts.get(name) {
            let mut blockers: Vec<String> = conflicts
                .iter()
                .filter(|other| running.contains_key(other.as_str()))
                .cloned()
                .collect();
            if !blockers.is_empty() {
                blockers.sort();
                return Err(Denied::BlockedBy(blockers));
            }
        }

        if running.contains_key(name) {
            return Err(Denied::AlreadyRunning);
        }

        running.insert(name.to_string(), token);
        Ok(GatePermit {
            name: name.to_string(),
            running: Arc::clone(&self.running),
        })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Cancellation handle of the live execution of `name`
    pub fn token(&self, name: &str) -> Option<CancellationToken> {
        self.lock().get(name).cloned()
    }

    /// Names of running jobs, sorted
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Held for the duration of one execution; dropping it releases the gate
#[derive(Debug)]
pub struct GatePermit {
    name: String,
    running: Arc<Mutex<RunningMap>>,
}

impl GatePermit {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.name);
    }
}
