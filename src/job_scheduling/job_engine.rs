//! Declarative job engine
//!
//! The engine owns a fixed [`JobRegistry`] and runs each job's handler
//! according to its descriptor:
//!
//! - interval-only jobs get a repeating timer whose first tick is one
//!   interval out
//! - startup jobs run once after their `delay`
//! - jobs with both run at startup, and their repeating timer is anchored
//!   at the moment that startup run (including its chain) finished
//!
//! Every execution goes through the [`JobGate`], so a job never overlaps
//! itself or a job it conflicts with. Timer ticks that hit a closed gate are
//! skipped and counted, never queued. Successful runs then invoke their
//! `postExecute` chain sequentially with the same deadline and attribution.
//!
//! Timer callbacks hold a weak reference to the engine and resolve it when
//! they fire, so the engine can be built before anything is scheduled and
//! dropped without waiting on its own timers.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::gate::{Denied, JobGate};
use super::handler::{JobContext, JobHandler};
use super::history::JobHistory;
use super::registry::JobRegistry;
use super::types::{AbortOutcome, ChainStep, JobInfo, JobRun, RunOutcome, TriggerContext};
use crate::config::EngineConfig;
use crate::errors::JobError;
use crate::models::{JobStatus, ScheduleKind};
use crate::observability::AppObservability;
use crate::repositories::JobHistoryRepository;
use crate::utils::duration::format_duration;
use crate::utils::{Clock, SystemClock, TimerHandle, spawn_delayed, spawn_repeating};

const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Timers owned by a started engine
#[derive(Debug, Default)]
struct TimerState {
    /// Startup-then-interval jobs waiting for their startup run to end
    pending_startup_intervals: HashMap<String, Duration>,
    active_timers: HashMap<String, TimerHandle>,
    startup_timers: HashMap<String, TimerHandle>,
}

struct EngineInner {
    registry: JobRegistry,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    history: JobHistory,
    gate: JobGate,
    /// Serialises history writes per job name
    writers: HashMap<String, tokio::sync::Mutex<()>>,
    skipped_ticks: HashMap<String, AtomicU64>,
    timers: Mutex<TimerState>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    initialized: AtomicBool,
    started: AtomicBool,
    config: EngineConfig,
    observability: Option<AppObservability>,
    clock: Arc<dyn Clock>,
}

impl EngineInner {
    fn timers(&self) -> MutexGuard<'_, TimerState> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Builder for [`JobEngine`]
pub struct JobEngineBuilder {
    registry: JobRegistry,
    history: Arc<dyn JobHistoryRepository>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    config: EngineConfig,
    observability: Option<AppObservability>,
    clock: Arc<dyn Clock>,
}

impl JobEngineBuilder {
    /// Register the body of job `name`
    pub fn handler<S: Into<String>>(mut self, name: S, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn handlers<I>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<dyn JobHandler>)>,
    {
        self.handlers.extend(handlers);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observability(mut self, observability: AppObservability) -> Self {
        self.observability = Some(observability);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fails with `MissingHandler` when a descriptor has no body
    pub fn build(mut self) -> Result<JobEngine, JobError> {
        let missing: Vec<String> = self
            .registry
            .names()
            .filter(|name| !self.handlers.contains_key(*name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(JobError::MissingHandler { names: missing });
        }

        let registry = &self.registry;
        self.handlers.retain(|name, _| {
            let known = registry.contains(name);
            if !known {
                warn!(job = %name, "Handler registered for a job with no descriptor; ignoring");
            }
            known
        });

        let names: Vec<String> = self.registry.names().map(str::to_string).collect();
        let inner = EngineInner {
            gate: JobGate::new(self.registry.conflict_map()),
            writers: names
                .iter()
                .map(|n| (n.clone(), tokio::sync::Mutex::new(())))
                .collect(),
            skipped_ticks: names.iter().map(|n| (n.clone(), AtomicU64::new(0))).collect(),
            registry: self.registry,
            handlers: self.handlers,
            history: JobHistory::new(self.history),
            timers: Mutex::new(TimerState::default()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            initialized: AtomicBool::new(false),
            started: AtomicBool::new(false),
            config: self.config,
            observability: self.observability,
            clock: self.clock,
        };

        Ok(JobEngine {
            inner: Arc::new(inner),
        })
    }
}

/// Cloneable handle to the job engine
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

impl JobEngine {
    pub fn builder(registry: JobRegistry, history: Arc<dyn JobHistoryRepository>) -> JobEngineBuilder {
        JobEngineBuilder {
            registry,
            history,
            handlers: HashMap::new(),
            config: EngineConfig::default(),
            observability: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Query the history store and rewrite records left `running` by a
    /// previous process to `cancelled`
    ///
    /// # Returns
    ///
    /// The number of records rewritten
    pub async fn initialize(&self) -> Result<usize, JobError> {
        let reset = self
            .inner
            .history
            .recover()
            .await
            .map_err(|e| JobError::StorageUnavailable {
                message: e.to_string(),
            })?;
        self.inner.initialized.store(true, Ordering::SeqCst);
        Ok(reset)
    }

    /// Begin scheduling
    pub fn start(&self) -> Result<(), JobError> {
        let inner = &self.inner;
        if !inner.initialized.load(Ordering::SeqCst) {
            return Err(JobError::NotInitialized);
        }
        if inner.started.swap(true, Ordering::SeqCst) {
            return Err(JobError::AlreadyStarted);
        }

        let now = Instant::now();
        let mut timers = inner.timers();
        for descriptor in inner.registry.iter() {
            let name = descriptor.name.as_str();
            match (descriptor.schedule_kind(), descriptor.interval) {
                (ScheduleKind::IntervalOnly, Some(period)) => {
                    let handle = self.spawn_interval(name, now + period, period);
                    timers.active_timers.insert(name.to_string(), handle);
                    info!(job = %name, interval = ?period, "Scheduled interval job");
                }
                (ScheduleKind::StartupThenInterval, Some(period)) => {
                    timers
                        .pending_startup_intervals
                        .insert(name.to_string(), period);
                    let handle = self.spawn_startup(name, descriptor.startup_delay());
                    timers.startup_timers.insert(name.to_string(), handle);
                    info!(
                        job = %name,
                        delay = ?descriptor.startup_delay(),
                        interval = ?period,
                        "Scheduled startup job; interval starts after the startup run"
                    );
                }
                (ScheduleKind::StartupOnly, _) => {
                    let handle = self.spawn_startup(name, descriptor.startup_delay());
                    timers.startup_timers.insert(name.to_string(), handle);
                    info!(job = %name, delay = ?descriptor.startup_delay(), "Scheduled startup job");
                }
                _ => debug!(job = %name, "Job runs only on demand"),
            }
        }

        info!(jobs = inner.registry.len(), "Job engine started");
        Ok(())
    }

    fn spawn_interval(&self, name: &str, first_tick: Instant, period: Duration) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        let name = name.to_string();
        spawn_repeating(
            &self.inner.tracker,
            &self.inner.shutdown,
            first_tick,
            period,
            move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let engine = JobEngine { inner };
                let name = name.clone();
                let tracker = engine.inner.tracker.clone();
                tracker.spawn(async move {
                    engine.run_scheduled(&name, TriggerContext::interval()).await;
                });
            },
        )
    }

    fn spawn_startup(&self, name: &str, delay: Duration) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        let name = name.to_string();
        spawn_delayed(&self.inner.tracker, &self.inner.shutdown, delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let engine = JobEngine { inner };
            engine.run_scheduled(&name, TriggerContext::startup()).await;
            engine.activate_pending_interval(&name);
        })
    }

    /// Move a startup-then-interval job from pending to an active timer
    /// anchored now
    fn activate_pending_interval(&self, name: &str) {
        let mut timers = self.inner.timers();
        timers.startup_timers.remove(name);
        let Some(period) = timers.pending_startup_intervals.remove(name) else {
            return;
        };
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let handle = self.spawn_interval(name, Instant::now() + period, period);
        timers.active_timers.insert(name.to_string(), handle);
        debug!(job = %name, interval = ?period, "Interval timer armed after startup run");
    }

    /// Run from a timer; admission failures are logged and counted
    async fn run_scheduled(&self, name: &str, trigger: TriggerContext) {
        let source = trigger.source;
        match self.run_job(name, trigger).await {
            RunOutcome::Ran(_) => {}
            RunOutcome::AlreadyRunning => {
                self.count_skip(name);
                info!(job = %name, trigger = %source, "Job tick skipped: already running");
            }
            RunOutcome::BlockedBy(blockers) => {
                self.count_skip(name);
                info!(
                    job = %name,
                    trigger = %source,
                    blocked_by = ?blockers,
                    "Job tick skipped: blocked by conflicting job"
                );
            }
            RunOutcome::NotFound => warn!(job = %name, "Scheduled job has no descriptor"),
        }
    }

    fn count_skip(&self, name: &str) {
        if let Some(counter) = self.inner.skipped_ticks.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(observability) = &self.inner.observability {
            observability.record_tick_skipped(name);
        }
    }

    /// Run `name` once and wait for it, then run its chain if it completed
    /// (or, for a chain step, if it failed)
    pub fn run_job<'a>(&'a self, name: &'a str, trigger: TriggerContext) -> BoxFuture<'a, RunOutcome> {
        Box::pin(self.execute(name, trigger))
    }

    /// Manual run with no attribution, as a `Result`
    pub async fn trigger(&self, name: &str) -> Result<JobRun, JobError> {
        self.run_job(name, TriggerContext::manual(None))
            .await
            .into_result(name)
    }

    async fn execute(&self, name: &str, trigger: TriggerContext) -> RunOutcome {
        let inner = &self.inner;
        let (Some(descriptor), Some(handler), Some(writer)) = (
            inner.registry.get(name),
            inner.handlers.get(name),
            inner.writers.get(name),
        ) else {
            return RunOutcome::NotFound;
        };

        let token = inner.shutdown.child_token();
        let permit = match inner.gate.try_acquire(name, token.clone()) {
            Ok(permit) => permit,
            Err(Denied::AlreadyRunning) => {
                debug!(job = %name, trigger = %trigger.source, "Admission refused: already running");
                return RunOutcome::AlreadyRunning;
            }
            Err(Denied::BlockedBy(blockers)) => {
                debug!(job = %name, trigger = %trigger.source, blocked_by = ?blockers, "Admission refused: conflict");
                return RunOutcome::BlockedBy(blockers);
            }
        };

        let run_id = Uuid::new_v4();
        let deadline = trigger
            .deadline
            .or_else(|| descriptor.timeout.map(|timeout| Instant::now() + timeout));
        let started_at = inner.clock.utc_now();
        let started = Instant::now();
        {
            let _writer = writer.lock().await;
            inner.history.record_started(name, started_at).await;
        }
        info!(
            job = %name,
            %run_id,
            trigger = %trigger.source,
            triggered_by = trigger.triggered_by.as_deref().unwrap_or("-"),
            chain_parent = trigger.chain_parent.as_deref().unwrap_or("-"),
            "Job started"
        );

        let ctx = JobContext {
            name: name.to_string(),
            run_id,
            token: token.clone(),
            trigger: trigger.clone(),
            deadline,
        };
        let mut timed_out = false;
        let body_result = tokio::select! {
            biased;
            result = handler.execute(ctx) => Some(result),
            _ = token.cancelled() => None,
            _ = wait_for(deadline) => {
                timed_out = true;
                token.cancel();
                None
            }
        };

        let guard = writer.lock().await;
        let elapsed = started.elapsed();
        let finished_at = inner.clock.utc_now();
        // An abort that landed before we took the writer lock wins over the
        // body's result, matching the `cancelled` it already persisted.
        let (status, result, error) = if timed_out {
            (JobStatus::Failed, None, Some(DEADLINE_EXCEEDED.to_string()))
        } else if token.is_cancelled() {
            (JobStatus::Cancelled, None, None)
        } else {
            match body_result {
                Some(Ok(value)) => (JobStatus::Completed, Some(value), None),
                Some(Err(e)) => (JobStatus::Failed, None, Some(format!("{e:#}"))),
                None => (JobStatus::Cancelled, None, None),
            }
        };

        match status {
            JobStatus::Completed => {
                inner
                    .history
                    .record_completed(name, finished_at, result.clone().unwrap_or(Value::Null))
                    .await;
                info!(job = %name, %run_id, duration = %format_duration(elapsed), "Job completed");
            }
            JobStatus::Failed => {
                let message = error.as_deref().unwrap_or_default();
                inner.history.record_failed(name, message).await;
                error!(job = %name, %run_id, duration = %format_duration(elapsed), error = %message, "Job failed");
            }
            _ => {
                inner.history.record_cancelled(name).await;
                info!(job = %name, %run_id, duration = %format_duration(elapsed), "Job cancelled");
            }
        }
        if let Some(observability) = &inner.observability {
            observability.record_job_execution(name, &status.to_string(), elapsed);
        }
        drop(permit);
        drop(guard);

        // A chain step runs its own chain even when it failed, unless the
        // shared deadline ran out
        let fires_chain = status == JobStatus::Completed
            || (status == JobStatus::Failed && !timed_out && trigger.chain_parent.is_some());
        let mut chain = Vec::new();
        if fires_chain {
            for step in &descriptor.post_execute {
                if inner.shutdown.is_cancelled() {
                    debug!(job = %name, step = %step, "Engine stopping; chain abandoned");
                    break;
                }
                let outcome = self.run_job(step, trigger.chain_step(name, deadline)).await;
                match &outcome {
                    RunOutcome::Ran(run) => {
                        debug!(job = %name, step = %step, status = %run.status, "Chain step finished")
                    }
                    RunOutcome::AlreadyRunning => {
                        info!(job = %name, step = %step, "Chain step skipped: already running")
                    }
                    RunOutcome::BlockedBy(blockers) => info!(
                        job = %name,
                        step = %step,
                        blocked_by = ?blockers,
                        "Chain step skipped: blocked by conflicting job"
                    ),
                    RunOutcome::NotFound => warn!(job = %name, step = %step, "Chain step not found"),
                }
                chain.push(ChainStep {
                    name: step.clone(),
                    outcome,
                });
            }
        }

        RunOutcome::Ran(JobRun {
            run_id,
            name: name.to_string(),
            trigger: trigger.source,
            status,
            result,
            error,
            started_at,
            finished_at,
            duration: elapsed,
            chain,
        })
    }

    /// Signal cancellation to the live execution of `name`
    pub async fn abort_job(&self, name: &str) -> Result<AbortOutcome, JobError> {
        let Some(writer) = self.inner.writers.get(name) else {
            return Err(JobError::NotFound {
                name: name.to_string(),
            });
        };

        let _writer = writer.lock().await;
        match self.inner.gate.token(name) {
            Some(token) => {
                token.cancel();
                self.inner.history.record_cancelled(name).await;
                info!(job = %name, "Job abort requested");
                Ok(AbortOutcome::Ok)
            }
            None => Ok(AbortOutcome::NotRunning),
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.inner.gate.is_running(name)
    }

    pub fn skipped_ticks(&self, name: &str) -> u64 {
        self.inner
            .skipped_ticks
            .get(name)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    /// Every registered job with its persisted record, in declaration order
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let mut records: HashMap<_, _> = self
            .inner
            .history
            .list()
            .await
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();

        self.inner
            .registry
            .iter()
            .map(|descriptor| JobInfo {
                descriptor: descriptor.clone(),
                record: records.remove(&descriptor.name),
                is_running: self.is_running(&descriptor.name),
                skipped_ticks: self.skipped_ticks(&descriptor.name),
            })
            .collect()
    }

    pub async fn job_info(&self, name: &str) -> Option<JobInfo> {
        let descriptor = self.inner.registry.get(name)?.clone();
        Some(JobInfo {
            record: self.inner.history.get(name).await,
            is_running: self.is_running(name),
            skipped_ticks: self.skipped_ticks(name),
            descriptor,
        })
    }

    /// Cancel timers and in-flight runs, then wait for them up to the
    /// shutdown grace period
    ///
    /// Runs still holding the gate afterwards are recorded as `cancelled`
    /// and abandoned.
    pub async fn stop(&self) {
        let inner = &self.inner;
        info!(running = ?inner.gate.running(), "Stopping job engine");

        {
            let mut timers = inner.timers();
            timers.pending_startup_intervals.clear();
            for (_, handle) in timers.active_timers.drain() {
                handle.cancel();
            }
            for (_, handle) in timers.startup_timers.drain() {
                handle.cancel();
            }
        }
        inner.shutdown.cancel();
        inner.tracker.close();

        let drained = tokio::time::timeout(inner.config.shutdown_grace, async {
            inner.tracker.wait().await;
            while !inner.gate.is_empty() {
                sleep(inner.config.shutdown_poll).await;
            }
        })
        .await
        .is_ok();

        if !drained {
            for name in inner.gate.running() {
                warn!(job = %name, grace = ?inner.config.shutdown_grace, "Job did not stop in time; abandoning it");
                inner.history.record_cancelled(&name).await;
            }
        }
        info!("Job engine stopped");
    }

    /// Whether `stop()` has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Token cancelled when the engine stops
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl std::fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEngine")
            .field("jobs", &self.inner.registry.len())
            .field("running", &self.inner.gate.running())
            .field("started", &self.inner.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::handler::job_fn;
    use crate::models::{JobDescriptor, JobRecord};
    use crate::repositories::InMemoryJobHistory;
    use chrono::Utc;
    use serde_json::json;

    fn ok_handler() -> Arc<dyn JobHandler> {
        job_fn(|_ctx| async { Ok::<_, anyhow::Error>(json!({ "ok": true })) })
    }

    fn sleeper(duration: Duration) -> Arc<dyn JobHandler> {
        job_fn(move |ctx: JobContext| async move {
            ctx.sleep(duration).await?;
            Ok::<_, anyhow::Error>(Value::Null)
        })
    }

    fn engine(descriptors: Vec<JobDescriptor>, handlers: Vec<(&str, Arc<dyn JobHandler>)>) -> JobEngine {
        let registry = JobRegistry::new(descriptors).unwrap();
        handlers
            .into_iter()
            .fold(
                JobEngine::builder(registry, Arc::new(InMemoryJobHistory::new())),
                |builder, (name, handler)| builder.handler(name, handler),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_every_handler() {
        let registry = JobRegistry::new(vec![JobDescriptor::new("a"), JobDescriptor::new("b")]).unwrap();
        let result = JobEngine::builder(registry, Arc::new(InMemoryJobHistory::new()))
            .handler("a", ok_handler())
            .build();
        assert_eq!(
            result.unwrap_err(),
            JobError::MissingHandler { names: vec!["b".into()] }
        );
    }

    #[tokio::test]
    async fn test_start_requires_initialize_and_is_single_shot() {
        let engine = engine(vec![JobDescriptor::new("a")], vec![("a", ok_handler())]);
        assert_eq!(engine.start().unwrap_err(), JobError::NotInitialized);

        engine.initialize().await.unwrap();
        engine.start().unwrap();
        assert_eq!(engine.start().unwrap_err(), JobError::AlreadyStarted);
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_initialize_resets_running_records() {
        let history = InMemoryJobHistory::new().with_records([JobRecord {
            status: JobStatus::Running,
            ..JobRecord::new("a", Utc::now())
        }]);
        let registry = JobRegistry::new(vec![JobDescriptor::new("a")]).unwrap();
        let engine = JobEngine::builder(registry, Arc::new(history))
            .handler("a", ok_handler())
            .build()
            .unwrap();

        assert_eq!(engine.initialize().await.unwrap(), 1);
        let info = engine.job_info("a").await.unwrap();
        assert_eq!(info.record.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_manual_run_persists_completion() {
        let engine = engine(vec![JobDescriptor::new("a")], vec![("a", ok_handler())]);
        let run = engine.trigger("a").await.unwrap();
        assert_eq!(run.status, JobStatus::Completed);
        assert_eq!(run.result, Some(json!({ "ok": true })));

        let record = engine.job_info("a").await.unwrap().record.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.execution_count, 1);
        assert!(!engine.is_running("a"));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let engine = engine(vec![JobDescriptor::new("a")], vec![("a", ok_handler())]);
        assert!(matches!(
            engine.run_job("ghost", TriggerContext::manual(None)).await,
            RunOutcome::NotFound
        ));
        assert!(matches!(
            engine.abort_job("ghost").await,
            Err(JobError::NotFound { .. })
        ));
        assert_eq!(engine.abort_job("a").await.unwrap(), AbortOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_failure_keeps_last_execution() {
        let engine = engine(
            vec![JobDescriptor::new("a")],
            vec![("a", job_fn(|_ctx| async { Err::<Value, _>(anyhow::anyhow!("upstream down")) }))],
        );
        let error = engine.trigger("a").await.unwrap_err();
        assert_eq!(
            error,
            JobError::Failed {
                name: "a".into(),
                message: "upstream down".into()
            }
        );

        let record = engine.job_info("a").await.unwrap().record.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.last_error.as_deref(), Some("upstream down"));
        assert_eq!(record.execution_count, 0);
        assert!(record.last_execution.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_the_run() {
        let engine = engine(
            vec![JobDescriptor::new("slow").with_timeout(Duration::from_secs(2))],
            vec![("slow", sleeper(Duration::from_secs(60)))],
        );

        let started = Instant::now();
        let run = engine.trigger("slow").await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(
            run,
            JobError::Failed {
                name: "slow".into(),
                message: DEADLINE_EXCEEDED.into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_live_run() {
        let engine = engine(
            vec![JobDescriptor::new("slow")],
            vec![("slow", sleeper(Duration::from_secs(60)))],
        );

        let runner = engine.clone();
        let handle = tokio::spawn(async move { runner.trigger("slow").await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(engine.is_running("slow"));

        assert_eq!(engine.abort_job("slow").await.unwrap(), AbortOutcome::Ok);
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(JobError::Cancelled { .. })));

        let record = engine.job_info("slow").await.unwrap().record.unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(!engine.is_running("slow"));
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn test_overlapping_tick_is_logged_as_skipped() {
        let engine = engine(
            vec![JobDescriptor::new("a").with_interval(Duration::from_secs(5))],
            vec![("a", sleeper(Duration::from_secs(8)))],
        );
        engine.initialize().await.unwrap();
        engine.start().unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(logs_contain("Job tick skipped: already running"));
        assert_eq!(engine.skipped_ticks("a"), 1);
        engine.stop().await;
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn test_conflicting_tick_is_logged_as_blocked() {
        let engine = engine(
            vec![
                JobDescriptor::new("sync").with_conflicts(["cleanup"]),
                JobDescriptor::new("cleanup").with_interval(Duration::from_secs(1)),
            ],
            vec![
                ("sync", sleeper(Duration::from_secs(10))),
                ("cleanup", ok_handler()),
            ],
        );
        engine.initialize().await.unwrap();
        engine.start().unwrap();

        let runner = engine.clone();
        let live = tokio::spawn(async move { runner.trigger("sync").await });
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(logs_contain("Job tick skipped: blocked by conflicting job"));
        assert_eq!(engine.skipped_ticks("cleanup"), 1);
        let listed = engine.list_jobs().await;
        let cleanup = listed.iter().find(|j| j.descriptor.name == "cleanup").unwrap();
        assert_eq!(cleanup.skipped_ticks, 1);

        engine.stop().await;
        assert!(matches!(live.await.unwrap(), Err(JobError::Cancelled { .. })));
    }
}
