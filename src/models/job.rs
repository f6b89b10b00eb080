//! Job descriptors and persisted job records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};

use crate::config::duration_serde::option_duration;

/// Declarative description of a named background job
///
/// Loaded once at start and never mutated. `post_execute` and `conflicts`
/// accept the camelCase spelling (`postExecute`) used by descriptor files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,

    /// Period of the recurring timer
    #[serde(default, with = "option_duration", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,

    /// Invoke once when the engine starts
    #[serde(default, alias = "runOnStartup")]
    pub run_on_startup: bool,

    /// Wait before the startup invocation
    #[serde(default, with = "option_duration", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,

    /// Jobs run in order after a successful run
    #[serde(default, alias = "postExecute", skip_serializing_if = "Vec::is_empty")]
    pub post_execute: Vec<String>,

    /// Jobs that must not run at the same time as this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,

    /// Deadline for a run that does not inherit one from its chain parent
    #[serde(default, with = "option_duration", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// How the engine schedules a descriptor at start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ScheduleKind {
    /// Repeating timer only; first tick one interval out
    IntervalOnly,
    /// One invocation after `delay`
    StartupOnly,
    /// Startup invocation, then a timer anchored at its end
    StartupThenInterval,
    /// Only runs when triggered manually or by a chain
    Manual,
}

impl JobDescriptor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            interval: None,
            run_on_startup: false,
            delay: None,
            post_execute: Vec::new(),
            conflicts: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn on_startup(mut self) -> Self {
        self.run_on_startup = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_post_execute<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post_execute = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conflicts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflicts = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn schedule_kind(&self) -> ScheduleKind {
        match (self.interval, self.run_on_startup) {
            (Some(_), false) => ScheduleKind::IntervalOnly,
            (None, true) => ScheduleKind::StartupOnly,
            (Some(_), true) => ScheduleKind::StartupThenInterval,
            (None, false) => ScheduleKind::Manual,
        }
    }

    /// Startup delay, zero when absent
    pub fn startup_delay(&self) -> Duration {
        self.delay.unwrap_or_default()
    }
}

/// Persisted status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Persisted history of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub status: JobStatus,
    /// End of the last successful run
    pub last_execution: Option<DateTime<Utc>>,
    pub last_result: Option<serde_json::Value>,
    pub execution_count: u64,
    pub last_error: Option<String>,
    /// Start of the most recent run, whatever its outcome
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new<S: Into<String>>(name: S, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Idle,
            last_execution: None,
            last_result: None,
            execution_count: 0,
            last_error: None,
            started_at: None,
            updated_at: now,
        }
    }

    /// Apply a partial update
    pub fn apply(&mut self, patch: &JobRecordPatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(at) = patch.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = patch.last_execution {
            self.last_execution = Some(at);
        }
        if let Some(result) = &patch.last_result {
            self.last_result = Some(result.clone());
        }
        if let Some(error) = &patch.last_error {
            self.last_error = error.clone();
        }
        if patch.increment_execution_count {
            self.execution_count += 1;
        }
        self.updated_at = now;
    }
}

/// Partial update of a [`JobRecord`]
///
/// `last_error: Some(None)` clears a previous error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecordPatch {
    pub status: Option<JobStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_execution: Option<DateTime<Utc>>,
    pub last_result: Option<serde_json::Value>,
    pub last_error: Option<Option<String>>,
    pub increment_execution_count: bool,
}

impl JobRecordPatch {
    pub fn running(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            started_at: Some(at),
            ..Default::default()
        }
    }

    pub fn completed(at: DateTime<Utc>, result: serde_json::Value) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            last_execution: Some(at),
            last_result: Some(result),
            last_error: Some(None),
            increment_execution_count: true,
            ..Default::default()
        }
    }

    pub fn failed<S: Into<String>>(error: S) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            last_error: Some(Some(error.into())),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            ..Default::default()
        }
    }
}
