//! Job engine type definitions

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use strum::Display;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::JobError;
use crate::models::{JobDescriptor, JobRecord, JobStatus};

/// What caused a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerSource {
    /// The one-off run at engine start
    Startup,
    /// A recurring timer tick
    Interval,
    /// Admin or CLI trigger
    Manual,
    /// A `postExecute` step of another job
    Chain,
}

/// Attribution and budget carried by a run
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub source: TriggerSource,
    /// Who asked for the run; inherited by chain steps
    pub triggered_by: Option<String>,
    /// Absolute deadline; inherited by chain steps
    pub deadline: Option<Instant>,
    /// The job whose chain scheduled this run
    pub chain_parent: Option<String>,
}

impl TriggerContext {
    fn new(source: TriggerSource) -> Self {
        Self {
            source,
            triggered_by: None,
            deadline: None,
            chain_parent: None,
        }
    }

    pub fn startup() -> Self {
        Self::new(TriggerSource::Startup)
    }

    pub fn interval() -> Self {
        Self::new(TriggerSource::Interval)
    }

    pub fn manual(triggered_by: Option<&str>) -> Self {
        Self {
            triggered_by: triggered_by.map(str::to_string),
            ..Self::new(TriggerSource::Manual)
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Context for a chain step of `parent`: same attribution, same deadline
    pub fn chain_step(&self, parent: &str, deadline: Option<Instant>) -> Self {
        Self {
            source: TriggerSource::Chain,
            triggered_by: self.triggered_by.clone(),
            deadline,
            chain_parent: Some(parent.to_string()),
        }
    }

    /// Whether admission failures are logged and skipped rather than
    /// reported to a waiting caller
    pub fn is_scheduled(&self) -> bool {
        matches!(self.source, TriggerSource::Interval | TriggerSource::Startup)
    }
}

/// Record of one finished execution
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub run_id: Uuid,
    pub name: String,
    pub trigger: TriggerSource,
    /// `completed`, `failed` or `cancelled`
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(with = "crate::config::duration_serde::duration")]
    pub duration: Duration,
    /// `postExecute` steps, in order, when the run completed or was a
    /// failing chain step
    pub chain: Vec<ChainStep>,
}

/// Outcome of one `postExecute` step
#[derive(Debug, Clone, Serialize)]
pub struct ChainStep {
    pub name: String,
    pub outcome: RunOutcome,
}

/// Result of asking the engine to run a job
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The job was admitted and ran to a terminal status
    Ran(JobRun),
    /// The single-flight gate was held
    AlreadyRunning,
    /// Conflicting jobs were running
    BlockedBy(Vec<String>),
    /// No job with that name
    NotFound,
}

impl RunOutcome {
    /// Map to a `Result`, treating failed and cancelled runs as errors
    pub fn into_result(self, name: &str) -> Result<JobRun, JobError> {
        match self {
            Self::Ran(run) => match run.status {
                JobStatus::Failed => Err(JobError::Failed {
                    name: name.to_string(),
                    message: run.error.unwrap_or_default(),
                }),
                JobStatus::Cancelled => Err(JobError::Cancelled {
                    name: name.to_string(),
                }),
                _ => Ok(run),
            },
            Self::AlreadyRunning => Err(JobError::AlreadyRunning {
                name: name.to_string(),
            }),
            Self::BlockedBy(blockers) => Err(JobError::BlockedByConflict {
                name: name.to_string(),
                blockers,
            }),
            Self::NotFound => Err(JobError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn run(&self) -> Option<&JobRun> {
        match self {
            Self::Ran(run) => Some(run),
            _ => None,
        }
    }

    /// Whether the job was not admitted
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::BlockedBy(_))
    }
}

/// Result of `abort_job`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AbortOutcome {
    Ok,
    NotRunning,
}

/// Snapshot returned by `list_jobs`
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub descriptor: JobDescriptor,
    pub record: Option<JobRecord>,
    pub is_running: bool,
    /// Timer ticks skipped because the job was running or blocked
    pub skipped_ticks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: JobStatus, error: Option<&str>) -> JobRun {
        let now = Utc::now();
        JobRun {
            run_id: Uuid::new_v4(),
            name: "sync".into(),
            trigger: TriggerSource::Manual,
            status,
            result: None,
            error: error.map(Into::into),
            started_at: now,
            finished_at: now,
            duration: Duration::ZERO,
            chain: Vec::new(),
        }
    }

    #[test]
    fn test_into_result_maps_every_variant() {
        assert!(RunOutcome::Ran(run(JobStatus::Completed, None)).into_result("sync").is_ok());
        assert_eq!(
            RunOutcome::Ran(run(JobStatus::Failed, Some("boom"))).into_result("sync").unwrap_err(),
            JobError::Failed {
                name: "sync".into(),
                message: "boom".into()
            }
        );
        assert!(matches!(
            RunOutcome::Ran(run(JobStatus::Cancelled, None)).into_result("sync"),
            Err(JobError::Cancelled { .. })
        ));
        assert!(matches!(
            RunOutcome::AlreadyRunning.into_result("sync"),
            Err(JobError::AlreadyRunning { .. })
        ));
        assert_eq!(
            RunOutcome::BlockedBy(vec!["other".into()]).into_result("sync").unwrap_err(),
            JobError::BlockedByConflict {
                name: "sync".into(),
                blockers: vec!["other".into()]
            }
        );
        assert!(matches!(
            RunOutcome::NotFound.into_result("sync"),
            Err(JobError::NotFound { .. })
        ));
    }

    #[test]
    fn test_chain_step_inherits_attribution() {
        let parent = TriggerContext::manual(Some("admin"));
        let deadline = Instant::now();
        let step = parent.chain_step("catalog_sync", Some(deadline));

        assert_eq!(step.source, TriggerSource::Chain);
        assert_eq!(step.triggered_by.as_deref(), Some("admin"));
        assert_eq!(step.deadline, Some(deadline));
        assert_eq!(step.chain_parent.as_deref(), Some("catalog_sync"));
        assert!(!step.is_scheduled());
    }
}
