//! Admin verbs over the job engine
//!
//! Thin facade used by the CLI (and by any HTTP layer embedding the crate).
//! Every error maps onto the process exit-code table through
//! [`ExitStatus`].

use serde::Serialize;
use strum::Display;
use tracing::info;

use super::job_engine::JobEngine;
use super::types::{AbortOutcome, JobInfo, JobRun, TriggerContext};
use crate::errors::{AppError, JobError};

/// Process exit status of an admin command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ExitStatus {
    Success,
    Failure,
    InvalidArguments,
    /// The job was already running or blocked by a conflict
    Conflict,
    NotFound,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::InvalidArguments => 2,
            Self::Conflict => 3,
            Self::NotFound => 4,
        }
    }
}

impl From<&JobError> for ExitStatus {
    fn from(error: &JobError) -> Self {
        match error {
            JobError::AlreadyRunning { .. } | JobError::BlockedByConflict { .. } => Self::Conflict,
            JobError::NotFound { .. } => Self::NotFound,
            _ => Self::Failure,
        }
    }
}

impl From<&AppError> for ExitStatus {
    fn from(error: &AppError) -> Self {
        match error {
            AppError::Job(job) => job.into(),
            AppError::Config(_) => Self::InvalidArguments,
            AppError::NotFound { .. } => Self::NotFound,
            _ => Self::Failure,
        }
    }
}

/// Health of the scheduling system
#[derive(Debug, Clone, Serialize)]
pub struct SchedulingHealthStatus {
    pub is_healthy: bool,
    pub registered_jobs: usize,
    pub running_jobs: Vec<String>,
}

/// External API for the job engine
#[derive(Debug, Clone)]
pub struct JobSchedulingApi {
    engine: JobEngine,
}

impl JobSchedulingApi {
    pub fn new(engine: JobEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &JobEngine {
        &self.engine
    }

    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.engine.list_jobs().await
    }

    /// Run a job now and wait for it, chain included
    pub async fn trigger_job(&self, name: &str, triggered_by: Option<&str>) -> Result<JobRun, JobError> {
        info!(job = %name, triggered_by = triggered_by.unwrap_or("-"), "API: triggering job");
        self.engine
            .run_job(name, TriggerContext::manual(triggered_by))
            .await
            .into_result(name)
    }

    pub async fn abort_job(&self, name: &str) -> Result<AbortOutcome, JobError> {
        info!(job = %name, "API: aborting job");
        self.engine.abort_job(name).await
    }

    pub async fn get_job_status(&self, name: &str) -> Result<JobInfo, JobError> {
        self.engine.job_info(name).await.ok_or_else(|| JobError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn health_check(&self) -> SchedulingHealthStatus {
        let running_jobs = self
            .engine
            .registry()
            .names()
            .filter(|name| self.engine.is_running(name))
            .map(str::to_string)
            .collect();
        SchedulingHealthStatus {
            is_healthy: !self.engine.is_stopped(),
            registered_jobs: self.engine.registry().len(),
            running_jobs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::{JobRegistry, job_fn};
    use crate::models::JobDescriptor;
    use crate::repositories::InMemoryJobHistory;
    use std::sync::Arc;

    fn api() -> JobSchedulingApi {
        let registry = JobRegistry::new(vec![JobDescriptor::new("sync")]).unwrap();
        let engine = JobEngine::builder(registry, Arc::new(InMemoryJobHistory::new()))
            .handler(
                "sync",
                job_fn(|_ctx| async { Ok::<_, anyhow::Error>(serde_json::Value::Null) }),
            )
            .build()
            .unwrap();
        JobSchedulingApi::new(engine)
    }

    #[test]
    fn test_exit_codes() {
        let conflict = JobError::BlockedByConflict {
            name: "a".into(),
            blockers: vec!["b".into()],
        };
        assert_eq!(ExitStatus::from(&conflict).code(), 3);
        assert_eq!(ExitStatus::from(&JobError::AlreadyRunning { name: "a".into() }).code(), 3);
        assert_eq!(ExitStatus::from(&JobError::NotFound { name: "a".into() }).code(), 4);
        assert_eq!(
            ExitStatus::from(&JobError::Failed {
                name: "a".into(),
                message: "x".into()
            })
            .code(),
            1
        );
        let config = AppError::Config(crate::errors::ConfigError::invalid_registry("bad"));
        assert_eq!(ExitStatus::from(&config).code(), 2);
        assert_eq!(ExitStatus::Success.code(), 0);
    }

    #[tokio::test]
    async fn test_trigger_and_status() {
        let api = api();
        let run = api.trigger_job("sync", Some("admin")).await.unwrap();
        assert_eq!(run.trigger.to_string(), "manual");

        let status = api.get_job_status("sync").await.unwrap();
        assert_eq!(status.record.unwrap().execution_count, 1);
        assert!(matches!(
            api.get_job_status("ghost").await,
            Err(JobError::NotFound { .. })
        ));

        let health = api.health_check();
        assert!(health.is_healthy);
        assert_eq!(health.registered_jobs, 1);
        assert!(health.running_jobs.is_empty());
    }
}
