//! Job history writes that never fail the caller
//!
//! Losing an audit record must not fail a job, so every write here logs
//! storage errors and moves on. Only [`JobHistory::recover`] propagates,
//! because the engine refuses to start on an unreachable store.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::errors::StorageResult;
use crate::models::{JobRecord, JobRecordPatch};
use crate::repositories::JobHistoryRepository;

#[derive(Clone)]
pub struct JobHistory {
    repo: Arc<dyn JobHistoryRepository>,
}

impl JobHistory {
    pub fn new(repo: Arc<dyn JobHistoryRepository>) -> Self {
        Self { repo }
    }

    /// Query the store and rewrite `running` records left by a crash
    pub async fn recover(&self) -> StorageResult<usize> {
        let records = self.repo.list().await?;
        let reset = self.repo.reset_running_to_cancelled().await?;
        if reset > 0 {
            warn!(
                reset,
                known = records.len(),
                "Marked jobs left running by a previous process as cancelled"
            );
        } else {
            info!(known = records.len(), "Job history recovered, no interrupted jobs");
        }
        Ok(reset)
    }

    pub async fn record_started(&self, name: &str, at: DateTime<Utc>) {
        self.write(name, JobRecordPatch::running(at)).await;
    }

    pub async fn record_completed(&self, name: &str, at: DateTime<Utc>, result: Value) {
        self.write(name, JobRecordPatch::completed(at, result)).await;
    }

    pub async fn record_failed(&self, name: &str, error: &str) {
        self.write(name, JobRecordPatch::failed(error)).await;
    }

    pub async fn record_cancelled(&self, name: &str) {
        self.write(name, JobRecordPatch::cancelled()).await;
    }

    async fn write(&self, name: &str, patch: JobRecordPatch) {
        if let Err(e) = self.repo.upsert(name, patch).await {
            error!(job = %name, error = %e, "Failed to persist job history");
        }
    }

    pub async fn get(&self, name: &str) -> Option<JobRecord> {
        match self.repo.get_last(name).await {
            Ok(record) => record,
            Err(e) => {
                warn!(job = %name, error = %e, "Failed to read job history");
                None
            }
        }
    }

    pub async fn list(&self) -> Vec<JobRecord> {
        self.repo.list().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list job history");
            Vec::new()
        })
    }
}

impl std::fmt::Debug for JobHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHistory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::models::JobStatus;
    use crate::repositories::InMemoryJobHistory;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl JobHistoryRepository for BrokenStore {
        async fn get_last(&self, _name: &str) -> StorageResult<Option<JobRecord>> {
            Err(StorageError::unavailable("down"))
        }
        async fn upsert(&self, name: &str, _patch: JobRecordPatch) -> StorageResult<JobRecord> {
            Err(StorageError::persist_failed("job_history", name))
        }
        async fn reset_running_to_cancelled(&self) -> StorageResult<usize> {
            Err(StorageError::unavailable("down"))
        }
        async fn list(&self) -> StorageResult<Vec<JobRecord>> {
            Err(StorageError::unavailable("down"))
        }
    }

    #[tokio::test]
    async fn test_writes_swallow_storage_errors() {
        let history = JobHistory::new(Arc::new(BrokenStore));
        history.record_started("sync", Utc::now()).await;
        history.record_failed("sync", "boom").await;
        assert!(history.get("sync").await.is_none());
        assert!(history.list().await.is_empty());
        assert!(history.recover().await.is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_is_persisted() {
        let history = JobHistory::new(Arc::new(InMemoryJobHistory::new()));
        history.record_started("sync", Utc::now()).await;
        assert_eq!(history.get("sync").await.unwrap().status, JobStatus::Running);

        history.record_completed("sync", Utc::now(), serde_json::json!({ "items": 3 })).await;
        let record = history.get("sync").await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.execution_count, 1);
        assert_eq!(record.last_result, Some(serde_json::json!({ "items": 3 })));

        history.record_failed("sync", "boom").await;
        let record = history.get("sync").await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.execution_count, 1);
        assert!(record.last_execution.is_some());
    }
}
