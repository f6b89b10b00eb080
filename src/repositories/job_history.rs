//! Job history stores
//!
//! [`InMemoryJobHistory`] backs tests and history-less deployments.
//! [`JsonFileJobHistory`] keeps the records in one JSON document that is
//! rewritten atomically (temp file + rename) on every change, which is what
//! makes `running -> cancelled` recovery meaningful across restarts.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::traits::JobHistoryRepository;
use crate::errors::{StorageError, StorageResult};
use crate::models::{JobRecord, JobRecordPatch, JobStatus};
use crate::utils::{Clock, SystemClock};

const COLLECTION: &str = "job_history";

fn reset_running(records: &mut BTreeMap<String, JobRecord>, clock: &dyn Clock) -> usize {
    let now = clock.utc_now();
    let mut count = 0;
    for record in records.values_mut() {
        if record.status == JobStatus::Running {
            record.apply(&JobRecordPatch::cancelled(), now);
            count += 1;
        }
    }
    count
}

/// Job history kept in process memory
#[derive(Debug)]
pub struct InMemoryJobHistory {
    records: RwLock<BTreeMap<String, JobRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobHistory {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Seed records, e.g. to simulate a crash that left a job `running`
    pub fn with_records<I: IntoIterator<Item = JobRecord>>(mut self, records: I) -> Self {
        let map = self.records.get_mut();
        for record in records {
            map.insert(record.name.clone(), record);
        }
        self
    }
}

impl Default for InMemoryJobHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHistoryRepository for InMemoryJobHistory {
    async fn get_last(&self, name: &str) -> StorageResult<Option<JobRecord>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn upsert(&self, name: &str, patch: JobRecordPatch) -> StorageResult<JobRecord> {
        let now = self.clock.utc_now();
        let mut records = self.records.write().await;
        let record = records
            .entry(name.to_string())
            .or_insert_with(|| JobRecord::new(name, now));
        record.apply(&patch, now);
        Ok(record.clone())
    }

    async fn reset_running_to_cancelled(&self) -> StorageResult<usize> {
        let mut records = self.records.write().await;
        Ok(reset_running(&mut records, self.clock.as_ref()))
    }

    async fn list(&self) -> StorageResult<Vec<JobRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// Job history persisted to a JSON file
///
/// The file is read lazily on first access, so an unreadable or corrupt file
/// surfaces as an error from the first query rather than at construction.
#[derive(Debug)]
pub struct JsonFileJobHistory {
    path: PathBuf,
    state: Mutex<Option<BTreeMap<String, JobRecord>>>,
    clock: Arc<dyn Clock>,
}

impl JsonFileJobHistory {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock<P: Into<PathBuf>>(path: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> StorageResult<BTreeMap<String, JobRecord>> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => {
                let records: Vec<JobRecord> = serde_json::from_slice(&bytes)?;
                debug!("Loaded {} job history records from {}", records.len(), path.display());
                Ok(records.into_iter().map(|r| (r.name.clone(), r)).collect())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No job history at {}, starting empty", path.display());
                Ok(BTreeMap::new())
            }
            Err(e) => Err(StorageError::unavailable(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn persist(&self, records: &BTreeMap<String, JobRecord>) -> StorageResult<()> {
        let snapshot: Vec<&JobRecord> = records.values().collect();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| StorageError::persist_failed(COLLECTION, e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StorageError::persist_failed(COLLECTION, e.to_string()))?;
        Ok(())
    }

    /// Run `f` against the loaded records
    async fn with_records<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, JobRecord>) -> T,
    ) -> StorageResult<T> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(Self::load(&self.path).await?);
        }
        let records = guard
            .as_mut()
            .ok_or_else(|| StorageError::unavailable("job history not loaded"))?;
        let before = records.clone();
        let value = f(records);
        if *records != before {
            if let Err(e) = self.persist(records).await {
                // keep memory and disk in agreement
                *records = before;
                return Err(e);
            }
        }
        Ok(value)
    }
}

#[async_trait]
impl JobHistoryRepository for JsonFileJobHistory {
    async fn get_last(&self, name: &str) -> StorageResult<Option<JobRecord>> {
        self.with_records(|records| records.get(name).cloned()).await
    }

    async fn upsert(&self, name: &str, patch: JobRecordPatch) -> StorageResult<JobRecord> {
        let now = self.clock.utc_now();
        self.with_records(|records| {
            let record = records
                .entry(name.to_string())
                .or_insert_with(|| JobRecord::new(name, now));
            record.apply(&patch, now);
            record.clone()
        })
        .await
    }

    async fn reset_running_to_cancelled(&self) -> StorageResult<usize> {
        let clock = self.clock.clone();
        self.with_records(|records| reset_running(records, clock.as_ref()))
            .await
    }

    async fn list(&self) -> StorageResult<Vec<JobRecord>> {
        self.with_records(|records| records.values().cloned().collect())
            .await
    }
}
