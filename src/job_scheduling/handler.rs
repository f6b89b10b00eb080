//! Job bodies and the context they run in

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::TriggerContext;
use crate::config::defaults::CANCELLATION_CHECK_EVERY;
use crate::errors::JobError;

/// Everything a job body receives for one execution
///
/// The body is expected to call [`checkpoint`](Self::checkpoint) at I/O and
/// batch boundaries, and [`checkpoint_every`](Self::checkpoint_every) inside
/// long loops.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub name: String,
    pub run_id: Uuid,
    pub token: CancellationToken,
    pub trigger: TriggerContext,
    pub deadline: Option<Instant>,
}

impl JobContext {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with `JobError::Cancelled` once the token has been flipped
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.token.is_cancelled() {
            Err(JobError::Cancelled {
                name: self.name.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Checkpoint on every hundredth processed item
    pub fn checkpoint_every(&self, processed: usize) -> Result<(), JobError> {
        if processed % CANCELLATION_CHECK_EVERY == 0 {
            self.checkpoint()
        } else {
            Ok(())
        }
    }

    /// Resolves when the run is aborted, stopped or times out
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Sleep unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), JobError> {
        tokio::select! {
            _ = self.token.cancelled() => self.checkpoint(),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Body of a named job
///
/// The returned value is persisted as the job's `last_result`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, ctx: JobContext) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a [`JobHandler`]
pub struct FnJobHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> JobHandler for FnJobHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn execute(&self, ctx: JobContext) -> anyhow::Result<Value> {
        (self.f)(ctx).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn job_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnJobHandler { f })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> JobContext {
        JobContext {
            name: "sync".into(),
            run_id: Uuid::new_v4(),
            token: CancellationToken::new(),
            trigger: TriggerContext::manual(None),
            deadline: None,
        }
    }

    #[test]
    fn test_checkpoint_observes_token() {
        let ctx = context();
        assert!(ctx.checkpoint().is_ok());
        ctx.token.cancel();
        assert_eq!(
            ctx.checkpoint().unwrap_err(),
            JobError::Cancelled { name: "sync".into() }
        );
    }

    #[test]
    fn test_checkpoint_every_only_checks_on_boundaries() {
        let ctx = context();
        ctx.token.cancel();
        assert!(ctx.checkpoint_every(99).is_ok());
        assert!(ctx.checkpoint_every(100).is_err());
        assert!(ctx.checkpoint_every(250).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_returns_early_on_cancel() {
        let ctx = context();
        let token = ctx.token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let started = Instant::now();
        assert!(ctx.sleep(Duration::from_secs(60)).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_job_fn_wraps_closures() {
        let handler = job_fn(|ctx: JobContext| async move {
            Ok::<_, anyhow::Error>(serde_json::json!({ "job": ctx.name }))
        });
        let value = handler.execute(context()).await.unwrap();
        assert_eq!(value["job"], "sync");
    }
}
