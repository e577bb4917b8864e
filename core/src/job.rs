//! Background jobs with observable status, progress and cancellation

use crate::error::{KeyscopeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cooperative cancellation flag, checked between batches
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Shared numeric progress counter
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter {
    value: Arc<AtomicU64>,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Lifecycle of a background job: queued → running → completed / failed / cancelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed(_) | JobStatus::Cancelled
        )
    }
}

/// Context handed to the job body
#[derive(Debug, Clone)]
pub struct JobContext {
    pub cancel: CancellationToken,
    pub progress: ProgressCounter,
}

/// A unit of blocking work running on tokio's blocking pool
pub struct Job<T> {
    status: watch::Receiver<JobStatus>,
    cancel: CancellationToken,
    progress: ProgressCounter,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Job<T> {
    /// Spawn `work` on the blocking pool. Must be called within a tokio runtime.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce(JobContext) -> Result<T> + Send + 'static,
    {
        Self::spawn_with_token(CancellationToken::new(), work)
    }

    /// Spawn with an externally owned cancellation token
    pub fn spawn_with_token<F>(cancel: CancellationToken, work: F) -> Self
    where
        F: FnOnce(JobContext) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = watch::channel(JobStatus::Queued);
        let progress = ProgressCounter::new();
        let context = JobContext {
            cancel: cancel.clone(),
            progress: progress.clone(),
        };

        let handle = tokio::task::spawn_blocking(move || {
            if context.cancel.is_cancelled() {
                let _ = tx.send(JobStatus::Cancelled);
                return Err(KeyscopeError::Cancelled);
            }
            let _ = tx.send(JobStatus::Running);
            let result = work(context);
            let final_status = match &result {
                Ok(_) => JobStatus::Completed,
                Err(KeyscopeError::Cancelled) => JobStatus::Cancelled,
                Err(e) => JobStatus::Failed(e.to_string()),
            };
            let _ = tx.send(final_status);
            result
        });

        Self {
            status: rx,
            cancel,
            progress,
            handle,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    pub fn progress(&self) -> u64 {
        self.progress.get()
    }

    /// Request cancellation; takes effect at the next batch boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to status transitions
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    /// Wait for the job to finish and return its result
    pub async fn wait(self) -> Result<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(KeyscopeError::data_processing(format!(
                "background job panicked: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_job_completes_with_progress() {
        let job = Job::spawn(|ctx| {
            for _ in 0..5 {
                ctx.progress.add(10);
            }
            Ok(ctx.progress.get())
        });
        let mut status = job.subscribe();
        let value = job.wait().await.unwrap();
        assert_eq!(value, 50);
        status.wait_for(JobStatus::is_terminal).await.unwrap();
        assert_eq!(*status.borrow(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_job_failure_is_reported() {
        let job: Job<()> = Job::spawn(|_| Err(KeyscopeError::invalid_input("boom")));
        let mut status = job.subscribe();
        assert!(job.wait().await.is_err());
        status.wait_for(JobStatus::is_terminal).await.unwrap();
        assert!(matches!(&*status.borrow(), JobStatus::Failed(msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_pre_cancelled_job_never_runs() {
        let token = CancellationToken::new();
        token.cancel();
        let job = Job::spawn_with_token(token, |_| -> Result<u32> {
            panic!("cancelled job must not run")
        });
        let mut status = job.subscribe();
        assert!(matches!(job.wait().await, Err(KeyscopeError::Cancelled)));
        status.wait_for(JobStatus::is_terminal).await.unwrap();
        assert_eq!(*status.borrow(), JobStatus::Cancelled);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
