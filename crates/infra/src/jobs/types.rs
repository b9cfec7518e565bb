//! Core job types: jobs, handlers, outcomes and queue counters.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use remindr_core::JobId;

/// A unit of work owned by the queue until it completes.
#[derive(Debug, Clone)]
pub struct Job<P> {
    pub id: JobId,
    /// Free-form label for logs and attribution.
    pub label: String,
    pub payload: P,
}

impl<P> Job<P> {
    pub fn new(label: impl Into<String>, payload: P) -> Self {
        Self {
            id: JobId::new(),
            label: label.into(),
            payload,
        }
    }
}

/// Worker function the queue runs for every job.
///
/// Retries belong inside the handler; an `Err` is treated as terminal.
#[async_trait]
pub trait JobHandler<P>: Send + Sync + 'static
where
    P: Send + Sync + 'static,
{
    type Output: Send + 'static;
    type Error: fmt::Display + Send + 'static;

    async fn handle(&self, job: &Job<P>) -> Result<Self::Output, Self::Error>;
}

/// Why a job did not complete.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure<E: fmt::Display> {
    /// The handler returned its terminal error.
    #[error("{0}")]
    Failed(E),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// The worker went away without reporting (runtime shut down).
    #[error("job outcome lost")]
    Lost,
}

/// Completion report for one job.
#[derive(Debug)]
pub struct JobOutcome<O, E: fmt::Display> {
    pub id: JobId,
    pub label: String,
    pub result: Result<O, JobFailure<E>>,
}

impl<O, E: fmt::Display> JobOutcome<O, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Handle to a submitted job's eventual outcome.
#[derive(Debug)]
pub struct JobTicket<O, E: fmt::Display> {
    id: JobId,
    label: String,
    rx: oneshot::Receiver<JobOutcome<O, E>>,
}

impl<O, E: fmt::Display> JobTicket<O, E> {
    pub(crate) fn new(id: JobId, label: String, rx: oneshot::Receiver<JobOutcome<O, E>>) -> Self {
        Self { id, label, rx }
    }

    /// Wait for the job to finish. Resolves immediately once the queue drained.
    pub async fn outcome(self) -> JobOutcome<O, E> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome {
                id: self.id,
                label: self.label,
                result: Err(JobFailure::Lost),
            },
        }
    }
}

/// Point-in-time snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueState {
    pub pending: usize,
    pub active: usize,
    pub concurrency_limit: usize,
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub closed: bool,
}

impl QueueState {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.active == 0
    }
}
