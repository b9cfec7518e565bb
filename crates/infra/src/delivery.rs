//! Notification delivery: the notifier collaborator and the queue handler
//! that drives it through the retry policy.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use remindr_core::{DeliveryPayload, Position, SourceGroup};

use crate::jobs::{Job, JobFailure, JobHandler, RetryExhausted, RetryPolicy, Retryable};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Timeout, throttling, temporary mailbox failure.
    #[error("transient delivery error: {0}")]
    Transient(String),
    /// The transport refused the message for good (bad address, policy).
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

impl Retryable for DeliveryError {
    fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}

/// Outbound notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &DeliveryPayload) -> Result<(), DeliveryError>;
}

/// Queue payload: what to send plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryJob {
    pub group: SourceGroup,
    pub position: Position,
    pub payload: DeliveryPayload,
}

/// Terminal delivery error as reported by the queue.
pub type DeliveryFailureKind = JobFailure<RetryExhausted<DeliveryError>>;

/// Attempts made before a job failed; zero when the handler never reported.
pub fn attempts_made(failure: &DeliveryFailureKind) -> u32 {
    match failure {
        JobFailure::Failed(exhausted) => exhausted.attempts,
        JobFailure::Panicked(_) | JobFailure::Lost => 0,
    }
}

/// Sends one payload, retrying transient failures. Succeeds with the number
/// of attempts it took.
#[derive(Clone)]
pub struct DeliveryHandler {
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl DeliveryHandler {
    pub fn new(notifier: Arc<dyn Notifier>, retry: RetryPolicy) -> Self {
        Self { notifier, retry }
    }
}

#[async_trait]
impl JobHandler<DeliveryJob> for DeliveryHandler {
    type Output = u32;
    type Error = RetryExhausted<DeliveryError>;

    async fn handle(&self, job: &Job<DeliveryJob>) -> Result<u32, Self::Error> {
        let notifier = &self.notifier;
        let payload = &job.payload.payload;
        self.retry
            .execute(&job.label, |attempt| async move {
                notifier.send(payload).await.map(|()| attempt + 1)
            })
            .await
    }
}
