//! Job system: bounded concurrent execution with retry and backoff.
//!
//! ## Components
//!
//! - `Job`: opaque payload plus a label for attribution
//! - `JobHandler`: the worker function, retries live inside it
//! - `BoundedWorkQueue`: runs jobs with a fixed worker budget, supports drain
//! - `RetryPolicy`: exponential backoff with jitter, injectable random source

pub mod queue;
pub mod retry;
pub mod types;

pub use queue::{BoundedWorkQueue, QueueError, DEFAULT_CONCURRENCY};
pub use retry::{
    FixedJitter, Jitter, RetryExhausted, RetryPolicy, RetrySettings, Retryable, ThreadRngJitter,
};
pub use types::{Job, JobFailure, JobHandler, JobOutcome, JobTicket, QueueState};
