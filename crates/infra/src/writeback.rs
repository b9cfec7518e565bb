//! Batched write-back of per-record state after deliveries settle.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use remindr_core::{ChunkFailure, SourceGroup, WriteBackReport, WriteBackUnit};

use crate::jobs::{RetryPolicy, Retryable};

/// Default units per batched write.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("transient write error: {0}")]
    Transient(String),
    #[error("write error: {0}")]
    Fatal(String),
}

impl Retryable for WriteError {
    fn is_transient(&self) -> bool {
        matches!(self, WriteError::Transient(_))
    }
}

/// Persistence sink for write-back units.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    async fn write_batch(&self, group: &SourceGroup, units: &[WriteBackUnit])
    -> Result<(), WriteError>;
}

/// Writes units chunk by chunk, one chunk at a time.
///
/// A chunk that still fails after retries is reported and skipped; the
/// remaining chunks are still written.
pub struct WriteBackBatcher {
    writer: Arc<dyn BatchWriter>,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl WriteBackBatcher {
    pub fn new(writer: Arc<dyn BatchWriter>, chunk_size: usize, retry: RetryPolicy) -> Self {
        Self {
            writer,
            chunk_size: chunk_size.max(1),
            retry,
        }
    }

    pub async fn flush(&self, group: &SourceGroup, units: &[WriteBackUnit]) -> WriteBackReport {
        let mut report = WriteBackReport::default();

        for (chunk_index, chunk) in units.chunks(self.chunk_size).enumerate() {
            report.chunks_total += 1;
            let label = format!("write_batch:{group}:{chunk_index}");
            let writer = &self.writer;

            match self
                .retry
                .execute(&label, |_| writer.write_batch(group, chunk))
                .await
            {
                Ok(()) => {
                    report.chunks_written += 1;
                    report.units_written += chunk.len();
                    debug!(group = %group, chunk_index, units = chunk.len(), "chunk written");
                }
                Err(exhausted) => {
                    let first_position = chunk[0].position;
                    warn!(
                        group = %group,
                        chunk_index,
                        first_position,
                        attempts = exhausted.attempts,
                        error = %exhausted.error,
                        "abandoning write-back chunk"
                    );
                    report.failed_chunks.push(ChunkFailure {
                        chunk_index,
                        first_position,
                        units: chunk.len(),
                        attempts: exhausted.attempts,
                        error: exhausted.error.to_string(),
                    });
                }
            }
        }

        report
    }
}
