//! One run: scan every group, classify, deliver through the queue, then write
//! back.
//!
//! Ordering within a run:
//! 1. groups are scanned one after another; within a group, pages and rows
//!    are classified and submitted in order
//! 2. the queue is drained once, after every group has been submitted
//! 3. write-back starts only after the drain, one group at a time
//!
//! Failures are isolated: a failed delivery is counted and listed, a failed
//! group is logged and the next group is scanned, a failed write-back chunk
//! is reported. None of them fail the run.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use remindr_core::{
    classify, Classification, ClassifyContext, Clock, DateParser, DeliveryFailure,
    FormatChainParser, GroupFailure, Position, RunId, RunInstant, RunOutcome, RunSkipReason,
    RunSummary, SourceGroup, SystemClock, WriteBackUnit,
};

use crate::config::{ConfigError, EngineConfig, RunSettings};
use crate::delivery::{attempts_made, DeliveryError, DeliveryHandler, DeliveryJob, Notifier};
use crate::jobs::{
    BoundedWorkQueue, Job, JobTicket, QueueError, QueueState, RetryExhausted, RetryPolicy,
};
use crate::runner::guard::OverlapGuard;
use crate::scan::{PaginatedScanner, PositionedRecord, ScanError};
use crate::source::RecordSource;
use crate::writeback::{BatchWriter, WriteBackBatcher};

/// The queue deliveries run on.
pub type DeliveryQueue = BoundedWorkQueue<DeliveryJob, DeliveryHandler>;

/// Build the delivery queue described by `config`.
pub fn delivery_queue(config: &EngineConfig, notifier: Arc<dyn Notifier>) -> DeliveryQueue {
    BoundedWorkQueue::new(
        "delivery",
        config.concurrency,
        DeliveryHandler::new(notifier, config.delivery_retry.into()),
    )
}

/// Failure before any group was processed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("delivery queue unavailable: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Error)]
enum GroupError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("submitting delivery failed: {0}")]
    Submit(#[from] QueueError),
}

struct PendingDelivery {
    group: SourceGroup,
    position: Position,
    recipient: String,
    ticket: JobTicket<u32, RetryExhausted<DeliveryError>>,
}

/// Drives runs. Share it behind an `Arc`; concurrent `run_once` calls are
/// rejected by the built-in [`OverlapGuard`].
pub struct RunOrchestrator {
    settings: RunSettings,
    source: Arc<dyn RecordSource>,
    fetch_retry: RetryPolicy,
    queue: DeliveryQueue,
    batcher: WriteBackBatcher,
    parser: Arc<dyn DateParser>,
    clock: Arc<dyn Clock>,
    guard: OverlapGuard,
}

impl RunOrchestrator {
    pub fn new(
        config: &EngineConfig,
        source: Arc<dyn RecordSource>,
        queue: DeliveryQueue,
        writer: Arc<dyn BatchWriter>,
    ) -> Result<Self, ConfigError> {
        let settings = config.validate()?;
        Ok(Self {
            settings,
            source,
            fetch_retry: config.fetch_retry.into(),
            queue,
            batcher: WriteBackBatcher::new(
                writer,
                config.write_chunk_size,
                config.write_retry.into(),
            ),
            parser: Arc::new(FormatChainParser::default()),
            clock: Arc::new(SystemClock),
            guard: OverlapGuard::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_date_parser(mut self, parser: Arc<dyn DateParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Queue counter snapshot; safe during a run.
    pub fn queue_stats(&self) -> QueueState {
        self.queue.stats()
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_busy()
    }

    /// Stop accepting deliveries and wait up to `grace` for in-flight ones.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.queue.shutdown(grace).await
    }

    /// Execute one run, unless it is a weekend day (when configured) or
    /// another run is still in progress.
    pub async fn run_once(&self) -> Result<RunOutcome, RunError> {
        let instant = RunInstant::capture(self.clock.as_ref(), self.settings.timezone);

        if self.settings.skip_weekends && instant.is_weekend() {
            info!(today = %instant.today(), "weekend, skipping run");
            return Ok(RunOutcome::skipped(RunSkipReason::Weekend));
        }

        match self.guard.run(|| self.run_exclusive(instant)).await {
            Some(result) => result,
            None => {
                info!("previous run still in progress, skipping");
                Ok(RunOutcome::skipped(RunSkipReason::Overlap))
            }
        }
    }

    async fn run_exclusive(&self, instant: RunInstant) -> Result<RunOutcome, RunError> {
        if self.queue.is_closed() {
            return Err(RunError::Queue(QueueError::Closed));
        }

        let run_id = RunId::new();
        let span = info_span!("run", run_id = %run_id, today = %instant.today());
        let summary = self.execute(run_id, instant).instrument(span).await;
        Ok(RunOutcome::Completed(summary))
    }

    async fn execute(&self, run_id: RunId, instant: RunInstant) -> RunSummary {
        self.queue.reset_counters();

        let ctx = ClassifyContext::new(instant.today())
            .with_done_sentinel(self.settings.done_sentinel.clone())
            .with_dedup(self.settings.dedup_enabled);
        let marker = instant.marker();

        let mut summary = RunSummary::new(run_id, instant.today(), instant.utc());
        let mut pending = Vec::new();
        let mut writes = Vec::with_capacity(self.settings.groups.len());

        info!(groups = self.settings.groups.len(), "run started");

        for group in &self.settings.groups {
            let mut units = Vec::new();
            if let Err(error) = self
                .scan_group(group, &ctx, &marker, &mut summary, &mut pending, &mut units)
                .await
            {
                let error = error_chain(&error);
                warn!(group = %group, error = %error, "group aborted, continuing with next group");
                summary.group_failures.push(GroupFailure {
                    group: group.clone(),
                    error,
                });
            }
            // Units of jobs already submitted are written back even if the scan aborted.
            writes.push((group, units));
        }

        debug!(jobs = pending.len(), "all jobs submitted, draining");
        self.queue.drain().await;

        for delivery in pending {
            match delivery.ticket.outcome().await.result {
                Ok(_attempts) => summary.delivered += 1,
                Err(failure) => {
                    summary.failed += 1;
                    summary.failures.push(DeliveryFailure {
                        group: delivery.group,
                        position: delivery.position,
                        recipient: delivery.recipient,
                        attempts: attempts_made(&failure),
                        error: failure.to_string(),
                    });
                }
            }
        }

        for (group, units) in writes {
            if units.is_empty() {
                continue;
            }
            let report = self.batcher.flush(group, &units).await;
            summary.write_back.insert(group.name().to_string(), report);
        }

        summary.finished_at = self.clock.now();
        info!(
            scanned = summary.scanned,
            eligible = summary.eligible,
            skipped = summary.skipped.total(),
            delivered = summary.delivered,
            failed = summary.failed,
            group_failures = summary.group_failures.len(),
            "run finished"
        );
        summary
    }

    async fn scan_group(
        &self,
        group: &SourceGroup,
        ctx: &ClassifyContext,
        marker: &str,
        summary: &mut RunSummary,
        pending: &mut Vec<PendingDelivery>,
        units: &mut Vec<WriteBackUnit>,
    ) -> Result<(), GroupError> {
        let mut scanner = PaginatedScanner::new(
            Arc::clone(&self.source),
            group.clone(),
            self.settings.page_size,
            self.fetch_retry.clone(),
        );

        while let Some(page) = scanner.next_page().await? {
            for PositionedRecord { position, record } in page.rows {
                summary.scanned += 1;

                let payload = match classify(&record, ctx, self.parser.as_ref()) {
                    Classification::Eligible(payload) => payload,
                    Classification::Skip(reason) => {
                        summary.skipped.record(reason);
                        debug!(group = %group, position, reason = reason.as_str(), "record skipped");
                        continue;
                    }
                };

                let recipient = payload.recipient.clone();
                let job = Job::new(
                    format!("{group}:{position}"),
                    DeliveryJob {
                        group: group.clone(),
                        position,
                        payload,
                    },
                );
                let ticket = self.queue.submit(job)?;
                summary.eligible += 1;
                pending.push(PendingDelivery {
                    group: group.clone(),
                    position,
                    recipient,
                    ticket,
                });
                units.push(WriteBackUnit::new(position, marker));
            }
        }

        let stats = scanner.stats();
        info!(
            group = %group,
            pages = stats.pages,
            rows = stats.rows,
            empty_ranges = stats.empty_ranges,
            "group scanned"
        );
        Ok(())
    }
}

/// `error: cause: cause ...`
fn error_chain(error: &dyn StdError) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
