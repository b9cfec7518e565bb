//! Run results: write-back units, per-run counters and the run outcome.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::SkipReason;
use crate::id::RunId;
use crate::record::{Position, SourceGroup};

/// One cell to persist back to the source after deliveries settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBackUnit {
    pub position: Position,
    pub value: String,
}

impl WriteBackUnit {
    pub fn new(position: Position, value: impl Into<String>) -> Self {
        Self {
            position,
            value: value.into(),
        }
    }
}

/// A chunk that could not be written after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub first_position: Position,
    pub units: usize,
    pub attempts: u32,
    pub error: String,
}

/// Outcome of flushing one group's write-back units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBackReport {
    pub chunks_total: usize,
    pub chunks_written: usize,
    pub units_written: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl WriteBackReport {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }
}

/// Skipped-record counts, one per [`SkipReason`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCounts {
    pub malformed: u64,
    pub already_complete: u64,
    pub future_dated: u64,
    pub duplicate_today: u64,
}

impl SkippedCounts {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Malformed => self.malformed += 1,
            SkipReason::AlreadyComplete => self.already_complete += 1,
            SkipReason::FutureDated => self.future_dated += 1,
            SkipReason::DuplicateToday => self.duplicate_today += 1,
        }
    }

    pub fn get(&self, reason: SkipReason) -> u64 {
        match reason {
            SkipReason::Malformed => self.malformed,
            SkipReason::AlreadyComplete => self.already_complete,
            SkipReason::FutureDated => self.future_dated,
            SkipReason::DuplicateToday => self.duplicate_today,
        }
    }

    pub fn total(&self) -> u64 {
        self.malformed + self.already_complete + self.future_dated + self.duplicate_today
    }
}

/// A delivery that failed permanently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub group: SourceGroup,
    pub position: Position,
    pub recipient: String,
    pub attempts: u32,
    pub error: String,
}

/// A source group whose scan aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFailure {
    pub group: SourceGroup,
    pub error: String,
}

/// Aggregated result of one run. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub today: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scanned: u64,
    pub eligible: u64,
    pub skipped: SkippedCounts,
    pub delivered: u64,
    pub failed: u64,
    pub failures: Vec<DeliveryFailure>,
    pub group_failures: Vec<GroupFailure>,
    pub write_back: BTreeMap<String, WriteBackReport>,
}

impl RunSummary {
    pub fn new(run_id: RunId, today: NaiveDate, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            today,
            started_at,
            finished_at: started_at,
            scanned: 0,
            eligible: 0,
            skipped: SkippedCounts::default(),
            delivered: 0,
            failed: 0,
            failures: Vec::new(),
            group_failures: Vec::new(),
            write_back: BTreeMap::new(),
        }
    }

    /// True when nothing failed: no deliveries, groups or write-back chunks.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.group_failures.is_empty()
            && self.write_back.values().all(WriteBackReport::is_complete)
    }
}

/// Why a triggered run did nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSkipReason {
    /// Another run was still executing.
    Overlap,
    /// The reference day fell on a weekend and weekend runs are disabled.
    Weekend,
}

/// Result of triggering a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutcome {
    Completed(RunSummary),
    Skipped { skipped: bool, reason: RunSkipReason },
}

impl RunOutcome {
    pub fn skipped(reason: RunSkipReason) -> Self {
        Self::Skipped {
            skipped: true,
            reason,
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Completed(summary) => Some(summary),
            RunOutcome::Skipped { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<RunSkipReason> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::Skipped { reason, .. } => Some(*reason),
        }
    }
}
