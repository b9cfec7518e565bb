//! In-memory collaborators for tests and local development.
//!
//! Each one can be scripted to fail so retry and isolation paths can be
//! exercised without a real backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use remindr_core::{DeliveryPayload, Position, Record, SourceGroup, WriteBackUnit, FIRST_DATA_POSITION};

use crate::delivery::{DeliveryError, Notifier};
use crate::source::{RecordSource, SourceError};
use crate::writeback::{BatchWriter, WriteError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct GroupData {
    rows: Vec<Record>,
    blank_ranges: HashSet<Position>,
    transient_page_failures: u32,
    page_requests: Vec<(Position, Position)>,
    count_requests: u32,
}

/// Record source backed by vectors of rows, one per group.
///
/// Row `i` of a group sits at position `i + 2`; position 1 is the header.
#[derive(Debug, Default)]
pub struct InMemorySource {
    groups: Mutex<HashMap<String, GroupData>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(self, name: impl Into<String>, rows: Vec<Record>) -> Self {
        lock(&self.groups).entry(name.into()).or_default().rows = rows;
        self
    }

    /// Make the page starting at `start` come back empty.
    pub fn with_blank_range(self, name: &str, start: Position) -> Self {
        lock(&self.groups)
            .entry(name.to_string())
            .or_default()
            .blank_ranges
            .insert(start);
        self
    }

    /// Fail the next `count` page fetches of a group with a transient error.
    pub fn with_transient_page_failures(self, name: &str, count: u32) -> Self {
        lock(&self.groups)
            .entry(name.to_string())
            .or_default()
            .transient_page_failures = count;
        self
    }

    /// Page ranges requested so far, failed attempts included.
    pub fn page_requests(&self, name: &str) -> Vec<(Position, Position)> {
        lock(&self.groups)
            .get(name)
            .map(|g| g.page_requests.clone())
            .unwrap_or_default()
    }

    /// Row-count probes made so far for a group.
    pub fn count_requests(&self, name: &str) -> u32 {
        lock(&self.groups).get(name).map_or(0, |g| g.count_requests)
    }

    /// Current rows of a group, write-backs applied.
    pub fn rows(&self, name: &str) -> Vec<Record> {
        lock(&self.groups)
            .get(name)
            .map(|g| g.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSource for InMemorySource {
    async fn fetch_total_count(&self, group: &SourceGroup) -> Result<Position, SourceError> {
        let mut groups = lock(&self.groups);
        let data = groups
            .get_mut(group.name())
            .ok_or_else(|| SourceError::Fatal(format!("unknown group {group}")))?;
        data.count_requests += 1;
        Ok(data.rows.len() as Position + FIRST_DATA_POSITION - 1)
    }

    async fn fetch_page(
        &self,
        group: &SourceGroup,
        start: Position,
        end: Position,
    ) -> Result<Vec<Record>, SourceError> {
        let mut groups = lock(&self.groups);
        let data = groups
            .get_mut(group.name())
            .ok_or_else(|| SourceError::Fatal(format!("unknown group {group}")))?;
        data.page_requests.push((start, end));

        if data.transient_page_failures > 0 {
            data.transient_page_failures -= 1;
            return Err(SourceError::Transient("rate limited".to_string()));
        }
        if data.blank_ranges.contains(&start) || start < FIRST_DATA_POSITION || end < start {
            return Ok(Vec::new());
        }

        let from = (start - FIRST_DATA_POSITION) as usize;
        let to = ((end - FIRST_DATA_POSITION + 1) as usize).min(data.rows.len());
        Ok(data.rows.get(from..to).map(<[Record]>::to_vec).unwrap_or_default())
    }
}

/// Write-back lands in the `last_action` field of the addressed rows, so a
/// later scan sees it.
#[async_trait]
impl BatchWriter for InMemorySource {
    async fn write_batch(
        &self,
        group: &SourceGroup,
        units: &[WriteBackUnit],
    ) -> Result<(), WriteError> {
        let mut groups = lock(&self.groups);
        let data = groups
            .get_mut(group.name())
            .ok_or_else(|| WriteError::Fatal(format!("unknown group {group}")))?;

        let len = data.rows.len() as Position;
        if let Some(unit) = units
            .iter()
            .find(|u| u.position < FIRST_DATA_POSITION || u.position - FIRST_DATA_POSITION >= len)
        {
            return Err(WriteError::Fatal(format!(
                "position {} is outside group {group}",
                unit.position
            )));
        }

        for unit in units {
            let index = (unit.position - FIRST_DATA_POSITION) as usize;
            data.rows[index].last_action = Some(unit.value.clone());
        }
        Ok(())
    }
}

/// Notifier that records deliveries instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<DeliveryPayload>>,
    attempts: Mutex<HashMap<String, u32>>,
    always_failing: HashSet<String>,
    rejected: HashSet<String>,
    flaky: HashMap<String, u32>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send to `recipient` fails transiently.
    pub fn failing_for(mut self, recipient: impl Into<String>) -> Self {
        self.always_failing.insert(recipient.into());
        self
    }

    /// Every send to `recipient` is rejected outright (not retried).
    pub fn rejecting(mut self, recipient: impl Into<String>) -> Self {
        self.rejected.insert(recipient.into());
        self
    }

    /// The first `failures` sends to `recipient` fail transiently.
    pub fn flaky_for(mut self, recipient: impl Into<String>, failures: u32) -> Self {
        self.flaky.insert(recipient.into(), failures);
        self
    }

    /// Simulated send latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn sent(&self) -> Vec<DeliveryPayload> {
        lock(&self.sent).clone()
    }

    pub fn attempts_for(&self, recipient: &str) -> u32 {
        lock(&self.attempts).get(recipient).copied().unwrap_or(0)
    }

    /// Most sends observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, payload: &DeliveryPayload) -> Result<(), DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let attempt = {
            let mut attempts = lock(&self.attempts);
            let n = attempts.entry(payload.recipient.clone()).or_insert(0);
            *n += 1;
            *n
        };

        if self.rejected.contains(&payload.recipient) {
            return Err(DeliveryError::Rejected(format!("{} rejected", payload.recipient)));
        }
        if self.always_failing.contains(&payload.recipient) {
            return Err(DeliveryError::Transient("mailbox unavailable".to_string()));
        }
        if self.flaky.get(&payload.recipient).is_some_and(|f| attempt <= *f) {
            return Err(DeliveryError::Transient("try again later".to_string()));
        }

        lock(&self.sent).push(payload.clone());
        Ok(())
    }
}

/// Batch writer that keeps written cells per group.
#[derive(Debug, Default)]
pub struct InMemoryBatchWriter {
    calls: Mutex<Vec<(SourceGroup, Vec<WriteBackUnit>)>>,
    cells: Mutex<BTreeMap<(String, Position), String>>,
    failing_starts: HashSet<Position>,
}

impl InMemoryBatchWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write whose first unit sits at `position`.
    pub fn failing_at(mut self, position: Position) -> Self {
        self.failing_starts.insert(position);
        self
    }

    /// Batch sizes of successful writes, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.calls).iter().map(|(_, units)| units.len()).collect()
    }

    pub fn calls(&self) -> Vec<(SourceGroup, Vec<WriteBackUnit>)> {
        lock(&self.calls).clone()
    }

    pub fn cell(&self, group: &str, position: Position) -> Option<String> {
        lock(&self.cells).get(&(group.to_string(), position)).cloned()
    }
}

#[async_trait]
impl BatchWriter for InMemoryBatchWriter {
    async fn write_batch(
        &self,
        group: &SourceGroup,
        units: &[WriteBackUnit],
    ) -> Result<(), WriteError> {
        if units
            .first()
            .is_some_and(|u| self.failing_starts.contains(&u.position))
        {
            return Err(WriteError::Transient("quota exceeded".to_string()));
        }

        let mut cells = lock(&self.cells);
        for unit in units {
            cells.insert((group.name().to_string(), unit.position), unit.value.clone());
        }
        lock(&self.calls).push((group.clone(), units.to_vec()));
        Ok(())
    }
}
