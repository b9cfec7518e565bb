//! Paginated scanning of one source group.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use remindr_core::{Position, Record, SourceGroup, FIRST_DATA_POSITION};

use crate::jobs::{RetryExhausted, RetryPolicy};
use crate::source::{RecordSource, SourceError};

/// Default rows per page.
pub const DEFAULT_PAGE_SIZE: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("counting rows of group {group} failed")]
    Count {
        group: SourceGroup,
        #[source]
        source: RetryExhausted<SourceError>,
    },
    #[error("fetching rows {start}..={end} of group {group} failed")]
    Page {
        group: SourceGroup,
        start: Position,
        end: Position,
        #[source]
        source: RetryExhausted<SourceError>,
    },
}

/// A record together with its absolute position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedRecord {
    pub position: Position,
    pub record: Record,
}

/// One fetched range of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub start: Position,
    pub end: Position,
    pub rows: Vec<PositionedRecord>,
}

/// Scan progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub pages: u64,
    pub rows: u64,
    pub empty_ranges: u64,
}

/// Pulls fixed-size pages from one group until the row count is exhausted.
///
/// Lazy, finite and non-restartable: the row count is probed on the first
/// call, pages are fetched one per call, and once the scan ends (or fails)
/// every further call returns `Ok(None)`.
pub struct PaginatedScanner {
    source: Arc<dyn RecordSource>,
    group: SourceGroup,
    page_size: u64,
    retry: RetryPolicy,
    total: Option<Position>,
    next_start: Position,
    finished: bool,
    stats: ScanStats,
}

impl PaginatedScanner {
    pub fn new(
        source: Arc<dyn RecordSource>,
        group: SourceGroup,
        page_size: u64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            group,
            page_size: page_size.max(1),
            retry,
            total: None,
            next_start: FIRST_DATA_POSITION,
            finished: false,
            stats: ScanStats::default(),
        }
    }

    pub fn group(&self) -> &SourceGroup {
        &self.group
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Fetch the next non-empty page, or `None` when the group is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Page>, ScanError> {
        if self.finished {
            return Ok(None);
        }
        let result = self.advance().await;
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    async fn advance(&mut self) -> Result<Option<Page>, ScanError> {
        let total = match self.total {
            Some(total) => total,
            None => {
                let total = self.count_rows().await?;
                debug!(group = %self.group, total, "row count probed");
                self.total = Some(total);
                total
            }
        };

        loop {
            if self.next_start > total {
                return Ok(None);
            }
            let start = self.next_start;
            let end = start.saturating_add(self.page_size - 1).min(total);

            let source = &self.source;
            let group = &self.group;
            let label = format!("fetch_page:{group}");
            let mut records = self
                .retry
                .execute(&label, |_| source.fetch_page(group, start, end))
                .await
                .map_err(|source| ScanError::Page {
                    group: self.group.clone(),
                    start,
                    end,
                    source,
                })?;

            self.next_start = end + 1;

            if records.is_empty() {
                debug!(group = %self.group, start, end, "empty range, skipping");
                self.stats.empty_ranges += 1;
                continue;
            }

            records.truncate((end - start + 1) as usize);
            let rows: Vec<_> = records
                .into_iter()
                .zip(start..)
                .map(|(record, position)| PositionedRecord { position, record })
                .collect();

            self.stats.pages += 1;
            self.stats.rows += rows.len() as u64;
            return Ok(Some(Page { start, end, rows }));
        }
    }

    async fn count_rows(&self) -> Result<Position, ScanError> {
        let label = format!("fetch_total_count:{}", self.group);
        self.retry
            .execute(&label, |_| self.source.fetch_total_count(&self.group))
            .await
            .map_err(|source| ScanError::Count {
                group: self.group.clone(),
                source,
            })
    }
}
