//! Record source collaborator (e.g. a spreadsheet with one tab per group).

use async_trait::async_trait;
use thiserror::Error;

use remindr_core::{Position, Record, SourceGroup};

use crate::jobs::Retryable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Network hiccup, rate limit, timeout. Worth retrying.
    #[error("transient source error: {0}")]
    Transient(String),
    /// Missing group, bad credentials, malformed response.
    #[error("source error: {0}")]
    Fatal(String),
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Paged read access to the record source.
///
/// Positions are absolute and 1-based; position 1 is the header row.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Position of the last populated row, header included.
    async fn fetch_total_count(&self, group: &SourceGroup) -> Result<Position, SourceError>;

    /// Rows at positions `start..=end`, in order. May return fewer rows than
    /// requested (including none).
    async fn fetch_page(
        &self,
        group: &SourceGroup,
        start: Position,
        end: Position,
    ) -> Result<Vec<Record>, SourceError>;
}
