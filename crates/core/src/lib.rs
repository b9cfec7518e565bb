//! `remindr-core` — domain building blocks for the reminder engine.
//!
//! This crate is **pure**: records, classification rules, date resolution and
//! run result types. Scheduling, retries and IO live in `remindr-infra`.

pub mod classify;
pub mod clock;
pub mod date;
pub mod error;
pub mod id;
pub mod record;
pub mod summary;

pub use classify::{classify, Classification, ClassifyContext, DeliveryPayload, SkipReason};
pub use clock::{parse_timezone, Clock, FixedClock, RunInstant, SystemClock};
pub use date::{DateFormat, DateParser, FormatChainParser, MARKER_FORMAT};
pub use error::{DomainError, DomainResult};
pub use id::{JobId, RunId};
pub use record::{Position, Record, SourceGroup, FIRST_DATA_POSITION};
pub use summary::{
    ChunkFailure, DeliveryFailure, GroupFailure, RunOutcome, RunSkipReason, RunSummary,
    SkippedCounts, WriteBackReport, WriteBackUnit,
};
