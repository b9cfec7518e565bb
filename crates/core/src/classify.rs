//! Per-record classification: skip with a reason, or deliver.
//!
//! Classification is synchronous and pure; every input it needs (the pinned
//! "today", the done sentinel, the dedup switch) is carried by
//! [`ClassifyContext`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date::DateParser;
use crate::record::Record;

/// Why a record was not delivered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Blank identifying fields or an unparseable due date.
    Malformed,
    /// Status equals the configured "done" sentinel.
    AlreadyComplete,
    /// Due date is after the run's reference day.
    FutureDated,
    /// Already acted on during the run's reference day.
    DuplicateToday,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Malformed => "malformed",
            SkipReason::AlreadyComplete => "already_complete",
            SkipReason::FutureDated => "future_dated",
            SkipReason::DuplicateToday => "duplicate_today",
        }
    }
}

/// What gets handed to the notifier for one eligible record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub name: String,
    pub recipient: String,
    pub due_date: NaiveDate,
    /// 0 = due today, positive = days overdue.
    pub days_overdue: i64,
    pub status: String,
}

/// Outcome of classifying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Skip(SkipReason),
    Eligible(DeliveryPayload),
}

impl Classification {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Classification::Eligible(_))
    }
}

/// Run-scoped inputs to classification.
#[derive(Debug, Clone)]
pub struct ClassifyContext {
    /// Reference day, pinned once per run in the configured timezone.
    pub today: NaiveDate,
    pub done_sentinel: String,
    pub dedup_enabled: bool,
}

impl ClassifyContext {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            done_sentinel: "done".to_string(),
            dedup_enabled: true,
        }
    }

    pub fn with_done_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.done_sentinel = sentinel.into();
        self
    }

    pub fn with_dedup(mut self, enabled: bool) -> Self {
        self.dedup_enabled = enabled;
        self
    }

    fn is_done(&self, status: &str) -> bool {
        status.trim().eq_ignore_ascii_case(self.done_sentinel.trim())
    }
}

/// Classify a record. Checks run in a fixed order and the first rejection wins.
pub fn classify(record: &Record, ctx: &ClassifyContext, parser: &dyn DateParser) -> Classification {
    if record.is_malformed() {
        return Classification::Skip(SkipReason::Malformed);
    }

    if ctx.is_done(&record.status) {
        return Classification::Skip(SkipReason::AlreadyComplete);
    }

    let Some(due_date) = parser.parse(&record.due_date) else {
        return Classification::Skip(SkipReason::Malformed);
    };

    if due_date > ctx.today {
        return Classification::Skip(SkipReason::FutureDated);
    }

    if ctx.dedup_enabled {
        let last = record
            .last_action
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .and_then(|m| parser.parse(m));
        if last == Some(ctx.today) {
            return Classification::Skip(SkipReason::DuplicateToday);
        }
    }

    Classification::Eligible(DeliveryPayload {
        name: record.name.trim().to_string(),
        recipient: record.recipient.trim().to_string(),
        due_date,
        days_overdue: (ctx.today - due_date).num_days(),
        status: record.status.trim().to_string(),
    })
}
