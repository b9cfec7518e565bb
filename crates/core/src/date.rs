//! Calendar-date resolution for free-form cell text.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Resolves text to a calendar date.
///
/// Implementations must be deterministic and side-effect free.
pub trait DateParser: Send + Sync {
    fn parse(&self, text: &str) -> Option<NaiveDate>;
}

impl<F> DateParser for F
where
    F: Fn(&str) -> Option<NaiveDate> + Send + Sync,
{
    fn parse(&self, text: &str) -> Option<NaiveDate> {
        self(text)
    }
}

/// One parse attempt in a [`FormatChainParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFormat {
    /// RFC 3339 timestamp; the date is taken in the timestamp's own offset.
    Rfc3339,
    /// `chrono` datetime pattern; the time part is dropped.
    DateTime(&'static str),
    /// `chrono` date-only pattern.
    Date(&'static str),
}

impl DateFormat {
    fn attempt(&self, text: &str) -> Option<NaiveDate> {
        match self {
            DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.date_naive()),
            DateFormat::DateTime(fmt) => NaiveDateTime::parse_from_str(text, fmt)
                .ok()
                .map(|dt| dt.date()),
            DateFormat::Date(fmt) => NaiveDate::parse_from_str(text, fmt).ok(),
        }
    }
}

/// Timestamp layout used for write-back markers. Listed in the default chain.
pub const MARKER_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ordered list of parse attempts; the first one that succeeds wins.
#[derive(Debug, Clone)]
pub struct FormatChainParser {
    formats: Vec<DateFormat>,
}

impl FormatChainParser {
    pub fn new(formats: Vec<DateFormat>) -> Self {
        Self { formats }
    }
}

impl Default for FormatChainParser {
    fn default() -> Self {
        Self::new(vec![
            DateFormat::Rfc3339,
            DateFormat::DateTime(MARKER_FORMAT),
            DateFormat::DateTime("%Y-%m-%dT%H:%M:%S"),
            DateFormat::Date("%Y-%m-%d"),
            DateFormat::Date("%Y/%m/%d"),
            DateFormat::DateTime("%m/%d/%Y %H:%M:%S"),
            DateFormat::Date("%m/%d/%Y"),
            DateFormat::Date("%d %b %Y"),
            DateFormat::Date("%b %d, %Y"),
            DateFormat::Date("%B %d, %Y"),
        ])
    }
}

impl DateParser for FormatChainParser {
    fn parse(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.formats.iter().find_map(|f| f.attempt(text))
    }
}
