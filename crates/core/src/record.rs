//! Source records and the groups they live in.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Absolute row position inside a source group.
///
/// Position 1 is the header row; data starts at [`FIRST_DATA_POSITION`].
pub type Position = u64;

/// First position holding a data row.
pub const FIRST_DATA_POSITION: Position = 2;

/// A named sub-collection of the record source (e.g. one sheet tab).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceGroup(String);

impl SourceGroup {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("source group name must not be blank"));
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SourceGroup {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourceGroup> for String {
    fn from(value: SourceGroup) -> Self {
        value.0
    }
}

impl core::fmt::Display for SourceGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the record source. Read-only to the engine.
///
/// Dates are kept as raw text; resolving them is the job of a
/// [`DateParser`](crate::date::DateParser).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub recipient: String,
    pub due_date: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub last_action: Option<String>,
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        recipient: impl Into<String>,
        due_date: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            recipient: recipient.into(),
            due_date: due_date.into(),
            status: String::new(),
            last_action: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_last_action(mut self, marker: impl Into<String>) -> Self {
        self.last_action = Some(marker.into());
        self
    }

    /// Whether any identifying field is blank.
    pub fn is_malformed(&self) -> bool {
        self.name.trim().is_empty()
            || self.recipient.trim().is_empty()
            || self.due_date.trim().is_empty()
    }
}
