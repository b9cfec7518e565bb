//! Local mode: a JSON fixture as the record source and a notifier that only
//! logs.
//!
//! Fixture layout:
//!
//! ```json
//! { "groups": { "Tasks": [ { "name": "...", "recipient": "...", "due_date": "2026-10-01" } ] } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use remindr_core::{DeliveryPayload, Record};

use crate::delivery::{DeliveryError, Notifier};
use crate::memory::InMemorySource;

#[derive(Debug, Deserialize)]
struct Fixture {
    groups: BTreeMap<String, Vec<Record>>,
}

/// Load a fixture file into an [`InMemorySource`].
pub fn load_fixture(path: impl AsRef<Path>) -> anyhow::Result<InMemorySource> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    parse_fixture(&raw).with_context(|| format!("parsing fixture {}", path.display()))
}

/// Parse fixture JSON into an [`InMemorySource`].
pub fn parse_fixture(raw: &str) -> anyhow::Result<InMemorySource> {
    let fixture: Fixture = serde_json::from_str(raw)?;
    let source = fixture
        .groups
        .into_iter()
        .fold(InMemorySource::new(), |source, (name, rows)| {
            source.with_group(name, rows)
        });
    Ok(source)
}

/// Logs each delivery instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunNotifier;

#[async_trait]
impl Notifier for DryRunNotifier {
    async fn send(&self, payload: &DeliveryPayload) -> Result<(), DeliveryError> {
        info!(
            recipient = %payload.recipient,
            name = %payload.name,
            due_date = %payload.due_date,
            days_overdue = payload.days_overdue,
            "dry run: reminder not sent"
        );
        Ok(())
    }
}
