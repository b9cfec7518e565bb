use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use remindr_infra::local::{load_fixture, DryRunNotifier};
use remindr_infra::memory::InMemorySource;
use remindr_infra::{delivery_queue, EngineConfig, RunOrchestrator};

/// Shared state behind every handler.
pub struct AppServices {
    pub orchestrator: Arc<RunOrchestrator>,
}

impl AppServices {
    pub fn new(orchestrator: Arc<RunOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Local-mode wiring: rows come from a JSON fixture, write-backs go back
/// into the same in-memory rows and deliveries are only logged.
pub fn build_services(config: &EngineConfig, fixture: Option<&Path>) -> anyhow::Result<AppServices> {
    let source = match fixture {
        Some(path) => {
            info!(fixture = %path.display(), "loading fixture");
            load_fixture(path)?
        }
        None => {
            warn!("no fixture configured; groups start empty");
            config
                .groups
                .iter()
                .fold(InMemorySource::new(), |source, group| {
                    source.with_group(group.clone(), Vec::new())
                })
        }
    };
    let source = Arc::new(source);

    let queue = delivery_queue(config, Arc::new(DryRunNotifier));
    let orchestrator = RunOrchestrator::new(config, source.clone(), queue, source)
        .context("invalid engine configuration")?;

    Ok(AppServices::new(Arc::new(orchestrator)))
}
