use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use remindr_api::app::{build_app, services::build_services};
use remindr_infra::{EngineConfig, RunScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    remindr_observability::init();

    let config = EngineConfig::from_env().context("loading configuration")?;
    let fixture = std::env::var_os("REMINDR_FIXTURE").map(PathBuf::from);
    let services = Arc::new(build_services(&config, fixture.as_deref())?);

    let scheduler = config
        .schedule_interval()
        .map(|every| RunScheduler::spawn(services.orchestrator.clone(), every));

    let addr = std::env::var("REMINDR_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, build_app(services.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    let grace = config.shutdown_grace();
    let clean = match scheduler {
        Some(handle) => handle.shutdown(grace).await,
        None => services.orchestrator.shutdown(grace).await,
    };
    if !clean {
        warn!(grace_ms = config.shutdown_grace_ms, "work still in flight after grace period");
    }
    info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            error!(error = %err, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
