//! Periodic runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::runner::orchestrator::RunOrchestrator;

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    orchestrator: Arc<RunOrchestrator>,
    shutdown: Arc<Notify>,
    trigger: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask for a run now. Requests made while one is already queued are
    /// coalesced; returns false in that case.
    pub fn trigger(&self) -> bool {
        self.trigger.try_send(()).is_ok()
    }

    /// Stop scheduling, let a run in progress finish, then close the
    /// delivery queue. Everything shares one `grace` budget; returns false
    /// if anything had to be cut short.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        self.shutdown.notify_one();

        let stopped = match tokio::time::timeout_at(deadline, &mut self.join).await {
            Ok(_) => true,
            Err(_) => {
                warn!("run still in progress at shutdown deadline, aborting");
                self.join.abort();
                false
            }
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let drained = self.orchestrator.shutdown(remaining).await;
        stopped && drained
    }
}

/// Drives [`RunOrchestrator::run_once`] on a fixed interval.
///
/// The first run starts immediately. Ticks missed while a run was in
/// progress are skipped, not replayed.
#[derive(Debug)]
pub struct RunScheduler;

impl RunScheduler {
    pub fn spawn(orchestrator: Arc<RunOrchestrator>, interval: Duration) -> SchedulerHandle {
        let shutdown = Arc::new(Notify::new());
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let join = tokio::spawn(scheduler_loop(
            orchestrator.clone(),
            interval,
            shutdown.clone(),
            trigger_rx,
        ));

        SchedulerHandle {
            orchestrator,
            shutdown,
            trigger: trigger_tx,
            join,
        }
    }
}

async fn scheduler_loop(
    orchestrator: Arc<RunOrchestrator>,
    interval: Duration,
    shutdown: Arc<Notify>,
    mut trigger: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = interval.as_secs(), "scheduler started");

    loop {
        // Shutdown first: a tick missed during a long run is ready at the
        // same moment and must not start another run.
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {}
            Some(()) = trigger.recv() => info!("manual run requested"),
        }

        match orchestrator.run_once().await {
            Ok(outcome) => match outcome.skip_reason() {
                Some(reason) => info!(reason = ?reason, "scheduled run skipped"),
                None => info!("scheduled run completed"),
            },
            Err(err) => error!(error = %err, "scheduled run failed"),
        }
    }

    info!("scheduler stopped");
}
