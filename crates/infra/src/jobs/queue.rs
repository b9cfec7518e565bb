//! Bounded concurrent work queue.
//!
//! At most `concurrency_limit` jobs run at once; the rest wait in FIFO order.
//! All counter updates and the idle check share one mutex, so a completion
//! that empties the queue and a concurrent [`drain`](BoundedWorkQueue::drain)
//! cannot miss each other.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

use super::types::{Job, JobFailure, JobHandler, JobOutcome, JobTicket, QueueState};

/// Default number of jobs in flight.
pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("work queue is closed")]
    Closed,
}

type Reply<P, H> = oneshot::Sender<
    JobOutcome<<H as JobHandler<P>>::Output, <H as JobHandler<P>>::Error>,
>;

struct Dispatch<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    job: Job<P>,
    reply: Reply<P, H>,
}

struct QueueInner<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    pending: VecDeque<Dispatch<P, H>>,
    active: usize,
    total_enqueued: u64,
    total_completed: u64,
    total_failed: u64,
    closed: bool,
}

impl<P, H> QueueInner<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active == 0
    }
}

struct Shared<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    name: String,
    limit: usize,
    handler: Arc<H>,
    state: Mutex<QueueInner<P, H>>,
    idle: Notify,
}

impl<P, H> Shared<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    fn lock(&self) -> MutexGuard<'_, QueueInner<P, H>> {
        // Counters stay consistent across a poisoning panic; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `first`, then keeps pulling pending jobs until none are left.
    /// The active slot is released only when the backlog is empty.
    async fn run_worker(self: Arc<Self>, first: Dispatch<P, H>) {
        let mut next = first;
        loop {
            let Dispatch { job, reply } = next;
            let id = job.id;
            let label = job.label.clone();

            let handler = Arc::clone(&self.handler);
            let result = match tokio::spawn(async move { handler.handle(&job).await }).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(error)) => Err(JobFailure::Failed(error)),
                Err(join_error) => Err(JobFailure::Panicked(join_error.to_string())),
            };

            let succeeded = result.is_ok();
            match &result {
                Ok(_) => debug!(queue = %self.name, job_id = %id, label = %label, "job completed"),
                Err(error) => warn!(queue = %self.name, job_id = %id, label = %label, error = %error, "job failed"),
            }
            // The caller may have dropped its ticket; the outcome is still counted.
            let _ = reply.send(JobOutcome { id, label, result });

            let following = {
                let mut state = self.lock();
                if succeeded {
                    state.total_completed += 1;
                } else {
                    state.total_failed += 1;
                }
                match state.pending.pop_front() {
                    Some(dispatch) => Some(dispatch),
                    None => {
                        state.active -= 1;
                        if state.is_idle() {
                            self.idle.notify_waiters();
                        }
                        None
                    }
                }
            };

            match following {
                Some(dispatch) => next = dispatch,
                None => break,
            }
        }
    }
}

/// Generic job runner with a fixed worker budget.
///
/// Cheap to clone; clones share the same queue. Reusable across runs:
/// totals are only reset through [`reset_counters`](Self::reset_counters).
pub struct BoundedWorkQueue<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    shared: Arc<Shared<P, H>>,
}

impl<P, H> Clone for BoundedWorkQueue<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P, H> std::fmt::Debug for BoundedWorkQueue<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedWorkQueue")
            .field("name", &self.shared.name)
            .field("state", &self.stats())
            .finish()
    }
}

impl<P, H> BoundedWorkQueue<P, H>
where
    P: Send + Sync + 'static,
    H: JobHandler<P>,
{
    /// Create a queue. A limit of zero is treated as one.
    pub fn new(name: impl Into<String>, concurrency_limit: usize, handler: H) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                limit: concurrency_limit.max(1),
                handler: Arc::new(handler),
                state: Mutex::new(QueueInner {
                    pending: VecDeque::new(),
                    active: 0,
                    total_enqueued: 0,
                    total_completed: 0,
                    total_failed: 0,
                    closed: false,
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Accept a job for asynchronous execution. Never waits for a free slot.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, job: Job<P>) -> Result<JobTicket<H::Output, H::Error>, QueueError> {
        let (reply, rx) = oneshot::channel();
        let ticket = JobTicket::new(job.id, job.label.clone(), rx);
        let dispatch = Dispatch { job, reply };

        let start_now = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.total_enqueued += 1;
            if state.active < self.shared.limit {
                state.active += 1;
                Some(dispatch)
            } else {
                state.pending.push_back(dispatch);
                None
            }
        };

        if let Some(dispatch) = start_now {
            tokio::spawn(Shared::run_worker(Arc::clone(&self.shared), dispatch));
        }
        Ok(ticket)
    }

    /// Resolve once no job is pending or active.
    ///
    /// Submit everything first; jobs submitted after this resolves are not
    /// covered by it.
    pub async fn drain(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between still wakes us.
            notified.as_mut().enable();
            if self.shared.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Counter snapshot; safe to call while jobs run.
    pub fn stats(&self) -> QueueState {
        let state = self.shared.lock();
        QueueState {
            pending: state.pending.len(),
            active: state.active,
            concurrency_limit: self.shared.limit,
            total_enqueued: state.total_enqueued,
            total_completed: state.total_completed,
            total_failed: state.total_failed,
            closed: state.closed,
        }
    }

    /// Zero the per-run totals. Pending and active jobs are untouched.
    pub fn reset_counters(&self) {
        let mut state = self.shared.lock();
        state.total_enqueued = 0;
        state.total_completed = 0;
        state.total_failed = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Stop accepting jobs and give in-flight ones up to `grace` to finish.
    ///
    /// Returns `true` if the queue drained in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shared.lock().closed = true;
        info!(queue = %self.shared.name, grace_ms = grace.as_millis() as u64, "work queue closing");
        let drained = tokio::time::timeout(grace, self.drain()).await.is_ok();
        if !drained {
            let state = self.stats();
            warn!(
                queue = %self.shared.name,
                pending = state.pending,
                active = state.active,
                "work queue did not drain within grace period"
            );
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tracks how many jobs run at once; fails payloads divisible by `fail_every`.
    #[derive(Default)]
    struct Probe {
        in_flight: AtomicUsize,
        high_water: AtomicUsize,
        fail_every: usize,
    }

    #[async_trait]
    impl JobHandler<usize> for Arc<Probe> {
        type Output = usize;
        type Error = String;

        async fn handle(&self, job: &Job<usize>) -> Result<usize, String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_every > 0 && job.payload % self.fail_every == 0 {
                Err(format!("job {} failed", job.payload))
            } else {
                Ok(job.payload * 2)
            }
        }
    }

    fn probe(fail_every: usize) -> Arc<Probe> {
        Arc::new(Probe {
            fail_every,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn drain_with_no_jobs_resolves_immediately() {
        let queue = BoundedWorkQueue::new("test", 3, probe(0));
        queue.drain().await;
        assert!(queue.stats().is_idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_concurrency_limit() {
        let p = probe(0);
        let queue = BoundedWorkQueue::new("test", 5, Arc::clone(&p));

        let tickets: Vec<_> = (1..=40)
            .map(|i| queue.submit(Job::new(format!("job-{i}"), i)).unwrap())
            .collect();

        let observed = queue.stats();
        assert!(observed.active <= 5);
        assert_eq!(observed.active + observed.pending + observed.total_completed as usize, 40);

        queue.drain().await;
        let state = queue.stats();
        assert!(state.is_idle());
        assert_eq!(state.total_completed, 40);
        assert!(p.high_water.load(Ordering::SeqCst) <= 5);

        for ticket in tickets {
            assert!(ticket.outcome().await.is_success());
        }
    }

    #[tokio::test]
    async fn failures_do_not_block_other_jobs() {
        let queue = BoundedWorkQueue::new("test", 2, probe(3));
        let tickets: Vec<_> = (1..=9)
            .map(|i| queue.submit(Job::new("job", i)).unwrap())
            .collect();

        queue.drain().await;

        let mut failed = 0;
        for ticket in tickets {
            let outcome = ticket.outcome().await;
            match outcome.result {
                Ok(doubled) => assert_eq!(doubled % 2, 0),
                Err(JobFailure::Failed(msg)) => {
                    assert!(msg.ends_with("failed"));
                    failed += 1;
                }
                Err(other) => panic!("unexpected failure {other}"),
            }
        }
        assert_eq!(failed, 3);
        let state = queue.stats();
        assert_eq!((state.total_completed, state.total_failed), (6, 3));
    }

    struct Panicky;

    #[async_trait]
    impl JobHandler<u8> for Panicky {
        type Output = ();
        type Error = String;

        async fn handle(&self, job: &Job<u8>) -> Result<(), String> {
            if job.payload == 0 {
                panic!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_handler_is_reported_and_releases_its_slot() {
        let queue = BoundedWorkQueue::new("test", 1, Panicky);
        let bad = queue.submit(Job::new("bad", 0)).unwrap();
        let good = queue.submit(Job::new("good", 1)).unwrap();

        queue.drain().await;

        assert!(matches!(bad.outcome().await.result, Err(JobFailure::Panicked(_))));
        assert!(good.outcome().await.is_success());
        assert!(queue.stats().is_idle());
    }

    #[tokio::test]
    async fn queue_is_reusable_after_counter_reset() {
        let queue = BoundedWorkQueue::new("test", 2, probe(0));
        for i in 0..4 {
            queue.submit(Job::new("first", i + 1)).unwrap();
        }
        queue.drain().await;
        assert_eq!(queue.stats().total_completed, 4);

        queue.reset_counters();
        assert_eq!(queue.stats().total_enqueued, 0);

        for i in 0..3 {
            queue.submit(Job::new("second", i + 1)).unwrap();
        }
        queue.drain().await;
        let state = queue.stats();
        assert_eq!((state.total_enqueued, state.total_completed), (3, 3));
    }

    #[tokio::test]
    async fn closed_queue_rejects_new_jobs() {
        let queue = BoundedWorkQueue::new("test", 2, probe(0));
        queue.submit(Job::new("before", 1)).unwrap();
        assert!(queue.shutdown(Duration::from_secs(5)).await);
        assert_eq!(queue.submit(Job::new("after", 2)).unwrap_err(), QueueError::Closed);
        assert!(queue.stats().closed);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

            /// For any limit and job count the in-flight count stays within the limit
            /// and every job is accounted for after drain.
            #[test]
            fn active_count_is_bounded(limit in 1usize..8, jobs in 0usize..60) {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(4)
                    .enable_all()
                    .build()
                    .unwrap();

                let (high_water, state) = rt.block_on(async {
                    let p = probe(0);
                    let queue = BoundedWorkQueue::new("prop", limit, Arc::clone(&p));
                    for i in 0..jobs {
                        queue.submit(Job::new("job", i + 1)).unwrap();
                        assert!(queue.stats().active <= limit);
                    }
                    queue.drain().await;
                    (p.high_water.load(Ordering::SeqCst), queue.stats())
                });

                prop_assert!(high_water <= limit);
                prop_assert!(state.is_idle());
                prop_assert_eq!(state.total_completed, jobs as u64);
            }
        }
    }
}
