//! Single-run mutual exclusion.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide "a run is in progress" flag.
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct OverlapGuard {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of a run; clears the flag on drop, including on
/// panic unwinding and when the run future is dropped mid-way.
#[derive(Debug)]
pub struct OverlapPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for OverlapPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Take the flag, or `None` if another run holds it.
    pub fn try_acquire(&self) -> Option<OverlapPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| OverlapPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Run `f` exclusively; returns `None` without calling `f` when busy.
    pub async fn run<F, Fut, T>(&self, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.try_acquire()?;
        Some(f().await)
    }
}
