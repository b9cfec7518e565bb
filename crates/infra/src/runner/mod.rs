//! Run orchestration: overlap protection, one-shot runs and the scheduler.

pub mod guard;
pub mod orchestrator;
pub mod scheduler;

pub use guard::{OverlapGuard, OverlapPermit};
pub use orchestrator::{delivery_queue, DeliveryQueue, RunError, RunOrchestrator};
pub use scheduler::{RunScheduler, SchedulerHandle};
