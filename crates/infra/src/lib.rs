//! Reminder engine runtime: collaborator traits, paginated scanning, the
//! bounded delivery queue, write-back batching and run orchestration.

pub mod config;
pub mod delivery;
pub mod jobs;
pub mod local;
pub mod memory;
pub mod runner;
pub mod scan;
pub mod source;
pub mod writeback;

pub use config::{ConfigError, EngineConfig, RunSettings};
pub use runner::{delivery_queue, RunError, RunOrchestrator, RunScheduler, SchedulerHandle};
