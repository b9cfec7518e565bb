//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat};

/// Initialize logging from the environment (`RUST_LOG`, `REMINDR_LOG_FORMAT`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    crate::tracing::init(&LogConfig::from_env());
}
