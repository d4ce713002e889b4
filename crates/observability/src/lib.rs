//! Tracing and logging setup shared by every binary and test harness.

pub use crate::tracing::{LogConfig, LogFormat};

/// Initialize process-wide tracing with defaults (`info`, JSON output).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(&LogConfig::default());
}

/// Initialize process-wide tracing from configuration.
pub fn init_with(config: &LogConfig) {
    tracing::init_with(config);
}

/// Subscriber configuration (filters, output format).
pub mod tracing;
