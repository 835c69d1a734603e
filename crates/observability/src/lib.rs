//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide logging from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat, ParseLogFormatError};
