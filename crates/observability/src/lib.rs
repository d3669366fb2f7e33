//! Process-wide tracing and logging setup.

pub mod tracing;

pub use tracing::{LogFormat, ParseLogFormatError};

/// Initialize tracing/logging with the given output format.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}
