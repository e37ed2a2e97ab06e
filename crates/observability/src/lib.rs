//! Process-wide tracing setup.

pub mod tracing;

pub use tracing::{LogFormat, ParseLogFormatError};

/// Initialize tracing/logging in the given format.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}
