//! Tracing and logging setup shared by every binary embedding the engine.

/// Initialize process-wide tracing with the format named by `TOOLROOM_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LOG_FORMAT_ENV, LogFormat, ParseLogFormatError, init_with};
