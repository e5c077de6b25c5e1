//! Process-wide tracing/logging setup.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process: JSON logs, `RUST_LOG`-style filtering
/// with an `info` default.
///
/// Safe to call multiple times (subsequent calls are no-ops), which keeps
/// tests that share a process from fighting over the global subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .try_init();
}
