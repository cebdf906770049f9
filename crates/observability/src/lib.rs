//! Tracing/logging initialization shared by binaries and test harnesses.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process with the default `info` filter.
///
/// `RUST_LOG` overrides the default. Safe to call multiple times; subsequent
/// calls are no-ops.
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with an explicit fallback filter directive.
///
/// JSON output with timestamps; `RUST_LOG` still takes precedence over
/// `fallback` when set.
pub fn init_with_filter(fallback: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
