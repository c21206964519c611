//! Logging setup
//!
//! Diagnostics go through `tracing` to stderr so they never mix with plan
//! output on stdout. Verbosity follows `RUST_LOG`, e.g.
//! `RUST_LOG=alchemy_planner=trace` to see every expansion step.

use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging, using `default_filter` when `RUST_LOG` is unset
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Verbose logging for tests; safe to call more than once
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
