//! Diagnostics for the sandbox and the `grade` CLI.
//!
//! Everything goes to stderr. Stdout is reserved for result records so that
//! `grade run` output can be piped straight into another tool.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber, filtered by `RUST_LOG` (default `warn`).
///
/// Returns `false` when a subscriber was already installed; the existing one
/// is kept.
///
/// ```bash
/// RUST_LOG=sandbox=debug grade run tasks.jsonl
/// ```
pub fn init() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .is_ok()
}
