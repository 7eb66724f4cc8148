//! Logging setup
//!
//! User-facing progress goes through `info!` and is always shown; detail that
//! only matters when debugging a run goes through `debug!`. Both carry the
//! [`PREFIX`] so they stand out from toolchain output sharing the terminal.

use tracing_subscriber::EnvFilter;

/// Prefix for every orchestrator log line
pub const PREFIX: &str = "[OWL - CLI]";

/// Install the global subscriber. `RUST_LOG` wins over the `debug` flag.
/// Calling this more than once is harmless.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
