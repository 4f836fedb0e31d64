//! Logging setup for embedding hosts.
//!
//! The library itself only emits `tracing` events; hosts that already run a
//! subscriber should skip this module entirely. [`init_logging`] installs a
//! plain stdout subscriber filtered by `RUST_LOG` (default `info`), which is
//! enough for demos and standalone tools.

use std::io;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize a stdout logging subscriber.
///
/// Log level defaults to INFO and is configurable via the `RUST_LOG`
/// environment variable.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<(), tracing_subscriber::util::TryInitError> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()
}
