//! Telemetry initialization: structured logging via tracing.
//!
//! Log levels are controlled with the standard `RUST_LOG` environment
//! variable (default `info`). Request spans are added by the
//! `TraceLayer` installed on the router.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber with console output.
///
/// Safe to call once per process; a second call returns an error from
/// `try_init` which is propagated to the caller.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
