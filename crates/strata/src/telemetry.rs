//! Logging setup for binaries and tests.

use thiserror::Error;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging setup failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed
    #[error("Failed to init logging: {0}")]
    Init(#[from] TryInitError),
}

/// Install a global fmt subscriber at `level` (e.g. `"info"`,
/// `"strata_engine=debug"`). `RUST_LOG` takes precedence when set.
pub fn init_logging(level: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()?;

    Ok(())
}
