//! Tracing subscriber setup.

use crate::error::{FactifyError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_directive(level: &str) -> String {
    format!("factify={}", level.to_lowercase())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_directive(level));

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| FactifyError::Config(format!("Failed to initialize logging: {}", e)))
}
