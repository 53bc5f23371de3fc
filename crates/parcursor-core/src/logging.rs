//! Logging initialization.
//!
//! The library only emits `tracing` events; applications and tests call
//! [`init_logging`] once to install a subscriber. `RUST_LOG` overrides the
//! configured level when set.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global `tracing` subscriber for the given configuration.
///
/// Fails with [`Error::Config`](crate::Error::Config) if a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig) -> crate::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.level.as_directive())
    };

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_thread_names(true))
            .with(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_thread_names(true))
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))
}
