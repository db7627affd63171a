//! Logging setup
//!
//! Registry with an `EnvFilter` (RUST_LOG wins over the CLI level) and a fmt
//! layer in JSON or human-readable form.
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else --log-level)
//!   └── Fmt Layer (json | pretty)
//! ```

use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Console output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging initialisation errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Build the filter: RUST_LOG if set, otherwise `level`
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber
pub fn init_subscriber(level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(env_filter(level));

    match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true);
            tracing::subscriber::set_global_default(registry.with(fmt_layer))?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);
            tracing::subscriber::set_global_default(registry.with(fmt_layer))?;
        }
    }

    Ok(())
}
