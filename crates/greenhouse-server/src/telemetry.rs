//! Logging setup
//!
//! `RUST_LOG` takes precedence over the configured level when set.

use crate::config::LoggingSettings;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Build the filter: `RUST_LOG` if present and valid, else the configured level
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level().to_string().to_lowercase()))
}

/// Install the global fmt subscriber
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(settings))
        .with_target(settings.show_target)
        .with_thread_ids(settings.show_thread_ids)
        .with_file(settings.show_location)
        .with_line_number(settings.show_location)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set subscriber: {}", e))?;
    Ok(())
}
