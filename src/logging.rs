//! Logging initialisation for the binary.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LoggingSettings, SettingsError};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Failed to install log subscriber: {0}")]
    Init(String),
}

/// `RUST_LOG` when set, else the configured directives, else `info`.
pub fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Logs go to stderr, or to the configured file (appending, without ANSI
/// colours) when one is set.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = env_filter(&settings.filter);
    let builder = fmt().with_env_filter(filter).with_target(false);

    let installed = match settings.resolved_file()? {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| LoggingError::Init(e.to_string()))
}
