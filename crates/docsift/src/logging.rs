//! Process-wide log setup.
//!
//! Library code logs through the `log` facade and opens `tracing` spans
//! around orchestration; both end up in the same `tracing-subscriber`
//! registry.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Failed to install logger: {0}")]
    Install(String),
}

/// Builds the filter from `RUST_LOG`, falling back to the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
        filter: config.level.clone(),
        message: e.to_string(),
    })
}

/// Installs the global subscriber and the `log` bridge.
///
/// Call once at process start. A second call returns `LoggingError::Install`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init().map_err(|e| LoggingError::Install(e.to_string()))?;

    let filter = build_filter(config)?;
    let registry = Registry::default().with(filter);

    let result = if config.json {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        )
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
    };

    result.map_err(|e| LoggingError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_build_filter_from_config_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "docsift=debug,warn".to_string(),
            json: false,
        };
        assert!(build_filter(&config).is_ok());
    }
}
