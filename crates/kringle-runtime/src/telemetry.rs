//! Tracing setup

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::ConfigError;

/// Log line format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directives used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
    /// Include the event's module path
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            level: "info".into(),
            format: LogFormat::Text,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// `RUST_LOG` if set, otherwise the configured level
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level)
            .map_err(|e| ConfigError::Invalid(format!("log level {:?}: {e}", self.level)))
    }
}

/// Install the global subscriber. Returns `Ok(false)` if one was already
/// installed, which leaves the existing one in place.
pub fn init_tracing(config: &TelemetryConfig) -> Result<bool, ConfigError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Text => builder.compact().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    Ok(installed)
}
