//! Service configuration
//!
//! Every section has defaults, so an empty JSON object is a valid
//! configuration. Durations are humantime strings such as `"30s"`.

use serde::Deserialize;
use thiserror::Error;

use kringle_draw::DrawConfig;
use kringle_sync::{HubConfig, ObserverConfig};

use crate::TelemetryConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full service configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub draw: DrawConfig,
    pub hub: HubConfig,
    pub observer: ObserverConfig,
    pub telemetry: TelemetryConfig,
}

impl ServiceConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.draw.max_attempts == 0 {
            return Err(ConfigError::Invalid("draw.max_attempts must be at least 1".into()));
        }
        if self.hub.channel_capacity == 0 {
            return Err(ConfigError::Invalid("hub.channel_capacity must be at least 1".into()));
        }
        if self.observer.recv_timeout.is_zero() {
            return Err(ConfigError::Invalid("observer.recv_timeout must be positive".into()));
        }
        Ok(())
    }
}
