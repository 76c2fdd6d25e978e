//! Configuration for the client sequencer, server fan-out and logging
//!
//! All sections default sensibly, so an empty document is a valid config.
//! Hosts typically pass JSON across their bridge; desktop hosts can also
//! load a file with `QUICKBLE__*` environment overrides (`config-file`
//! feature).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickBleConfig {
    pub client: ClientConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// What the client sequencer does with a request made while disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectedPolicy {
    /// Resolve immediately as failed, like every other failure
    #[default]
    Reject,
    /// Drop silently with no completion (legacy client behaviour)
    Drop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub disconnected_enqueue: DisconnectedPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Include the device that wrote a characteristic in the resulting notify
    pub notify_changing_device: bool,
    /// Echo local characteristic/descriptor writes to the owner as value events
    pub read_internal_writes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enable_logging: bool,
    /// One of trace, debug, info, warn, error (default info)
    pub log_level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            log_level: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[cfg(feature = "config-file")]
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),
}

impl QuickBleConfig {
    /// Parse from a JSON document (the form hosts send across their bridge)
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a file, then apply `QUICKBLE__SECTION__KEY` env overrides
    #[cfg(feature = "config-file")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(::config::Environment::with_prefix("QUICKBLE").separator("__"))
            .build()?;
        let loaded: Self = settings.try_deserialize()?;
        tracing::debug!("Loaded config from {}: {:?}", path.as_ref().display(), loaded);
        Ok(loaded)
    }
}
