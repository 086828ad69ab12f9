//! EC configuration loading.
//!
//! A single TOML file configures the bus (queue depth, POST-at-boot) and
//! the binary's transports and logging. Loaded once at startup, validated,
//! then passed down by value — no ambient config state.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level EC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcConfig {
    /// Capacity of every bounded queue in the kernel.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Run the POST cycle at boot.
    #[serde(default = "default_true")]
    pub run_post: bool,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// TCP bind address for the Ethernet-tagged transport, e.g.
    /// `"127.0.0.1:4045"`. Disabled when absent.
    #[serde(default)]
    pub tcp_listen: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

fn default_queue_depth() -> usize {
    16
}

fn default_true() -> bool {
    true
}

impl Default for EcConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            run_post: true,
            transport: TransportConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl EcConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("loading configuration from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: EcConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "queue_depth must be at least 1".to_string(),
            ));
        }
        if self.queue_depth > 1024 {
            return Err(ConfigError::Invalid(format!(
                "queue_depth {} is unreasonably large (max 1024)",
                self.queue_depth
            )));
        }
        Ok(())
    }
}
