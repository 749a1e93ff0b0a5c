//! Configuration for a striped DagNode
//!
//! Supports loading from TOML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stripestore_core::{ErasureConfig, DATA_SHARDS, PARITY_SHARDS};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// How many slots must store their shard before Put reports success
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// At least the write quorum (k, or k+1 when k == m)
    #[default]
    Quorum,
    /// At least one slot
    BestEffort,
}

/// DagNode configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNodeConfig {
    /// Number of data shards (k)
    #[serde(default = "default_data_shards")]
    pub data_shards: usize,

    /// Number of parity shards (m)
    #[serde(default = "default_parity_shards")]
    pub parity_shards: usize,

    /// Node addresses in slot order; exactly k+m entries
    #[serde(default)]
    pub nodes: Vec<String>,

    #[serde(default)]
    pub write_policy: WritePolicy,

    /// Per-slot request timeout in milliseconds
    #[serde(default)]
    pub slot_timeout_ms: Option<u64>,
}

fn default_data_shards() -> usize {
    DATA_SHARDS
}

fn default_parity_shards() -> usize {
    PARITY_SHARDS
}

impl Default for DagNodeConfig {
    fn default() -> Self {
        Self {
            data_shards: DATA_SHARDS,
            parity_shards: PARITY_SHARDS,
            nodes: Vec::new(),
            write_policy: WritePolicy::default(),
            slot_timeout_ms: None,
        }
    }
}

impl DagNodeConfig {
    /// Config for `nodes` with the given shard counts
    pub fn new(data_shards: usize, parity_shards: usize, nodes: Vec<String>) -> Self {
        Self {
            data_shards,
            parity_shards,
            nodes,
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DagNodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("STRIPESTORE_DATA_SHARDS") {
            if let Ok(k) = value.parse::<usize>() {
                self.data_shards = k;
            }
        }

        if let Ok(value) = std::env::var("STRIPESTORE_PARITY_SHARDS") {
            if let Ok(m) = value.parse::<usize>() {
                self.parity_shards = m;
            }
        }

        if let Ok(value) = std::env::var("STRIPESTORE_SLOT_TIMEOUT_MS") {
            if let Ok(ms) = value.parse::<u64>() {
                self.slot_timeout_ms = Some(ms);
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let erasure = self.erasure_config()?;

        if self.nodes.len() != erasure.total_shards() {
            return Err(ConfigError::ValidationError(format!(
                "expected {} node addresses (k={} + m={}), got {}",
                erasure.total_shards(),
                self.data_shards,
                self.parity_shards,
                self.nodes.len()
            )));
        }

        if self.slot_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError("slot_timeout_ms cannot be 0".to_string()));
        }

        Ok(())
    }

    pub fn erasure_config(&self) -> Result<ErasureConfig, ConfigError> {
        ErasureConfig::new(self.data_shards, self.parity_shards)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn slot_timeout(&self) -> Option<Duration> {
        self.slot_timeout_ms.map(Duration::from_millis)
    }
}
