//! Configuration Management
//!
//! Connection configuration for alicloud-tables, loaded from a YAML or JSON
//! file. The config is immutable once loaded.

use crate::alicloud::error::ConfigurationError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-request timeout used when `timeout` is not configured
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Attempts used when `max_retry_time` is not configured
const DEFAULT_MAX_RETRY_TIME: u32 = 3;

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Regions to query; entries may end in `*` (`cn-*`)
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// API error codes that yield an empty result instead of a failure
    #[serde(default)]
    pub ignore_error_codes: Vec<String>,
    /// Profile name in `~/.aliyun/config.json`
    #[serde(default)]
    pub profile: Option<String>,
    /// Retry transport failures (timeouts, refused connections)
    #[serde(default = "default_auto_retry")]
    pub auto_retry: bool,
    #[serde(default)]
    pub max_retry_time: Option<u32>,
    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_auto_retry() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            access_key: None,
            secret_key: None,
            ignore_error_codes: Vec::new(),
            profile: None,
            auto_retry: default_auto_retry(),
            max_retry_time: None,
            timeout: None,
        }
    }
}

impl ConnectionConfig {
    /// Default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("alicloud-tables").join("config.yaml"))
    }

    /// Parse a config document; JSON is accepted since it is valid YAML
    pub fn parse(content: &str) -> Result<Self, ConfigurationError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)?;
        tracing::info!("Loaded connection config from {:?}", path);
        Ok(config)
    }

    /// Load configuration from disk; a missing default file means defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }

        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };

        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Effective per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Effective number of attempts for a request (1 when retry is off)
    pub fn attempts(&self) -> u32 {
        if self.auto_retry {
            self.max_retry_time.unwrap_or(DEFAULT_MAX_RETRY_TIME).max(1)
        } else {
            1
        }
    }
}
