//! Configuration management for esagg
//!
//! Default config location: ~/.esagg/config.toml

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Knobs for request validation and result shape inference.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    /// Deepest allowed chain of nested aggregations
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Check that pipeline `buckets_path` references name a sibling aggregation
    #[serde(default = "default_true")]
    pub validate_buckets_path: bool,

    /// Reject aggregation names containing `[`, `]` or `>`
    #[serde(default = "default_true")]
    pub enforce_name_syntax: bool,
}

fn default_max_depth() -> usize {
    32
}

fn default_true() -> bool {
    true
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            validate_buckets_path: true,
            enforce_name_syntax: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_level")]
    pub level: String,

    /// Log output format: "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".esagg")
}

impl Config {
    /// Load config from default location (~/.esagg/config.toml)
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_dir().join("config.toml"))
    }

    /// Load config from a file, falling back to defaults when it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Config::default());
        }
        let content = fs::read_to_string(config_path)?;
        Self::parse(&content)
    }

    /// Parse config from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.inference.max_depth == 0 {
            return Err(Error::Config(
                "inference.max_depth must be > 0".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(Error::Config(format!(
                "logging.format must be 'pretty' or 'json' (got '{}')",
                other
            ))),
        }
    }
}
