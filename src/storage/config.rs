//! Configuration handling for soilmap
//!
//! Configuration is stored in `~/.config/soilmap/config.toml` (or the
//! platform equivalent). `SOILMAP_CONFIG` points at a different file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "SOILMAP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultFormat {
    #[default]
    Text,
    Json,
}

/// Settings for the `shapefile` command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShapefileConfig {
    /// Drop features whose geometry became empty instead of failing
    pub drop_empty: bool,

    /// Drop rows with null shapes on read instead of failing
    pub skip_null: bool,
}

impl Default for ShapefileConfig {
    fn default() -> Self {
        Self {
            drop_empty: true,
            skip_null: false,
        }
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: DefaultFormat,

    /// Shapefile processing settings
    pub shapefile: ShapefileConfig,
}

impl Config {
    /// Loads configuration from the default location
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Returns the config file path, honoring `SOILMAP_CONFIG`
    pub fn path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        ProjectDirs::from("org", "soilmap", "soilmap").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads configuration from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        if !path.is_file() {
            return Err(ConfigError::Invalid(format!("{} is not a file", path.display())).into());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}
