//! # blockfs-config
//!
//! Configuration management for the blockfs storage engine.
//!
//! Loads configuration from:
//! 1. `~/.blockfs/config.toml` (global)
//! 2. `.blockfs/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;

pub use logging::{init_logging, Component, LogLevel};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Capacity of a single block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Largest size any single file may reach (100 MiB).
pub const MAX_FILE_SIZE: usize = 1024 * 1024 * 100;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let project = Path::new(".blockfs/config.toml");
        let mut config = Self::load_from(global.as_deref(), Some(project))?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.engine.validate()?;
        Ok(config)
    }

    /// Load the global file, then merge the project file on top of it.
    ///
    /// Missing files are skipped. Environment overrides are not applied here.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(global_path)?;
            }
        }

        if let Some(project_path) = project {
            if project_path.exists() {
                debug!("Loading project config from {:?}", project_path);
                let contents = std::fs::read_to_string(project_path)?;
                let overlay: toml::Table = toml::from_str(&contents)?;
                config.merge(&overlay)?;
            }
        }

        Ok(config)
    }

    /// Parse a single config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.blockfs/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".blockfs/config.toml"))
    }

    /// Merge the keys present in a project file over this config.
    ///
    /// Only keys that are spelled out in `overlay` replace existing values, so a
    /// project file setting `block_size` keeps the global `max_file_size`.
    fn merge(&mut self, overlay: &toml::Table) -> Result<(), ConfigError> {
        let mut base = toml::Table::try_from(&*self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for (section, value) in overlay {
            match (base.get_mut(section), value) {
                (Some(toml::Value::Table(dst)), toml::Value::Table(src)) => {
                    for (key, v) in src {
                        dst.insert(key.clone(), v.clone());
                    }
                }
                _ => {
                    base.insert(section.clone(), value.clone());
                }
            }
        }

        *self = base.try_into()?;
        Ok(())
    }

    /// Apply environment variable overrides.
    ///
    /// `lookup` resolves a variable name; production passes `std::env::var`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = lookup("BLOCKFS_BLOCK_SIZE").and_then(|v| v.parse().ok()) {
            self.engine.block_size = n;
        }
        if let Some(n) = lookup("BLOCKFS_MAX_FILE_SIZE").and_then(|v| v.parse().ok()) {
            self.engine.max_file_size = n;
        }
        if let Some(n) = lookup("BLOCKFS_MAX_BLOCKS").and_then(|v| v.parse().ok()) {
            self.engine.max_blocks = Some(n);
        }
        if let Some(level) = lookup("BLOCKFS_LOG_LEVEL").and_then(|v| v.parse().ok()) {
            self.log.level = level;
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml()
    }

    /// Render this config as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Storage engine limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of each block in bytes
    pub block_size: usize,
    /// Largest size a single file may grow to
    pub max_file_size: usize,
    /// Cap on live blocks across all files (None = unlimited)
    pub max_blocks: Option<usize>,
    /// Descriptor slots reserved up front
    pub initial_descriptors: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            max_file_size: MAX_FILE_SIZE,
            max_blocks: None,
            initial_descriptors: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".into()));
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid("max_file_size must be positive".into()));
        }
        if self.max_file_size < self.block_size {
            return Err(ConfigError::Invalid(format!(
                "max_file_size ({}) is smaller than one block ({})",
                self.max_file_size, self.block_size
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when RUST_LOG is unset
    pub level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
        }
    }
}
