//! Configuration module for the synchronization engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.dirsync/settings.toml`, searched upwards from
//!   the current directory, then the per-user config directory)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DIRSYNC_` and use double
//! underscores to separate nested levels:
//! - `DIRSYNC_SYNC__BLOCK_SIZE=4096` sets `sync.block_size`
//! - `DIRSYNC_SYNC__PARALLEL_SYNC=false` sets `sync.parallel_sync`
//! - `DIRSYNC_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const CONFIG_DIR: &str = ".dirsync";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Where the list of sources, targets and exceptions is stored
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Synchronization behaviour
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SyncConfig {
    /// Block size in bytes for block comparison
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Files smaller than this are copied whole instead of block compared
    #[serde(default = "default_min_block_file_size")]
    pub block_compare_min_file_size: u64,

    /// Fan out one change to independent targets concurrently
    #[serde(default = "default_true")]
    pub parallel_sync: bool,

    /// Threads available for fanned-out entries
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Copy existing source content into a newly added target
    #[serde(default = "default_true")]
    pub sync_new_targets: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `dirsync::jobs = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,

    /// Optional log file, rotated to `<file>.bak` when it grows too large
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Maximum log file size in bytes before rotation
    #[serde(default = "default_max_log_file_size")]
    pub max_file_size: u64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_state_file() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("sources.toml")
}
fn default_block_size() -> usize {
    100
}
fn default_min_block_file_size() -> u64 {
    1024
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_log_file_size() -> u64 {
    1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            state_file: default_state_file(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            block_compare_min_file_size: default_min_block_file_size(),
            parallel_sync: true,
            parallel_threads: default_parallel_threads(),
            sync_new_targets: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
            file: None,
            max_file_size: default_max_log_file_size(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .or_else(Self::user_config)
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscores
            // stay part of the field name
            .merge(
                Env::prefixed("DIRSYNC_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }

    /// Find `.dirsync/settings.toml` from the current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Per-user settings, e.g. `~/.config/dirsync/settings.toml`, if present
    fn user_config() -> Option<PathBuf> {
        let path = dirs::config_dir()?.join("dirsync").join(CONFIG_FILE);
        path.is_file().then_some(path)
    }

    /// Check numeric settings that would make the engine misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.block_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "sync.block_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.sync.parallel_threads == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "sync.parallel_threads",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.logging.max_file_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "logging.max_file_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
