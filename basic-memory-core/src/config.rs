//! Configuration loading and management
//!
//! There is no process-wide configuration: every component receives an
//! explicit [`ProjectConfig`]. The optional `config.toml` under the user
//! config directory only carries tunables (sync behavior, logging).

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Per-project configuration handed to the engine at construction.
///
/// `database_url` is either a filesystem path, a `sqlite://` URL, or
/// `:memory:` for tests.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Root directory containing the project's Markdown files
    pub root_path: PathBuf,
    /// Where the derived index lives
    pub database_url: String,
    /// Partition key for all rows belonging to this project
    pub project_id: i64,
}

impl ProjectConfig {
    pub fn new(root_path: impl Into<PathBuf>, database_url: impl Into<String>, project_id: i64) -> Self {
        Self {
            root_path: root_path.into(),
            database_url: database_url.into(),
            project_id,
        }
    }
}

/// Main configuration struct, loaded from `config.toml`
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Sync behavior tunables
    #[serde(default)]
    pub sync: SyncOptions,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tunables for the synchronizer and watcher
#[derive(Debug, Clone, Deserialize)]
pub struct SyncOptions {
    /// Treat a new path and a deleted path with the same checksum as a
    /// rename instead of a create + delete pair
    #[serde(default = "default_detect_moves")]
    pub detect_moves: bool,

    /// Watcher debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            detect_moves: default_detect_moves(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_detect_moves() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    300
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("basic-memory")
            .join("config.toml")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("basic-memory")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("basic-memory.log")
    }
}
