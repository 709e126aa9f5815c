//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/hookwatch/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/hookwatch/` (~/.config/hookwatch/)
//! - Data: `$XDG_DATA_HOME/hookwatch/` (~/.local/share/hookwatch/)
//! - State/Logs: `$XDG_STATE_HOME/hookwatch/` (~/.local/state/hookwatch/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Background aggregate worker pool
    #[serde(default)]
    pub aggregates: AggregateConfig,

    /// Live dashboard fan-out
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Host process correlation
    #[serde(default)]
    pub process: ProcessConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3333
}

/// Aggregate worker pool configuration
///
/// Conversation totals and command statistics are updated off the
/// ingestion path by a small pool of workers draining a bounded queue.
#[derive(Debug, Deserialize, Clone)]
pub struct AggregateConfig {
    /// Number of worker tasks draining the queue
    #[serde(default = "default_aggregate_workers")]
    pub workers: usize,

    /// Maximum number of queued jobs before jobs are applied inline
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Retry attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds (doubles per attempt)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for the retry delay in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            workers: default_aggregate_workers(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl AggregateConfig {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let millis = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_max_ms);
        Duration::from_millis(millis)
    }
}

fn default_aggregate_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    50
}

fn default_backoff_max_ms() -> u64 {
    1000
}

/// Broadcast hub configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    /// Per-subscriber buffer size; messages beyond it are discarded
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

fn default_subscriber_buffer() -> usize {
    64
}

/// Process correlation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProcessConfig {
    /// How long a process snapshot is reused
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Upper bound for a single enumeration
    #[serde(default = "default_process_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            timeout_ms: default_process_timeout_ms(),
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    500
}

fn default_process_timeout_ms() -> u64 {
    2000
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
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

        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.aggregates.workers == 0 {
            return Err(Error::Config(
                "aggregates.workers must be at least 1".to_string(),
            ));
        }
        if self.aggregates.queue_capacity == 0 {
            return Err(Error::Config(
                "aggregates.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.broadcast.subscriber_buffer == 0 {
            return Err(Error::Config(
                "broadcast.subscriber_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/hookwatch/config.toml` (~/.config/hookwatch/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("hookwatch").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/hookwatch/` (~/.local/share/hookwatch/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("hookwatch")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/hookwatch/` (~/.local/state/hookwatch/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("hookwatch")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/hookwatch/hookwatch.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("hookwatch.db")
    }

    /// Returns the soft-reset baseline path
    ///
    /// `$XDG_DATA_HOME/hookwatch/reset_point.json`
    pub fn reset_point_path() -> PathBuf {
        Self::data_dir().join("reset_point.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/hookwatch/hookwatch.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("hookwatch.log")
    }
}
