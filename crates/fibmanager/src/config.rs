//! Configuration file support for fibmanagerd.
//!
//! Loads and validates the daemon configuration from a YAML file.
//! Default location: /etc/fibmanager/fibmanager.yaml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::fib::FibOrchConfig;
use crate::sim::TopologyConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fibmanager/fibmanager.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Event dispatch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Maximum number of notifications processed at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Capacity of the event channel feeding the dispatcher
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How long to wait for collaborators at startup, in milliseconds
    #[serde(default = "default_dependency_wait_ms")]
    pub dependency_wait_ms: u64,

    /// Statistics log interval in milliseconds (0 disables it)
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    /// Interval between pending-store sweeps in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

/// Complete fibmanagerd configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibManagerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub fib: FibOrchConfig,

    /// Seed data for the in-process collaborators.
    #[serde(default)]
    pub topology: TopologyConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent_tasks() -> usize {
    64
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_dependency_wait_ms() -> u64 {
    30_000
}

fn default_stats_interval_ms() -> u64 {
    60_000
}

fn default_sweep_interval_ms() -> u64 {
    10_000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            event_channel_capacity: default_event_channel_capacity(),
            dependency_wait_ms: default_dependency_wait_ms(),
            stats_interval_ms: default_stats_interval_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl Default for FibManagerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            daemon: DaemonConfig::default(),
            fib: FibOrchConfig::default(),
            topology: TopologyConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn dependency_wait(&self) -> Duration {
        Duration::from_millis(self.dependency_wait_ms)
    }

    /// `None` when periodic statistics are disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_ms > 0).then(|| Duration::from_millis(self.stats_interval_ms))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_tasks must be > 0".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be > 0".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl FibManagerConfig {
    /// Loads configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content).map_err(|message| ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "fibmanagerd: config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level: {}",
                self.log_level
            )));
        }
        self.daemon.validate()?;
        self.topology.validate().map_err(ConfigError::Invalid)
    }
}
