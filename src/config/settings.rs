//! Configuration settings and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunk::{LifecycleConfig, DEFAULT_FLUSH_TIMEOUT};
use crate::{Error, Result};

/// Name of the per-tree data directory.
pub const DATA_DIR_NAME: &str = ".carya";

/// Main configuration for a Carya watch session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the source tree to observe.
    pub root_dir: PathBuf,

    /// Directory holding the chunk database.
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Age after which an untouched active chunk is flushed.
    pub flush_timeout: Duration,

    /// Timer period while edits are arriving.
    pub active_interval: Duration,

    /// Timer period once the tree has gone quiet.
    pub idle_interval: Duration,

    /// Quiet time before switching to the idle cadence.
    pub idle_threshold: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let lifecycle = LifecycleConfig::default();
        Self {
            root_dir: PathBuf::from("."),
            data_dir: PathBuf::from(".").join(DATA_DIR_NAME),
            log_level: "info".to_string(),
            log_json: false,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            active_interval: lifecycle.active_interval,
            idle_interval: lifecycle.idle_interval,
            idle_threshold: lifecycle.idle_threshold,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for a tree rooted at `root`, with data kept under `<root>/.carya`.
    #[must_use]
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        let root_dir = root.as_ref().to_path_buf();
        Self {
            data_dir: root_dir.join(DATA_DIR_NAME),
            root_dir,
            ..Self::default()
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        let durations = [
            ("flush_timeout", self.flush_timeout),
            ("active_interval", self.active_interval),
            ("idle_interval", self.idle_interval),
            ("idle_threshold", self.idle_threshold),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::config(format!("{name} cannot be 0")));
            }
        }

        if self.idle_interval < self.active_interval {
            return Err(Error::config(
                "idle_interval cannot be shorter than active_interval",
            ));
        }

        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::config("root_dir cannot be empty"));
        }

        Ok(())
    }

    /// Lifecycle timing derived from this configuration.
    #[must_use]
    pub const fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            active_interval: self.active_interval,
            idle_interval: self.idle_interval,
            idle_threshold: self.idle_threshold,
        }
    }

    /// Get the path to the `SQLite` chunk database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("chunks.db")
    }
}
