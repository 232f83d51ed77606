//! Configuration loading for the mxsync engine.
//!
//! Configuration is loaded from a TOML file. Every section and field is
//! optional; missing values fall back to defaults.
//!
//! ```toml
//! [executor]
//! max_concurrent_tasks = 4
//!
//! [timeline]
//! initial_window = 20
//! page_size = 20
//! max_window = 500
//!
//! [storage]
//! database = "cache.db"
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 500
//! max_delay_ms = 30000
//! jitter_ms = 250
//! ```

use mxsync_core::{RetryPolicy, WindowSpec};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Task executor configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Live timeline configuration.
    #[serde(default)]
    pub timeline: TimelineConfig,
    /// Cache storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Caller-level retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Task executor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of tasks running at once (default: 4).
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

/// Live timeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineConfig {
    /// Events visible right after binding (default: 20).
    #[serde(default = "default_initial_window")]
    pub initial_window: usize,
    /// Events added by each "load more" (default: 20).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Cap on the window length (default: 500).
    #[serde(default = "default_max_window")]
    pub max_window: usize,
}

/// Cache storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite cache file. Absent means an in-memory cache.
    pub database: Option<PathBuf>,
}

/// Caller-level retry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on any single delay in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Random extra delay in milliseconds (default: 250).
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

// Default value functions
fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_initial_window() -> usize {
    20
}

fn default_page_size() -> usize {
    20
}

fn default_max_window() -> usize {
    500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    250
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            initial_window: default_initial_window(),
            page_size: default_page_size(),
            max_window: default_max_window(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Window sizing for live timelines.
    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec::new(
            self.timeline.initial_window,
            self.timeline.page_size,
            self.timeline.max_window,
        )
    }

    /// Retry policy for caller-level retries.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
        .with_jitter(Duration::from_millis(self.retry.jitter_ms))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.executor.max_concurrent_tasks, 4);
        assert_eq!(config.window_spec(), WindowSpec::new(20, 20, 500));
        assert!(config.storage.database.is_none());
        assert_eq!(config.retry_policy().max_attempts(), 3);
    }

    #[test]
    fn parses_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [executor]
            max_concurrent_tasks = 8

            [timeline]
            initial_window = 5
            page_size = 10
            max_window = 50

            [storage]
            database = "/var/lib/mxsync/cache.db"

            [retry]
            max_attempts = 1
            "#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.executor.max_concurrent_tasks, 8);
        assert_eq!(config.window_spec(), WindowSpec::new(5, 10, 50));
        assert_eq!(
            config.storage.database,
            Some(PathBuf::from("/var/lib/mxsync/cache.db"))
        );
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.base_delay_ms, 500);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: EngineConfig = toml::from_str("[timeline]\npage_size = 7\n").unwrap();
        assert_eq!(config.timeline.page_size, 7);
        assert_eq!(config.timeline.initial_window, 20);
        assert_eq!(config.executor.max_concurrent_tasks, 4);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/mxsync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor\nmax_concurrent_tasks = ").unwrap();

        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("failed to parse config file"));
    }
}
