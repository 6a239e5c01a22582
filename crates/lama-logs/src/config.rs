//! LogLama configuration.
//!
//! Plain values only: where log files and the database live, the message
//! cap, collector scheduling and page sizes. Nothing in here reads the
//! environment; the CLI maps its flags and environment variables onto a
//! [`LamaConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorConfig;
use crate::error::{LogError, Result};
use crate::types::{DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, RecordLimits};
use crate::writer::{DEFAULT_BACKUP_COUNT, DEFAULT_MAX_LOG_SIZE, JsonLinesWriter};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LamaConfig {
    /// Directory holding per-component log files.
    pub log_dir: PathBuf,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Messages longer than this many characters are truncated.
    pub max_message_length: usize,
    /// Seconds between background collector passes.
    pub collector_interval_secs: u64,
    /// Whether long-running commands start the background collector.
    pub collector_enabled: bool,
    /// Wall-clock budget for one source scan, in seconds.
    pub source_timeout_secs: u64,
    /// Rows per page when a request names none.
    pub default_page_size: u32,
    /// Upper bound on rows per page.
    pub max_page_size: u32,
    /// Component files are rotated before growing past this many bytes.
    /// Zero disables rotation.
    pub max_log_size: u64,
    /// Rotated copies kept per component file. Zero disables rotation.
    pub backup_count: u32,
}

impl Default for LamaConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            db_path: PathBuf::from("logs/loglama.db"),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            collector_interval_secs: 300,
            collector_enabled: true,
            source_timeout_secs: 30,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            max_log_size: DEFAULT_MAX_LOG_SIZE,
            backup_count: DEFAULT_BACKUP_COUNT,
        }
    }
}

impl LamaConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LogError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| LogError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Sets the log directory.
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    /// Sets the message cap.
    #[must_use]
    pub const fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    /// Sets the collector interval.
    #[must_use]
    pub const fn with_collector_interval_secs(mut self, secs: u64) -> Self {
        self.collector_interval_secs = secs;
        self
    }

    /// Enables or disables the background collector.
    #[must_use]
    pub const fn with_collector_enabled(mut self, enabled: bool) -> Self {
        self.collector_enabled = enabled;
        self
    }

    /// Sets the rotation size and backup count for component files.
    #[must_use]
    pub const fn with_rotation(mut self, max_log_size: u64, backup_count: u32) -> Self {
        self.max_log_size = max_log_size;
        self.backup_count = backup_count;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(LogError::Config("db_path cannot be empty".to_string()));
        }

        if self.log_dir.as_os_str().is_empty() {
            return Err(LogError::Config("log_dir cannot be empty".to_string()));
        }

        if self.max_message_length == 0 {
            return Err(LogError::Config(
                "max_message_length must be greater than 0".to_string(),
            ));
        }

        if self.collector_interval_secs == 0 {
            return Err(LogError::Config(
                "collector_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.source_timeout_secs == 0 {
            return Err(LogError::Config(
                "source_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE {
            return Err(LogError::Config(format!(
                "max_page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(LogError::Config(
                "default_page_size must be between 1 and max_page_size".to_string(),
            ));
        }

        Ok(())
    }

    /// Record limits derived from this configuration.
    #[must_use]
    pub const fn record_limits(&self) -> RecordLimits {
        RecordLimits::with_max_message_length(self.max_message_length)
    }

    /// Collector settings derived from this configuration, discovering
    /// sources in `log_dir` on each pass.
    #[must_use]
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::default()
            .with_interval(Duration::from_secs(self.collector_interval_secs))
            .with_source_timeout(Duration::from_secs(self.source_timeout_secs))
            .with_log_dir(&self.log_dir)
    }

    /// Opens the component file writer for `log_dir` with the configured
    /// limits and rotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the log directory cannot be created.
    pub fn file_writer(&self) -> Result<JsonLinesWriter> {
        Ok(JsonLinesWriter::new(&self.log_dir, self.record_limits())?
            .with_rotation(self.max_log_size, self.backup_count))
    }
}
