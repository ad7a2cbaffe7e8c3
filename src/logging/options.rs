//! Options for the batching logger and its file writer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BACKGROUND_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_FLUSH_PERIOD_MS: u64 = 1000;
pub const DEFAULT_FILE_NAME_PREFIX: &str = "logs";
pub const DEFAULT_EXTENSION: &str = "txt";
pub const DEFAULT_RETAINED_FILE_COUNT: usize = 2;
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingLoggerOptions {
    /// Maximum messages per batch; `None` drains everything queued.
    pub batch_size: Option<usize>,
    /// Bounded queue capacity; `None` for an unbounded queue.
    pub background_queue_size: Option<usize>,
    pub flush_period_ms: u64,
    pub is_enabled: bool,
}

impl Default for BatchingLoggerOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            background_queue_size: Some(DEFAULT_BACKGROUND_QUEUE_SIZE),
            flush_period_ms: DEFAULT_FLUSH_PERIOD_MS,
            is_enabled: true,
        }
    }
}

impl BatchingLoggerOptions {
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_period_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == Some(0) {
            return Err(Error::config("batch_size must be greater than 0"));
        }
        if self.background_queue_size == Some(0) {
            return Err(Error::config(
                "background_queue_size must be greater than 0",
            ));
        }
        if self.flush_period_ms == 0 {
            return Err(Error::config("flush_period_ms must be greater than 0"));
        }
        Ok(())
    }
}

/// Time bucket that selects the file a message goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Monthly,
    Yearly,
}

impl Periodicity {
    /// `chrono` format string of the file name stamp.
    pub fn stamp_format(self) -> &'static str {
        match self {
            Periodicity::Minutely => "%Y%m%d%H%M",
            Periodicity::Hourly => "%Y%m%d%H",
            Periodicity::Daily => "%Y%m%d",
            Periodicity::Monthly => "%Y%m",
            Periodicity::Yearly => "%Y",
        }
    }

    /// Number of digits `stamp_format` produces.
    pub fn stamp_width(self) -> usize {
        match self {
            Periodicity::Minutely => 12,
            Periodicity::Hourly => 10,
            Periodicity::Daily => 8,
            Periodicity::Monthly => 6,
            Periodicity::Yearly => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggerOptions {
    #[serde(flatten)]
    pub batching: BatchingLoggerOptions,
    pub directory: PathBuf,
    pub file_name_prefix: String,
    pub extension: String,
    pub periodicity: Periodicity,
    /// Files kept after a roll; `None` keeps everything.
    pub retained_file_count_limit: Option<usize>,
    /// A bucket whose file has reached this size is skipped; `None` for no limit.
    pub file_size_limit: Option<u64>,
}

impl Default for FileLoggerOptions {
    fn default() -> Self {
        Self {
            batching: BatchingLoggerOptions::default(),
            directory: PathBuf::from("logs"),
            file_name_prefix: DEFAULT_FILE_NAME_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            periodicity: Periodicity::default(),
            retained_file_count_limit: Some(DEFAULT_RETAINED_FILE_COUNT),
            file_size_limit: Some(DEFAULT_FILE_SIZE_LIMIT),
        }
    }
}

impl FileLoggerOptions {
    pub fn validate(&self) -> Result<()> {
        self.batching.validate()?;
        if self.directory.as_os_str().is_empty() {
            return Err(Error::config("file_logger.directory must not be empty"));
        }
        if self.file_name_prefix.trim().is_empty() {
            return Err(Error::config(
                "file_logger.file_name_prefix must not be blank",
            ));
        }
        if self
            .file_name_prefix
            .contains(|c: char| c == '/' || c == '\\')
        {
            return Err(Error::config(
                "file_logger.file_name_prefix must not contain path separators",
            ));
        }
        if self.extension.trim().is_empty() {
            return Err(Error::config("file_logger.extension must not be blank"));
        }
        if self.retained_file_count_limit == Some(0) {
            return Err(Error::config(
                "file_logger.retained_file_count_limit must be greater than 0",
            ));
        }
        if self.file_size_limit == Some(0) {
            return Err(Error::config(
                "file_logger.file_size_limit must be greater than 0",
            ));
        }
        Ok(())
    }
}
