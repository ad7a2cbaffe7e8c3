//! File sink for the batching logger.
//!
//! Each batch is split into time buckets by message timestamp and appended
//! to `<prefix>-<stamp>.<ext>` in the log directory. After every batch the
//! oldest files beyond the retention limit are deleted.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::logging::batching::{BatchWriter, LogMessage};
use crate::logging::options::{FileLoggerOptions, Periodicity};

#[derive(Debug, Clone)]
pub struct FileBatchWriter {
    directory: PathBuf,
    prefix: String,
    extension: String,
    periodicity: Periodicity,
    retained_file_count_limit: Option<usize>,
    file_size_limit: Option<u64>,
}

impl FileBatchWriter {
    pub fn new(options: &FileLoggerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            directory: options.directory.clone(),
            prefix: options.file_name_prefix.clone(),
            extension: options.extension.trim_start_matches('.').to_string(),
            periodicity: options.periodicity,
            retained_file_count_limit: options.retained_file_count_limit,
            file_size_limit: options.file_size_limit,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File that receives messages stamped `timestamp`.
    pub fn file_path(&self, timestamp: &DateTime<FixedOffset>) -> PathBuf {
        let stamp = timestamp.format(self.periodicity.stamp_format());
        self.directory
            .join(format!("{}-{}.{}", self.prefix, stamp, self.extension))
    }

    /// Only `<prefix>-<stamp>.<ext>` names with a full-width stamp match, so
    /// loggers sharing a directory under overlapping prefixes stay apart.
    fn is_log_file(&self, name: &str) -> bool {
        let stamp = name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(self.extension.as_str()))
            .and_then(|rest| rest.strip_suffix('.'));
        match stamp {
            Some(stamp) => {
                stamp.len() == self.periodicity.stamp_width()
                    && stamp.bytes().all(|b| b.is_ascii_digit())
            }
            None => false,
        }
    }

    async fn append(&self, path: &Path, messages: &[&LogMessage]) -> Result<()> {
        if let Some(limit) = self.file_size_limit {
            if let Ok(meta) = fs::metadata(path).await {
                if meta.len() >= limit {
                    return Ok(());
                }
            }
        }

        let mut buf = String::new();
        for message in messages {
            buf.push_str(&message.text);
            if !message.text.ends_with('\n') {
                buf.push('\n');
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Delete the oldest log files beyond the retention limit.
    pub async fn roll_files(&self) -> Result<()> {
        let Some(limit) = self.retained_file_count_limit else {
            return Ok(());
        };

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if self.is_log_file(name) {
                    names.push(name.to_string());
                }
            }
        }

        // Stamps share one width, so name order is chronological.
        names.sort_unstable_by(|a, b| b.cmp(a));
        for name in names.into_iter().skip(limit) {
            fs::remove_file(self.directory.join(name)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BatchWriter for FileBatchWriter {
    async fn write_batch(&self, messages: &[LogMessage]) -> Result<()> {
        fs::create_dir_all(&self.directory).await?;

        let mut buckets: BTreeMap<PathBuf, Vec<&LogMessage>> = BTreeMap::new();
        for message in messages {
            buckets
                .entry(self.file_path(&message.timestamp))
                .or_default()
                .push(message);
        }
        for (path, bucket) in &buckets {
            self.append(path, bucket).await?;
        }

        self.roll_files().await
    }
}
