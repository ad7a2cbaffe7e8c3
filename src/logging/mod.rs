//! Batching file logger.
//!
//! - [`BatchingLogger`]: queue plus background flush loop
//! - [`FileBatchWriter`]: rolling, size-limited log files
//! - [`BatchingLayer`]: `tracing_subscriber` layer feeding the logger

pub mod batching;
pub mod file;
pub mod layer;
pub mod options;

use std::sync::Arc;

pub use batching::{BatchWriter, BatchingLogger, LogMessage};
pub use file::FileBatchWriter;
pub use layer::BatchingLayer;
pub use options::{BatchingLoggerOptions, FileLoggerOptions, Periodicity};

use crate::error::Result;

/// Build a file-backed logger from options; not started yet.
pub fn file_logger(options: &FileLoggerOptions) -> Result<BatchingLogger> {
    let writer = FileBatchWriter::new(options)?;
    BatchingLogger::new(Arc::new(writer), options.batching.clone())
}
