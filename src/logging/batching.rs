//! Batching logger.
//!
//! Messages are queued by producers and written by one background task in
//! batches of at most `batch_size`, once per `flush_period`. Stopping the
//! logger closes the queue, lets the task drain what is left into final
//! batches, and waits for it to exit.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::logging::options::BatchingLoggerOptions;

/// One formatted log line. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub timestamp: DateTime<FixedOffset>,
    pub text: String,
}

impl LogMessage {
    /// Message stamped with the current local time.
    pub fn new(text: impl Into<String>) -> Self {
        Self::at(Local::now().fixed_offset(), text)
    }

    pub fn at(timestamp: DateTime<FixedOffset>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }
}

/// Destination of flushed batches.
#[async_trait]
pub trait BatchWriter: Send + Sync + 'static {
    async fn write_batch(&self, messages: &[LogMessage]) -> Result<()>;
}

#[derive(Clone)]
enum QueueSender {
    Bounded(mpsc::Sender<LogMessage>),
    Unbounded(mpsc::UnboundedSender<LogMessage>),
}

enum QueueReceiver {
    Bounded(mpsc::Receiver<LogMessage>),
    Unbounded(mpsc::UnboundedReceiver<LogMessage>),
}

impl QueueReceiver {
    fn try_recv(&mut self) -> std::result::Result<LogMessage, TryRecvError> {
        match self {
            QueueReceiver::Bounded(rx) => rx.try_recv(),
            QueueReceiver::Unbounded(rx) => rx.try_recv(),
        }
    }

    fn close(&mut self) {
        match self {
            QueueReceiver::Bounded(rx) => rx.close(),
            QueueReceiver::Unbounded(rx) => rx.close(),
        }
    }

    /// Take up to `limit` queued messages without waiting.
    fn drain(&mut self, limit: Option<usize>) -> Vec<LogMessage> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut batch = Vec::new();
        while batch.len() < limit {
            match self.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        batch
    }
}

fn channel(capacity: Option<usize>) -> (QueueSender, QueueReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }
}

struct Running {
    sender: QueueSender,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
    failed_batches: AtomicU64,
    reported_failure: AtomicBool,
}

struct Inner {
    writer: Arc<dyn BatchWriter>,
    options: Mutex<BatchingLoggerOptions>,
    running: Mutex<Option<Running>>,
    counters: Arc<Counters>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // The task drains the queue and exits on its own.
        if let Some(running) = running {
            let _ = running.stop.send(true);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a batching logger; clones share the same queue and task.
#[derive(Clone)]
pub struct BatchingLogger {
    inner: Arc<Inner>,
}

impl BatchingLogger {
    /// Create a stopped logger.
    pub fn new(writer: Arc<dyn BatchWriter>, options: BatchingLoggerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                writer,
                options: Mutex::new(options),
                running: Mutex::new(None),
                counters: Arc::new(Counters::default()),
            }),
        })
    }

    pub fn options(&self) -> BatchingLoggerOptions {
        lock(&self.inner.options).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.running).is_some()
    }

    /// Messages handed to the writer successfully.
    pub fn written_count(&self) -> u64 {
        self.inner.counters.written.load(Ordering::Relaxed)
    }

    /// Messages rejected by [`BatchingLogger::try_enqueue`] on a full queue.
    pub fn dropped_count(&self) -> u64 {
        self.inner.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn failed_batch_count(&self) -> u64 {
        self.inner.counters.failed_batches.load(Ordering::Relaxed)
    }

    /// Start the background task. No-op when already running or disabled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| {
            Error::unsupported("the batching logger must be started inside a tokio runtime")
        })?;
        let options = self.options();
        let mut running = lock(&self.inner.running);
        if running.is_some() || !options.is_enabled {
            return Ok(());
        }

        let (sender, receiver) = channel(options.background_queue_size);
        let (stop, stop_rx) = watch::channel(false);
        let task = handle.spawn(run(
            Arc::clone(&self.inner.writer),
            Arc::clone(&self.inner.counters),
            receiver,
            stop_rx,
            options,
        ));
        *running = Some(Running { sender, stop, task });
        Ok(())
    }

    /// Stop accepting messages, flush what is queued and wait for the task.
    pub async fn stop(&self) {
        let running = lock(&self.inner.running).take();
        if let Some(Running { sender, stop, task }) = running {
            let _ = stop.send(true);
            drop(sender);
            let _ = task.await;
        }
    }

    /// Queue a message, waiting for space when the bounded queue is full.
    pub async fn enqueue(&self, message: LogMessage) -> Result<()> {
        let sender = lock(&self.inner.running)
            .as_ref()
            .map(|r| r.sender.clone())
            .ok_or(Error::QueueClosed)?;
        match sender {
            QueueSender::Bounded(tx) => tx.send(message).await.map_err(|_| Error::QueueClosed),
            QueueSender::Unbounded(tx) => tx.send(message).map_err(|_| Error::QueueClosed),
        }
    }

    /// Queue a message without waiting; returns `false` if it was dropped.
    pub fn try_enqueue(&self, message: LogMessage) -> bool {
        let running = lock(&self.inner.running);
        let Some(running) = running.as_ref() else {
            return false;
        };
        match &running.sender {
            QueueSender::Bounded(tx) => match tx.try_send(message) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
            QueueSender::Unbounded(tx) => tx.send(message).is_ok(),
        }
    }

    /// Apply new options; the loop restarts with them, or stays stopped when disabled.
    pub async fn reconfigure(&self, options: BatchingLoggerOptions) -> Result<()> {
        options.validate()?;
        self.stop().await;
        *lock(&self.inner.options) = options;
        self.start()
    }
}

impl std::fmt::Debug for BatchingLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchingLogger")
            .field("options", &self.options())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run(
    writer: Arc<dyn BatchWriter>,
    counters: Arc<Counters>,
    mut receiver: QueueReceiver,
    mut stop: watch::Receiver<bool>,
    options: BatchingLoggerOptions,
) {
    let flush_period = options.flush_period();
    loop {
        let batch = receiver.drain(options.batch_size);
        if !batch.is_empty() {
            write(writer.as_ref(), &counters, &batch).await;
        }

        tokio::select! {
            _ = tokio::time::sleep(flush_period) => {}
            _ = stop.changed() => break,
        }
    }

    receiver.close();
    loop {
        let batch = receiver.drain(options.batch_size);
        if batch.is_empty() {
            break;
        }
        write(writer.as_ref(), &counters, &batch).await;
    }
}

async fn write(writer: &dyn BatchWriter, counters: &Counters, batch: &[LogMessage]) {
    match writer.write_batch(batch).await {
        Ok(()) => {
            counters
                .written
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed_batches.fetch_add(1, Ordering::Relaxed);
            // Not through tracing: the failing sink may be the one receiving it.
            if !counters.reported_failure.swap(true, Ordering::Relaxed) {
                eprintln!("batching logger: dropping batch of {}: {}", batch.len(), e);
            }
        }
    }
}
