//! In-process counters for instrumented database operations.
//!
//! Counters are lock-free so they can be bumped on every call. Consumers
//! either pull a [`MetricsSnapshot`] or let a reset task push one to a
//! [`MetricsSink`] at the end of every interval.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Operations measured by the instrumented executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasuredOperation {
    OpenConnection,
    ExecuteReader,
    ExecuteNonQuery,
    ExecuteScalar,
    Read,
}

impl MeasuredOperation {
    pub const ALL: [MeasuredOperation; 5] = [
        MeasuredOperation::OpenConnection,
        MeasuredOperation::ExecuteReader,
        MeasuredOperation::ExecuteNonQuery,
        MeasuredOperation::ExecuteScalar,
        MeasuredOperation::Read,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenConnection => "open_connection",
            Self::ExecuteReader => "execute_reader",
            Self::ExecuteNonQuery => "execute_non_query",
            Self::ExecuteScalar => "execute_scalar",
            Self::Read => "read",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MeasuredOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one operation.
#[derive(Debug, Default)]
pub struct OperationCounters {
    /// Call count; the base for average elapsed time.
    calls: AtomicU64,
    elapsed_micros: AtomicU64,
    failures: AtomicU64,
    slow: AtomicU64,
}

impl OperationCounters {
    fn snapshot(&self, operation: MeasuredOperation) -> OperationSnapshot {
        OperationSnapshot {
            operation,
            calls: self.calls.load(Ordering::Relaxed),
            elapsed_micros: self.elapsed_micros.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            slow: self.slow.load(Ordering::Relaxed),
        }
    }

    /// Read and zero every counter; each increment lands in exactly one drain.
    fn drain(&self, operation: MeasuredOperation) -> OperationSnapshot {
        OperationSnapshot {
            operation,
            calls: self.calls.swap(0, Ordering::Relaxed),
            elapsed_micros: self.elapsed_micros.swap(0, Ordering::Relaxed),
            failures: self.failures.swap(0, Ordering::Relaxed),
            slow: self.slow.swap(0, Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationSnapshot {
    pub operation: MeasuredOperation,
    pub calls: u64,
    pub elapsed_micros: u64,
    pub failures: u64,
    pub slow: u64,
}

impl OperationSnapshot {
    /// Mean elapsed time per call, zero when nothing was called.
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.elapsed_micros / self.calls)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub category: String,
    pub operations: Vec<OperationSnapshot>,
}

impl MetricsSnapshot {
    pub fn get(&self, operation: MeasuredOperation) -> Option<&OperationSnapshot> {
        self.operations.iter().find(|s| s.operation == operation)
    }
}

/// Receives a snapshot at the end of every reset interval.
pub trait MetricsSink: Send + Sync {
    fn publish(&self, snapshot: &MetricsSnapshot);
}

/// Logs each operation that saw traffic as one `info` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn publish(&self, snapshot: &MetricsSnapshot) {
        for op in snapshot.operations.iter().filter(|s| s.calls > 0) {
            info!(
                category = %snapshot.category,
                operation = %op.operation,
                calls = op.calls,
                failures = op.failures,
                slow = op.slow,
                average_us = op.average().as_micros() as u64,
                "Operation metrics"
            );
        }
    }
}

/// Process-wide registry, shared through `Arc`.
#[derive(Debug)]
pub struct MetricsRegistry {
    category: String,
    counters: [OperationCounters; 5],
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_METRICS_CATEGORY)
    }
}

impl MetricsRegistry {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            counters: Default::default(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Count one call and its elapsed time; failed calls also bump `failures`.
    pub fn record_call(&self, operation: MeasuredOperation, elapsed: Duration, succeeded: bool) {
        let counters = &self.counters[operation.index()];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters
            .elapsed_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if !succeeded {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_slow(&self, operation: MeasuredOperation) {
        self.counters[operation.index()]
            .slow
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn operation(&self, operation: MeasuredOperation) -> OperationSnapshot {
        self.counters[operation.index()].snapshot(operation)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            category: self.category.clone(),
            operations: MeasuredOperation::ALL
                .iter()
                .map(|op| self.operation(*op))
                .collect(),
        }
    }

    pub fn reset(&self) {
        self.take_snapshot();
    }

    /// Snapshot and zero the counters in one pass.
    pub fn take_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            category: self.category.clone(),
            operations: MeasuredOperation::ALL
                .iter()
                .map(|op| self.counters[op.index()].drain(*op))
                .collect(),
        }
    }

    /// Publish and reset the counters every `interval`.
    ///
    /// The first publish happens one full interval after the call.
    pub fn spawn_reset_task(
        self: Arc<Self>,
        interval: Duration,
        sink: Arc<dyn MetricsSink>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                let snapshot = self.take_snapshot();
                sink.publish(&snapshot);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<MetricsSnapshot>>);

    impl MetricsSink for CollectingSink {
        fn publish(&self, snapshot: &MetricsSnapshot) {
            self.0.lock().unwrap().push(snapshot.clone());
        }
    }

    #[test]
    fn test_record_and_snapshot() {
        let registry = MetricsRegistry::new("Cards.Database");
        registry.record_call(MeasuredOperation::ExecuteReader, Duration::from_millis(3), true);
        registry.record_call(MeasuredOperation::ExecuteReader, Duration::from_millis(5), false);
        registry.record_slow(MeasuredOperation::ExecuteReader);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.category, "Cards.Database");
        assert_eq!(snapshot.operations.len(), 5);
        let reader = snapshot.get(MeasuredOperation::ExecuteReader).unwrap();
        assert_eq!(reader.calls, 2);
        assert_eq!(reader.elapsed_micros, 8_000);
        assert_eq!(reader.failures, 1);
        assert_eq!(reader.slow, 1);
        assert_eq!(reader.average(), Duration::from_millis(4));

        let open = snapshot.get(MeasuredOperation::OpenConnection).unwrap();
        assert_eq!(open.calls, 0);
        assert_eq!(open.average(), Duration::ZERO);
    }

    #[test]
    fn test_reset_clears_counters() {
        let registry = MetricsRegistry::default();
        registry.record_call(MeasuredOperation::Read, Duration::from_micros(10), true);
        registry.reset();
        assert_eq!(registry.operation(MeasuredOperation::Read).calls, 0);
    }

    #[test]
    fn test_take_snapshot_loses_no_concurrent_calls() {
        let registry = Arc::new(MetricsRegistry::default());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        registry.record_call(MeasuredOperation::Read, Duration::from_micros(1), true);
                    }
                })
            })
            .collect();

        let mut drained = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            drained += registry.take_snapshot().get(MeasuredOperation::Read).unwrap().calls;
        }
        for writer in writers {
            writer.join().unwrap();
        }
        drained += registry.take_snapshot().get(MeasuredOperation::Read).unwrap().calls;

        assert_eq!(drained, 40_000);
        assert_eq!(registry.operation(MeasuredOperation::Read).calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_task_publishes_then_resets() {
        let registry = Arc::new(MetricsRegistry::default());
        let sink = Arc::new(CollectingSink::default());
        registry.record_call(MeasuredOperation::ExecuteScalar, Duration::from_millis(1), true);

        let handle = registry
            .clone()
            .spawn_reset_task(Duration::from_secs(60), sink.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;

        {
            let published = sink.0.lock().unwrap();
            assert_eq!(published.len(), 1);
            assert_eq!(
                published[0]
                    .get(MeasuredOperation::ExecuteScalar)
                    .unwrap()
                    .calls,
                1
            );
        }
        assert_eq!(registry.operation(MeasuredOperation::ExecuteScalar).calls, 0);
        handle.abort();
    }
}
