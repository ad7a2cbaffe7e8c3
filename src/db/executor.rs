//! Instrumented command execution.
//!
//! Every connection open, command execution and row advance goes through
//! [`InstrumentedExecutor`], which times the call, records it in the
//! [`MetricsRegistry`] and logs one warning when it ran past the operation's
//! threshold. Results and errors pass through untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::InstrumentationSettings;
use crate::db::command::CommandDescriptor;
use crate::db::connection::{Connection, Connector, RowCursor};
use crate::db::record::DataRecord;
use crate::db::types::DbValue;
use crate::error::Result;
use crate::metrics::{MeasuredOperation, MetricsRegistry};

/// Times one operation.
struct OperationTimer {
    operation: MeasuredOperation,
    start: Instant,
    threshold: Duration,
}

impl OperationTimer {
    fn start(operation: MeasuredOperation, threshold: Duration) -> Self {
        Self {
            operation,
            start: Instant::now(),
            threshold,
        }
    }

    /// Record the outcome; `describe` is only evaluated for slow calls.
    fn finish(
        self,
        metrics: &MetricsRegistry,
        succeeded: bool,
        describe: impl FnOnce() -> String,
    ) -> Duration {
        let elapsed = self.start.elapsed();
        metrics.record_call(self.operation, elapsed, succeeded);

        if elapsed > self.threshold {
            metrics.record_slow(self.operation);
            warn!(
                operation = %self.operation,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                succeeded,
                command = %describe(),
                "Slow database operation"
            );
        } else if self.operation != MeasuredOperation::Read {
            debug!(
                operation = %self.operation,
                elapsed_ms = elapsed.as_millis() as u64,
                succeeded,
                "Database operation completed"
            );
        }
        elapsed
    }
}

/// Wraps backend calls with timing, counters and slow-call warnings.
#[derive(Debug, Clone)]
pub struct InstrumentedExecutor {
    settings: InstrumentationSettings,
    metrics: Arc<MetricsRegistry>,
}

impl Default for InstrumentedExecutor {
    fn default() -> Self {
        Self::new(
            InstrumentationSettings::default(),
            Arc::new(MetricsRegistry::default()),
        )
    }
}

impl InstrumentedExecutor {
    pub fn new(settings: InstrumentationSettings, metrics: Arc<MetricsRegistry>) -> Self {
        Self { settings, metrics }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn settings(&self) -> &InstrumentationSettings {
        &self.settings
    }

    async fn measure<T, F>(
        &self,
        operation: MeasuredOperation,
        describe: impl FnOnce() -> String,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timer = OperationTimer::start(operation, self.settings.threshold(operation));
        let result = call.await;
        timer.finish(&self.metrics, result.is_ok(), describe);
        result
    }

    /// Open a connection through `connector`.
    pub async fn open(&self, connector: &dyn Connector) -> Result<Box<dyn Connection>> {
        self.measure(
            MeasuredOperation::OpenConnection,
            || connector.describe(),
            connector.open(),
        )
        .await
    }

    pub async fn execute_reader(
        &self,
        connection: &mut dyn Connection,
        command: &CommandDescriptor,
    ) -> Result<Box<dyn RowCursor>> {
        self.measure(
            MeasuredOperation::ExecuteReader,
            || command.formatted(),
            connection.execute_reader(command),
        )
        .await
    }

    pub async fn execute_non_query(
        &self,
        connection: &mut dyn Connection,
        command: &CommandDescriptor,
    ) -> Result<u64> {
        self.measure(
            MeasuredOperation::ExecuteNonQuery,
            || command.formatted(),
            connection.execute_non_query(command),
        )
        .await
    }

    pub async fn execute_scalar(
        &self,
        connection: &mut dyn Connection,
        command: &CommandDescriptor,
    ) -> Result<DbValue> {
        self.measure(
            MeasuredOperation::ExecuteScalar,
            || command.formatted(),
            connection.execute_scalar(command),
        )
        .await
    }

    /// Advance `cursor` by one row.
    pub async fn read(
        &self,
        cursor: &mut dyn RowCursor,
        command: &CommandDescriptor,
    ) -> Result<Option<DataRecord>> {
        self.measure(
            MeasuredOperation::Read,
            || command.formatted(),
            cursor.next_row(),
        )
        .await
    }
}
