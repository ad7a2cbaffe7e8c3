//! Integration tests for slow-operation instrumentation.
//!
//! Time is paused, so the fake backend's delays advance the clock
//! deterministically.

mod common;

use async_trait::async_trait;
use building_blocks::config::InstrumentationSettings;
use building_blocks::db::{InstrumentedExecutor, Parameter, Provider};
use building_blocks::logging::{
    BatchWriter, BatchingLayer, BatchingLogger, BatchingLoggerOptions, LogMessage,
};
use building_blocks::metrics::{MeasuredOperation, MetricsRegistry};
use common::{FailAt, FakeConnector, card_rows};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Default)]
struct Lines(Mutex<Vec<String>>);

#[async_trait]
impl BatchWriter for Lines {
    async fn write_batch(&self, messages: &[LogMessage]) -> building_blocks::Result<()> {
        self.0
            .lock()
            .unwrap()
            .extend(messages.iter().map(|m| m.text.clone()));
        Ok(())
    }
}

/// Route `WARN` and above into `Lines` for the rest of the test.
fn capture_warnings() -> (Arc<Lines>, BatchingLogger, tracing::subscriber::DefaultGuard) {
    let lines = Arc::new(Lines::default());
    let logger = BatchingLogger::new(lines.clone(), BatchingLoggerOptions::default()).unwrap();
    logger.start().unwrap();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::WARN)
        .with(BatchingLayer::new(logger.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (lines, logger, guard)
}

fn provider(
    connector: FakeConnector,
    settings: InstrumentationSettings,
) -> (Provider, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new("Cards.Database"));
    let executor = InstrumentedExecutor::new(settings, Arc::clone(&metrics));
    (Provider::new(Arc::new(connector), executor), metrics)
}

#[tokio::test(start_paused = true)]
async fn test_slow_operations_are_counted() {
    let connector = FakeConnector::with_rows(card_rows()).with_delay(Duration::from_millis(200));
    let settings = InstrumentationSettings {
        open_connection_ms: Some(500),
        execute_reader_ms: Some(100),
        read_ms: Some(1000),
        ..InstrumentationSettings::uniform(1000)
    };
    let (provider, metrics) = provider(connector, settings);

    provider
        .get("cards.get_cards", Vec::new(), "p_cursor", |r| r.require_i64("card_id"))
        .await
        .unwrap();

    let open = metrics.operation(MeasuredOperation::OpenConnection);
    assert_eq!((open.calls, open.slow), (1, 0));

    let reader = metrics.operation(MeasuredOperation::ExecuteReader);
    assert_eq!((reader.calls, reader.slow), (1, 1));
    assert!(reader.average() >= Duration::from_millis(200));

    let read = metrics.operation(MeasuredOperation::Read);
    assert_eq!((read.calls, read.slow), (3, 0));
}

#[tokio::test(start_paused = true)]
async fn test_slow_failure_is_counted_and_passed_through() {
    let connector = FakeConnector::with_rows(card_rows())
        .with_delay(Duration::from_millis(50))
        .failing_at(FailAt::Execute);
    let (provider, metrics) = provider(connector, InstrumentationSettings::uniform(10));

    let err = provider
        .execute_non_query("cards.block_card", [Parameter::input("p_card_id", 9i64)])
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        building_blocks::Error::Database { code: Some(code), .. } if code == "ORA-00001"
    ));

    let non_query = metrics.operation(MeasuredOperation::ExecuteNonQuery);
    assert_eq!(non_query.calls, 1);
    assert_eq!(non_query.failures, 1);
    assert_eq!(non_query.slow, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_operation_logs_one_warning() {
    let (lines, logger, guard) = capture_warnings();

    let connector = FakeConnector::with_rows(card_rows()).with_delay(Duration::from_millis(300));
    let settings = InstrumentationSettings {
        execute_scalar_ms: Some(100),
        ..InstrumentationSettings::uniform(1000)
    };
    let (provider, _metrics) = provider(connector, settings);
    provider
        .execute_scalar("cards.count_cards", [Parameter::input("p_customer_id", 42i64)])
        .await
        .unwrap();

    drop(guard);
    logger.stop().await;

    let lines = lines.0.lock().unwrap();
    assert_eq!(lines.len(), 1, "{:?}", *lines);
    let line = &lines[0];
    assert!(line.contains("[WARN]"), "{line}");
    assert!(line.contains("Slow database operation"), "{line}");
    assert!(line.contains("operation=execute_scalar"), "{line}");
    assert!(line.contains("threshold_ms=100"), "{line}");
    assert!(line.contains("cards.count_cards(p_customer_id => 42)"), "{line}");
}

#[tokio::test(start_paused = true)]
async fn test_operations_under_threshold_log_nothing() {
    let (lines, logger, guard) = capture_warnings();

    let connector = FakeConnector::with_rows(card_rows()).with_delay(Duration::from_millis(50));
    let (provider, metrics) = provider(connector, InstrumentationSettings::uniform(100));
    provider
        .get("cards.get_cards", Vec::new(), "p_cursor", |r| r.require_i64("card_id"))
        .await
        .unwrap();
    provider
        .execute_non_query("cards.block_card", [Parameter::input("p_card_id", 9i64)])
        .await
        .unwrap();
    provider
        .execute_scalar("cards.count_cards", [Parameter::input("p_customer_id", 42i64)])
        .await
        .unwrap();

    drop(guard);
    logger.stop().await;

    let captured = lines.0.lock().unwrap();
    assert!(captured.is_empty(), "{:?}", *captured);
    for operation in MeasuredOperation::ALL {
        assert_eq!(metrics.operation(operation).slow, 0, "{operation}");
    }
}
