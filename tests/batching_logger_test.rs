//! Integration tests for batch sizing and ordering of the batching logger.

use async_trait::async_trait;
use building_blocks::logging::{BatchWriter, BatchingLogger, BatchingLoggerOptions, LogMessage};
use std::sync::{Arc, Mutex};
use tokio_test::assert_err;

#[derive(Default)]
struct RecordingWriter {
    batches: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl BatchWriter for RecordingWriter {
    async fn write_batch(&self, messages: &[LogMessage]) -> building_blocks::Result<()> {
        self.batches
            .lock()
            .unwrap()
            .push(messages.iter().map(|m| m.text.clone()).collect());
        Ok(())
    }
}

async fn run(count: usize, batch_size: usize) -> Vec<Vec<String>> {
    let writer = Arc::new(RecordingWriter::default());
    let logger = BatchingLogger::new(
        writer.clone(),
        BatchingLoggerOptions {
            batch_size: Some(batch_size),
            background_queue_size: None,
            flush_period_ms: 60_000,
            is_enabled: true,
        },
    )
    .unwrap();
    logger.start().unwrap();

    // Nothing is flushed before stop: the task has not been polled yet.
    for i in 0..count {
        assert!(logger.try_enqueue(LogMessage::new(format!("message {i}"))));
    }
    logger.stop().await;
    assert_eq!(logger.written_count(), count as u64);

    writer.batches.lock().unwrap().clone()
}

#[tokio::test]
async fn test_batches_are_sized_and_ordered() {
    for (count, batch_size) in [(10, 3), (9, 3), (1, 5), (25, 25)] {
        let batches = run(count, batch_size).await;

        assert_eq!(batches.len(), count.div_ceil(batch_size), "{count}/{batch_size}");
        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));

        let expected: Vec<String> = (0..count).map(|i| format!("message {i}")).collect();
        assert_eq!(batches.concat(), expected);
    }
}

#[tokio::test]
async fn test_stopped_logger_rejects_messages() {
    let writer = Arc::new(RecordingWriter::default());
    let logger = BatchingLogger::new(writer.clone(), BatchingLoggerOptions::default()).unwrap();

    assert!(!logger.try_enqueue(LogMessage::new("before start")));

    logger.start().unwrap();
    assert!(logger.try_enqueue(LogMessage::new("while running")));
    logger.stop().await;

    assert_err!(logger.enqueue(LogMessage::new("after stop")).await);
    assert_eq!(writer.batches.lock().unwrap().concat(), vec!["while running"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_lose_nothing() {
    let writer = Arc::new(RecordingWriter::default());
    let logger = BatchingLogger::new(
        writer.clone(),
        BatchingLoggerOptions {
            batch_size: Some(16),
            background_queue_size: Some(64),
            flush_period_ms: 5,
            is_enabled: true,
        },
    )
    .unwrap();
    logger.start().unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let logger = logger.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    logger
                        .enqueue(LogMessage::new(format!("{p}:{i}")))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    logger.stop().await;

    let batches = writer.batches.lock().unwrap();
    assert!(batches.iter().all(|b| b.len() <= 16));
    let all = batches.concat();
    assert_eq!(all.len(), 400);
    // Per-producer order is preserved.
    for p in 0..4 {
        let prefix = format!("{p}:");
        let seen: Vec<usize> = all
            .iter()
            .filter_map(|m| m.strip_prefix(&prefix))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}
