//! In-memory backend used by the integration tests.
//!
//! The fake connector records how many connections were opened and closed,
//! how many cursors were dropped, and every command it executed, and can be
//! told to fail at a given stage.

#![allow(dead_code)]

use async_trait::async_trait;
use building_blocks::db::{CommandDescriptor, Connection, Connector, DataRecord, DbValue, RowCursor};
use building_blocks::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailAt {
    #[default]
    Nowhere,
    Open,
    Execute,
    /// Fail on the given zero-based row fetch.
    Read(usize),
    Close,
}

#[derive(Debug, Default)]
pub struct Tally {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub cursors_dropped: AtomicUsize,
    pub commands: Mutex<Vec<String>>,
}

impl Tally {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn cursors_dropped(&self) -> usize {
        self.cursors_dropped.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub tally: Arc<Tally>,
    pub rows: Vec<DataRecord>,
    pub fail_at: FailAt,
    /// Delay applied to every operation.
    pub delay: Duration,
}

impl FakeConnector {
    pub fn with_rows(rows: Vec<DataRecord>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = fail_at;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn describe(&self) -> String {
        "fake cards-db".to_string()
    }

    async fn open(&self) -> Result<Box<dyn Connection>> {
        pause(self.delay).await;
        if self.fail_at == FailAt::Open {
            return Err(Error::connection("listener refused", "Check the listener"));
        }
        self.tally.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            connector: self.clone(),
        }))
    }
}

pub struct FakeConnection {
    connector: FakeConnector,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn execute_reader(&mut self, command: &CommandDescriptor) -> Result<Box<dyn RowCursor>> {
        let c = &self.connector;
        pause(c.delay).await;
        c.tally.commands.lock().unwrap().push(command.formatted());
        if c.fail_at == FailAt::Execute {
            return Err(Error::database(
                "PLS-00201: identifier must be declared",
                Some("ORA-06550".to_string()),
            ));
        }
        Ok(Box::new(FakeCursor {
            rows: c.rows.clone().into(),
            fetched: 0,
            fail_at: c.fail_at,
            delay: c.delay,
            tally: Arc::clone(&c.tally),
        }))
    }

    async fn execute_non_query(&mut self, command: &CommandDescriptor) -> Result<u64> {
        let c = &self.connector;
        pause(c.delay).await;
        c.tally.commands.lock().unwrap().push(command.formatted());
        if c.fail_at == FailAt::Execute {
            return Err(Error::database("unique constraint violated", Some("ORA-00001".to_string())));
        }
        Ok(c.rows.len() as u64)
    }

    async fn execute_scalar(&mut self, command: &CommandDescriptor) -> Result<DbValue> {
        let c = &self.connector;
        pause(c.delay).await;
        c.tally.commands.lock().unwrap().push(command.formatted());
        if c.fail_at == FailAt::Execute {
            return Err(Error::database("no data found", Some("ORA-01403".to_string())));
        }
        Ok(c
            .rows
            .first()
            .and_then(|r| r.get_at(0).cloned())
            .unwrap_or(DbValue::Null))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.connector.tally.closed.fetch_add(1, Ordering::SeqCst);
        if self.connector.fail_at == FailAt::Close {
            return Err(Error::database("connection reset", None));
        }
        Ok(())
    }
}

pub struct FakeCursor {
    rows: std::collections::VecDeque<DataRecord>,
    fetched: usize,
    fail_at: FailAt,
    delay: Duration,
    tally: Arc<Tally>,
}

#[async_trait]
impl RowCursor for FakeCursor {
    async fn next_row(&mut self) -> Result<Option<DataRecord>> {
        pause(self.delay).await;
        if self.fail_at == FailAt::Read(self.fetched) {
            return Err(Error::database("fetch out of sequence", Some("ORA-01002".to_string())));
        }
        self.fetched += 1;
        Ok(self.rows.pop_front())
    }
}

impl Drop for FakeCursor {
    fn drop(&mut self) {
        self.tally.cursors_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Rows shaped like a card lookup result.
pub fn card_rows() -> Vec<DataRecord> {
    vec![
        DataRecord::from_pairs([
            ("CARD_ID", DbValue::Int(1)),
            ("CARD_NUMBER", DbValue::from("4111111111111111")),
            ("HOLDER", DbValue::from("A. Smith")),
        ]),
        DataRecord::from_pairs([
            ("CARD_ID", DbValue::Int(2)),
            ("CARD_NUMBER", DbValue::from("5500005555555559")),
            ("HOLDER", DbValue::Null),
        ]),
    ]
}
