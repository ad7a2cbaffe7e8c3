//! Backend seams: connectors, connections and row cursors.
//!
//! The traits are object safe so a [`Provider`](crate::db::Provider) can hold
//! any backend behind `Arc<dyn Connector>`.

use async_trait::async_trait;
use std::collections::VecDeque;

use crate::db::command::CommandDescriptor;
use crate::db::record::DataRecord;
use crate::db::types::DbValue;
use crate::error::Result;

/// Opens connections to one configured database.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short description for logs (backend and database, never credentials).
    fn describe(&self) -> String;

    async fn open(&self) -> Result<Box<dyn Connection>>;
}

/// An open connection. Released by [`Connection::close`] or by dropping it.
#[async_trait]
pub trait Connection: Send {
    /// Execute the command and return a cursor over its result set.
    async fn execute_reader(&mut self, command: &CommandDescriptor) -> Result<Box<dyn RowCursor>>;

    /// Execute the command and return the number of affected rows.
    async fn execute_non_query(&mut self, command: &CommandDescriptor) -> Result<u64>;

    /// Execute the command and return the first column of the first row.
    async fn execute_scalar(&mut self, command: &CommandDescriptor) -> Result<DbValue>;

    /// Release the connection back to its pool.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Forward-only cursor over a result set.
#[async_trait]
pub trait RowCursor: Send {
    /// Advance to the next row; `None` once the cursor is exhausted.
    async fn next_row(&mut self) -> Result<Option<DataRecord>>;
}

/// Cursor over rows already fetched from the server.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    rows: VecDeque<DataRecord>,
}

impl BufferedCursor {
    pub fn new(rows: Vec<DataRecord>) -> Self {
        Self { rows: rows.into() }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl RowCursor for BufferedCursor {
    async fn next_row(&mut self) -> Result<Option<DataRecord>> {
        Ok(self.rows.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffered_cursor_is_fifo() {
        let mut cursor = BufferedCursor::new(vec![
            DataRecord::from_pairs([("N", DbValue::Int(1))]),
            DataRecord::from_pairs([("N", DbValue::Int(2))]),
        ]);
        assert_eq!(cursor.remaining(), 2);
        let first = cursor.next_row().await.unwrap().unwrap();
        assert_eq!(first.get_i64("n").unwrap(), Some(1));
        let second = cursor.next_row().await.unwrap().unwrap();
        assert_eq!(second.get_i64("n").unwrap(), Some(2));
        assert!(cursor.next_row().await.unwrap().is_none());
    }
}
