//! Database access layer.
//!
//! This module provides the instrumented data-access wrapper:
//! - Command descriptors and statement generation per dialect
//! - Backend seams (`Connector`, `Connection`, `RowCursor`)
//! - sqlx pools for PostgreSQL and SQLite, Oracle behind the `oracle` feature
//! - The instrumented executor and the provider base
//! - Row records with typed accessors

pub mod command;
pub mod connection;
pub mod executor;
#[cfg(feature = "oracle")]
pub mod oracle;
pub(crate) mod params;
pub mod pool;
pub mod provider;
pub mod record;
pub mod statement;
pub mod types;

pub use command::{
    CommandDescriptor, CommandKind, DEFAULT_CURSOR_PARAMETER, DbType, Direction, Parameter,
};
pub use connection::{BufferedCursor, Connection, Connector, RowCursor};
pub use executor::InstrumentedExecutor;
#[cfg(feature = "oracle")]
pub use oracle::OracleConnector;
pub use pool::{DbPool, SqlxConnector};
pub use provider::Provider;
pub use record::DataRecord;
pub use types::{DbValue, Dialect};
