//! sqlx-backed connector.
//!
//! This module provides the PostgreSQL and SQLite backends using
//! database-specific pools (PgPool, SqlitePool) to keep full type support.
//! Rows are fetched eagerly and served through a [`BufferedCursor`].

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{
    PgPool, Postgres, Sqlite, SqlitePool, postgres::PgPoolOptions, sqlite::SqliteConnectOptions,
    sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{PoolOptions, redact_connection_string};
use crate::db::command::CommandDescriptor;
use crate::db::connection::{BufferedCursor, Connection, Connector, RowCursor};
use crate::db::params::{postgres_query, sqlite_query};
use crate::db::statement::{StatementKind, build_statement};
use crate::db::types::{DbValue, Dialect, rows_to_records};
use crate::error::{Error, Result};

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the dialect for this pool.
    pub fn dialect(&self) -> Dialect {
        match self {
            DbPool::Postgres(_) => Dialect::Postgres,
            DbPool::SQLite(_) => Dialect::SQLite,
        }
    }
}

/// Parse the dialect from a connection string scheme.
pub fn dialect_from_connection_string(connection_string: &str) -> Option<Dialect> {
    let lower = connection_string.to_lowercase();
    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        Some(Dialect::Postgres)
    } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
        Some(Dialect::SQLite)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SqlxConnector {
    pool: DbPool,
    label: String,
}

impl SqlxConnector {
    /// Create a pool for `connection_string` and wrap it.
    pub async fn connect(connection_string: &str, options: &PoolOptions) -> Result<Self> {
        options.validate().map_err(Error::config)?;
        let dialect = dialect_from_connection_string(connection_string).ok_or_else(|| {
            Error::connection(
                "Unknown database type",
                "Use a postgres:// or sqlite: connection string",
            )
        })?;
        let label = redact_connection_string(connection_string);

        info!(database = %label, dialect = %dialect, "Creating connection pool");

        let is_sqlite = dialect == Dialect::SQLite;
        let acquire_timeout = Duration::from_secs(options.acquire_timeout_or_default());
        let idle_timeout = Some(Duration::from_secs(options.idle_timeout_or_default()));

        let pool = match dialect {
            Dialect::Postgres => {
                let pool = PgPoolOptions::new()
                    .min_connections(options.min_connections_or_default())
                    .max_connections(options.max_connections_or_default(is_sqlite))
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(options.test_before_acquire_or_default())
                    .connect(connection_string)
                    .await
                    .map_err(|e| {
                        Error::connection(
                            format!("Failed to connect: {}", e),
                            "Check that PostgreSQL is running and the credentials are valid",
                        )
                    })?;
                DbPool::Postgres(pool)
            }
            Dialect::SQLite => {
                let connect_options = SqliteConnectOptions::from_str(connection_string)
                    .map_err(|e| {
                        Error::connection(
                            format!("Invalid SQLite connection string: {}", e),
                            "Check the connection URL format: sqlite:path/to/db.sqlite",
                        )
                    })?
                    .create_if_missing(true);

                let pool = SqlitePoolOptions::new()
                    .min_connections(options.min_connections_or_default())
                    .max_connections(options.max_connections_or_default(is_sqlite))
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(options.test_before_acquire_or_default())
                    .connect_with(connect_options)
                    .await
                    .map_err(|e| {
                        Error::connection(
                            format!("Failed to connect: {}", e),
                            "Check that the SQLite file path exists and is writable",
                        )
                    })?;
                DbPool::SQLite(pool)
            }
            Dialect::Oracle => {
                return Err(Error::unsupported(
                    "Oracle connections use the oracle connector",
                ));
            }
        };

        debug!(database = %label, "Connection pool ready");
        Ok(Self { pool, label })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: DbPool, label: impl Into<String>) -> Self {
        Self {
            pool,
            label: label.into(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn close(&self) {
        info!(database = %self.label, "Closing connection pool");
        self.pool.close().await;
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    fn describe(&self) -> String {
        format!("{} {}", self.pool.dialect(), self.label)
    }

    async fn open(&self) -> Result<Box<dyn Connection>> {
        let conn = match &self.pool {
            DbPool::Postgres(pool) => SqlxConnection::Postgres(pool.acquire().await?),
            DbPool::SQLite(pool) => SqlxConnection::SQLite(pool.acquire().await?),
        };
        Ok(Box::new(conn))
    }
}

/// A pooled connection; returned to its pool when dropped.
pub enum SqlxConnection {
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

#[async_trait]
impl Connection for SqlxConnection {
    async fn execute_reader(&mut self, command: &CommandDescriptor) -> Result<Box<dyn RowCursor>> {
        let records = match self {
            SqlxConnection::Postgres(conn) => {
                let sql = build_statement(command, Dialect::Postgres, StatementKind::Query)?;
                let rows = postgres_query(&sql, command).fetch_all(&mut **conn).await?;
                rows_to_records(rows)?
            }
            SqlxConnection::SQLite(conn) => {
                let sql = build_statement(command, Dialect::SQLite, StatementKind::Query)?;
                let rows = sqlite_query(&sql, command).fetch_all(&mut **conn).await?;
                rows_to_records(rows)?
            }
        };
        Ok(Box::new(BufferedCursor::new(records)))
    }

    async fn execute_non_query(&mut self, command: &CommandDescriptor) -> Result<u64> {
        let affected = match self {
            SqlxConnection::Postgres(conn) => {
                let sql = build_statement(command, Dialect::Postgres, StatementKind::NonQuery)?;
                postgres_query(&sql, command)
                    .execute(&mut **conn)
                    .await?
                    .rows_affected()
            }
            SqlxConnection::SQLite(conn) => {
                let sql = build_statement(command, Dialect::SQLite, StatementKind::NonQuery)?;
                sqlite_query(&sql, command)
                    .execute(&mut **conn)
                    .await?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    async fn execute_scalar(&mut self, command: &CommandDescriptor) -> Result<DbValue> {
        let records = match self {
            SqlxConnection::Postgres(conn) => {
                let sql = build_statement(command, Dialect::Postgres, StatementKind::Scalar)?;
                let row = postgres_query(&sql, command)
                    .fetch_optional(&mut **conn)
                    .await?;
                rows_to_records(row.into_iter().collect())?
            }
            SqlxConnection::SQLite(conn) => {
                let sql = build_statement(command, Dialect::SQLite, StatementKind::Scalar)?;
                let row = sqlite_query(&sql, command)
                    .fetch_optional(&mut **conn)
                    .await?;
                rows_to_records(row.into_iter().collect())?
            }
        };
        Ok(records
            .first()
            .and_then(|r| r.get_at(0).cloned())
            .unwrap_or(DbValue::Null))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Dropping a PoolConnection hands it back to the pool.
        match *self {
            SqlxConnection::Postgres(conn) => drop(conn),
            SqlxConnection::SQLite(conn) => drop(conn),
        }
        Ok(())
    }
}
