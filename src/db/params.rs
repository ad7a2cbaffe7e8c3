//! Parameter binding utilities for the sqlx backends.
//!
//! Binds [`DbValue`]s positionally, in the order produced by
//! [`CommandDescriptor::bound_inputs`](crate::db::CommandDescriptor::bound_inputs).

use crate::db::command::CommandDescriptor;
use crate::db::types::DbValue;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Postgres, Sqlite};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;
type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a value to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(query: PgQuery<'q>, value: &'q DbValue) -> PgQuery<'q> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Bool(v) => query.bind(*v),
        DbValue::Int(v) => query.bind(*v),
        DbValue::Float(v) => query.bind(*v),
        DbValue::Timestamp(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.as_str()),
        DbValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: SqliteQuery<'q>,
    value: &'q DbValue,
) -> SqliteQuery<'q> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Bool(v) => query.bind(*v),
        DbValue::Int(v) => query.bind(*v),
        DbValue::Float(v) => query.bind(*v),
        DbValue::Timestamp(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.as_str()),
        DbValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Build a PostgreSQL query with every input parameter of `command` bound.
pub(crate) fn postgres_query<'q>(sql: &'q str, command: &'q CommandDescriptor) -> PgQuery<'q> {
    command
        .bound_inputs()
        .fold(sqlx::query(sql), |q, p| bind_postgres_param(q, &p.value))
}

/// Build a SQLite query with every input parameter of `command` bound.
pub(crate) fn sqlite_query<'q>(sql: &'q str, command: &'q CommandDescriptor) -> SqliteQuery<'q> {
    command
        .bound_inputs()
        .fold(sqlx::query(sql), |q, p| bind_sqlite_param(q, &p.value))
}
