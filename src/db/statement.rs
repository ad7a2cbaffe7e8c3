//! Statement text generation per backend dialect.
//!
//! Stored procedures are called with named notation on every backend that
//! supports them:
//! - PostgreSQL: set-returning functions, `SELECT * FROM pkg.proc(p_a => $1)`;
//!   the function's result set stands in for the output ref cursor
//! - Oracle: anonymous PL/SQL block binding the cursor as `:p_cursor`
//! - SQLite: text commands only

use crate::db::command::{CommandDescriptor, CommandKind, DbType, Direction};
use crate::db::types::Dialect;
use crate::error::{Error, Result};

/// What the caller expects back from the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Rows through a cursor.
    Query,
    /// Affected row count.
    NonQuery,
    /// First column of the first row.
    Scalar,
}

/// Build the statement text for `command`.
pub fn build_statement(
    command: &CommandDescriptor,
    dialect: Dialect,
    kind: StatementKind,
) -> Result<String> {
    if command.kind == CommandKind::Text {
        return Ok(command.text.clone());
    }

    match dialect {
        Dialect::Postgres => Ok(postgres_call(command, kind)),
        Dialect::Oracle => oracle_call(command, kind),
        Dialect::SQLite => Err(Error::unsupported(format!(
            "SQLite has no stored procedures; cannot call {}",
            command.text
        ))),
    }
}

fn postgres_call(command: &CommandDescriptor, kind: StatementKind) -> String {
    let args = command
        .bound_inputs()
        .enumerate()
        .map(|(idx, p)| format!("{} => ${}", p.name, idx + 1))
        .collect::<Vec<_>>()
        .join(", ");

    match kind {
        StatementKind::Query => format!("SELECT * FROM {}({})", command.text, args),
        StatementKind::NonQuery => format!("CALL {}({})", command.text, args),
        StatementKind::Scalar => format!("SELECT {}({})", command.text, args),
    }
}

fn oracle_call(command: &CommandDescriptor, kind: StatementKind) -> Result<String> {
    let mut args: Vec<String> = command
        .parameters
        .iter()
        .filter(|p| p.db_type != DbType::RefCursor)
        .filter(|p| kind != StatementKind::Scalar || p.direction != Direction::Output)
        .map(|p| format!("{0} => :{0}", p.name))
        .collect();

    match kind {
        StatementKind::Query => {
            let cursor = command.output_cursor.as_ref().ok_or_else(|| {
                Error::invalid_argument(
                    "output_cursor",
                    format!("{} needs an output cursor to return rows", command.text),
                )
            })?;
            args.push(format!("{0} => :{0}", cursor.name));
            Ok(format!("BEGIN {}({}); END;", command.text, args.join(", ")))
        }
        StatementKind::NonQuery => Ok(format!("BEGIN {}({}); END;", command.text, args.join(", "))),
        StatementKind::Scalar => Ok(format!(
            "SELECT {}({}) FROM DUAL",
            command.text,
            args.join(", ")
        )),
    }
}
