//! Error types for the building blocks.
//!
//! This module defines all error types using `thiserror`. Variants fall into four
//! groups: argument/validation errors raised at the call boundary, provider and
//! database errors, formatting errors from the masked value types, and
//! configuration errors raised at startup or on a live options change.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },

    #[error("Validation failed: {}", .violations.join("; "))]
    Validation { violations: Vec<String> },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// Vendor error code, e.g. "ORA-06550" or "42P01"
        code: Option<String>,
    },

    #[error("Provider error executing {command}: {source}")]
    Provider {
        /// Formatted command text with parameter bindings.
        command: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Format error: {message}")]
    Format { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Column not found: {column}")]
    MissingColumn { column: String },

    #[error("Column '{column}' holds {actual}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Log queue is closed")]
    QueueClosed,

    #[error("Crypto error: {message}")]
    Crypto { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification used at service boundaries instead of exception types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Internal,
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a validation error from a list of rule violations.
    pub fn validation(violations: Vec<String>) -> Self {
        Self::Validation { violations }
    }

    /// Create a database error with an optional vendor code.
    pub fn database(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    /// Wrap an error raised while executing `command`.
    pub fn provider(command: impl Into<String>, source: Error) -> Self {
        Self::Provider {
            command: command.into(),
            source: Box::new(source),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    pub fn type_mismatch(
        column: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected,
            actual,
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Provider { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// The innermost error, looking through provider wrapping.
    pub fn root(&self) -> &Error {
        match self {
            Self::Provider { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify this error for the service boundary.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::InvalidArgument { .. } | Self::Validation { .. } | Self::Format { .. } => {
                ErrorKind::BadRequest
            }
            Self::MissingColumn { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }
}

/// Convert sqlx errors to Error.
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => Error::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                Error::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => Error::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => Error::connection(
                "Timed out acquiring a pooled connection",
                "Increase the pool size or check for leaked connections",
            ),
            sqlx::Error::PoolClosed => {
                Error::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => Error::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => Error::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => Error::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => Error::missing_column(col),
            sqlx::Error::ColumnDecode { index, source } => {
                Error::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => Error::internal(format!("Decode error: {}", source)),
            _ => Error::internal(format!("Unknown database error: {}", err)),
        }
    }
}

#[cfg(feature = "oracle")]
impl From<oracle::Error> for Error {
    fn from(err: oracle::Error) -> Self {
        let message = err.to_string();
        let code = message
            .find("ORA-")
            .map(|idx| message[idx..].chars().take(9).collect::<String>());
        Error::database(message, code)
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_provider_error_keeps_source() {
        let inner = Error::database("ORA-06550: line 1", Some("ORA-06550".to_string()));
        let err = Error::provider("PKG_CARD.GET_CARDS(p_id => 7)", inner);

        assert!(err.to_string().contains("PKG_CARD.GET_CARDS"));
        let source = std::error::Error::source(&err).expect("source is preserved");
        assert!(source.to_string().contains("ORA-06550"));
        assert!(matches!(err.root(), Error::Database { .. }));
    }

    #[test]
    fn test_suggestion_through_provider() {
        let err = Error::provider("X", Error::connection("down", "retry later"));
        assert_eq!(err.suggestion(), Some("retry later"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            Error::invalid_argument("id", "blank").kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(Error::format("mask").kind(), ErrorKind::BadRequest);
        assert_eq!(Error::missing_column("NAME").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::provider("X", Error::validation(vec!["a".into()])).kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(Error::database("boom", None).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_validation_display_joins_violations() {
        let err = Error::validation(vec!["id is required".into(), "kind is invalid".into()]);
        assert_eq!(
            err.to_string(),
            "Validation failed: id is required; kind is invalid"
        );
    }
}
