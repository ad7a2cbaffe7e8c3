//! Configuration handling for building-blocks.
//!
//! Two layers: CLI arguments and environment variables for the diagnostic
//! binary ([`Config`]), and a JSON settings file ([`Settings`]) passed
//! explicitly to every component at startup.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::crypto::ConnectionStringCipher;
use crate::error::{Error, Result};
use crate::logging::options::FileLoggerOptions;
use crate::metrics::MeasuredOperation;

/// Slow-operation threshold applied when an operation has none configured.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 1000;

pub const DEFAULT_METRICS_CATEGORY: &str = "BuildingBlocks.Database";
pub const DEFAULT_METRICS_RESET_INTERVAL_SECS: u64 = 60;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10, or 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Per-operation slow thresholds in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationSettings {
    pub open_connection_ms: Option<u64>,
    pub execute_reader_ms: Option<u64>,
    pub execute_non_query_ms: Option<u64>,
    pub execute_scalar_ms: Option<u64>,
    pub read_ms: Option<u64>,
}

impl InstrumentationSettings {
    /// Threshold for `operation`, falling back to [`DEFAULT_SLOW_THRESHOLD_MS`].
    pub fn threshold(&self, operation: MeasuredOperation) -> Duration {
        let ms = match operation {
            MeasuredOperation::OpenConnection => self.open_connection_ms,
            MeasuredOperation::ExecuteReader => self.execute_reader_ms,
            MeasuredOperation::ExecuteNonQuery => self.execute_non_query_ms,
            MeasuredOperation::ExecuteScalar => self.execute_scalar_ms,
            MeasuredOperation::Read => self.read_ms,
        };
        Duration::from_millis(ms.unwrap_or(DEFAULT_SLOW_THRESHOLD_MS))
    }

    /// Same threshold for every operation.
    pub fn uniform(ms: u64) -> Self {
        Self {
            open_connection_ms: Some(ms),
            execute_reader_ms: Some(ms),
            execute_non_query_ms: Some(ms),
            execute_scalar_ms: Some(ms),
            read_ms: Some(ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub category: String,
    pub reset_interval_secs: u64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            category: DEFAULT_METRICS_CATEGORY.to_string(),
            reset_interval_secs: DEFAULT_METRICS_RESET_INTERVAL_SECS,
        }
    }
}

impl MetricsSettings {
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }
}

/// A named connection string, optionally stored encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStringSetting {
    pub value: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub pool: PoolOptions,
}

/// Settings file contents.
///
/// ```json
/// {
///   "instrumentation": { "execute_reader_ms": 250 },
///   "file_logger": { "directory": "logs", "batch_size": 50 },
///   "log_levels": { "default": "info", "building_blocks::db": "debug" },
///   "metrics": { "category": "Cards.Database", "reset_interval_secs": 60 },
///   "connection_strings": {
///     "cards": { "value": "postgres://app@db/cards", "encrypted": false }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub instrumentation: InstrumentationSettings,
    pub file_logger: Option<FileLoggerOptions>,
    pub log_levels: BTreeMap<String, String>,
    pub metrics: MetricsSettings,
    pub connection_strings: BTreeMap<String, ConnectionStringSetting>,
}

impl Settings {
    /// Parse settings from JSON text and validate them.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text)
            .map_err(|e| Error::config(format!("Invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and validate a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read settings file {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(file_logger) = &self.file_logger {
            file_logger.validate()?;
        }
        if self.metrics.category.trim().is_empty() {
            return Err(Error::config("metrics.category must not be blank"));
        }
        if self.metrics.reset_interval_secs == 0 {
            return Err(Error::config(
                "metrics.reset_interval_secs must be greater than 0",
            ));
        }
        for (name, setting) in &self.connection_strings {
            if setting.value.trim().is_empty() {
                return Err(Error::config(format!(
                    "connection string '{}' must not be blank",
                    name
                )));
            }
            setting
                .pool
                .validate()
                .map_err(|e| Error::config(format!("connection string '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Resolve a named connection string, decrypting it when stored encrypted.
    pub fn connection_string(
        &self,
        name: &str,
        cipher: Option<&ConnectionStringCipher>,
    ) -> Result<String> {
        let setting = self.connection_strings.get(name).ok_or_else(|| {
            Error::config(format!("No connection string named '{}'", name))
        })?;
        if !setting.encrypted {
            return Ok(setting.value.clone());
        }
        let cipher = cipher.ok_or_else(|| {
            Error::config(format!(
                "Connection string '{}' is encrypted but no pass phrase was supplied",
                name
            ))
        })?;
        cipher.decrypt(&setting.value)
    }

    /// Build `EnvFilter` directives from `log_levels`.
    ///
    /// The `default` key (or `fallback` when absent) sets the global level;
    /// every other key is a target directive.
    pub fn filter_directives(&self, fallback: &str) -> String {
        let default = self
            .log_levels
            .get("default")
            .map(String::as_str)
            .unwrap_or(fallback);
        let mut directives = vec![default.to_string()];
        directives.extend(
            self.log_levels
                .iter()
                .filter(|(target, _)| target.as_str() != "default")
                .map(|(target, level)| format!("{}={}", target, level)),
        );
        directives.join(",")
    }
}

/// Replace the password of a URL-style connection string with `***`.
pub fn redact_connection_string(connection_string: &str) -> String {
    match Url::parse(connection_string) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => connection_string.to_string(),
    }
}

/// Command line of the diagnostic binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bb-diag",
    about = "Diagnostics for building-blocks: call procedures, encrypt connection strings, check card numbers",
    version,
    author
)]
pub struct Config {
    /// Settings file (JSON)
    #[arg(short, long, value_name = "FILE", env = "BB_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "BB_JSON_LOGS")]
    pub json_logs: bool,

    /// Pass phrase for encrypted connection strings
    #[arg(long, env = "BB_PASS_PHRASE", hide_env_values = true)]
    pub pass_phrase: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Call a stored procedure (or SQL text) and print the rows as JSON
    Call {
        /// Connection string name from the settings file
        #[arg(short, long)]
        connection: String,

        /// Procedure name, or SQL text with --text
        procedure: String,

        /// Parameter as name=value; repeatable
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Output cursor parameter name
        #[arg(long, default_value = crate::db::DEFAULT_CURSOR_PARAMETER)]
        cursor: String,

        /// Treat the command as SQL text instead of a procedure name
        #[arg(long)]
        text: bool,
    },
    /// Encrypt a connection string
    Encrypt { value: String },
    /// Decrypt a connection string
    Decrypt { value: String },
    /// Render a card number through a mask
    MaskCard {
        #[arg(short, long, default_value = crate::models::card::DEFAULT_CARD_MASK)]
        mask: String,
        number: String,
    },
    /// Check a card number (format and Luhn)
    CheckCard { number: String },
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the settings file, or defaults when none is given.
    pub fn load_settings(&self) -> Result<Settings> {
        match &self.settings {
            Some(path) => Settings::load(path),
            None => Ok(Settings::default()),
        }
    }

    pub fn cipher(&self) -> Result<Option<ConnectionStringCipher>> {
        self.pass_phrase
            .as_deref()
            .map(ConnectionStringCipher::new)
            .transpose()
    }
}

/// Split a `name=value` CLI parameter.
pub fn parse_param(s: &str) -> Result<(String, String)> {
    let (name, value) = s.split_once('=').ok_or_else(|| {
        Error::invalid_argument("param", format!("'{}' is not in name=value form", s))
    })?;
    if name.trim().is_empty() {
        return Err(Error::invalid_argument("param", "parameter name must not be blank"));
    }
    Ok((name.trim().to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_options_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.max_connections_or_default(false), 10);
        assert_eq!(opts.max_connections_or_default(true), 1);
        assert_eq!(opts.min_connections_or_default(), 1);
        assert_eq!(opts.idle_timeout_or_default(), 600);
        assert_eq!(opts.acquire_timeout_or_default(), 30);
        assert!(opts.test_before_acquire_or_default());
    }

    #[test]
    fn test_pool_options_validation() {
        let zero = PoolOptions {
            max_connections: Some(0),
            ..Default::default()
        };
        assert!(zero.validate().unwrap_err().contains("max_connections"));

        let inverted = PoolOptions {
            min_connections: Some(10),
            max_connections: Some(5),
            ..Default::default()
        };
        assert!(inverted.validate().unwrap_err().contains("cannot exceed"));
    }

    #[test]
    fn test_threshold_fallback() {
        let settings = InstrumentationSettings {
            execute_reader_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(
            settings.threshold(MeasuredOperation::ExecuteReader),
            Duration::from_millis(250)
        );
        assert_eq!(
            settings.threshold(MeasuredOperation::OpenConnection),
            Duration::from_millis(DEFAULT_SLOW_THRESHOLD_MS)
        );
    }

    #[test]
    fn test_settings_from_json() {
        let settings = Settings::from_json(
            r#"{
                "instrumentation": { "read_ms": 5 },
                "file_logger": { "directory": "/tmp/logs", "batch_size": 10 },
                "log_levels": { "default": "warn", "building_blocks::db": "debug" },
                "connection_strings": {
                    "cards": { "value": "sqlite::memory:" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.instrumentation.read_ms, Some(5));
        let file_logger = settings.file_logger.as_ref().unwrap();
        assert_eq!(file_logger.batching.batch_size, Some(10));
        assert_eq!(settings.metrics.category, DEFAULT_METRICS_CATEGORY);
        assert_eq!(
            settings.filter_directives("info"),
            "warn,building_blocks::db=debug"
        );
        assert_eq!(
            settings.connection_string("cards", None).unwrap(),
            "sqlite::memory:"
        );
    }

    #[test]
    fn test_settings_reject_zero_batch_size() {
        let err = Settings::from_json(
            r#"{ "file_logger": { "directory": "/tmp/logs", "batch_size": 0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_settings_reject_zero_flush_period() {
        let err = Settings::from_json(
            r#"{ "file_logger": { "directory": "/tmp/logs", "flush_period_ms": 0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_missing_connection_string() {
        let err = Settings::default()
            .connection_string("nope", None)
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_encrypted_connection_string() {
        let cipher = ConnectionStringCipher::new("correct horse").unwrap();
        let encrypted = cipher.encrypt("postgres://app:secret@db/cards").unwrap();
        let mut settings = Settings::default();
        settings.connection_strings.insert(
            "cards".to_string(),
            ConnectionStringSetting {
                value: encrypted,
                encrypted: true,
                pool: PoolOptions::default(),
            },
        );

        assert!(settings.connection_string("cards", None).is_err());
        assert_eq!(
            settings.connection_string("cards", Some(&cipher)).unwrap(),
            "postgres://app:secret@db/cards"
        );
    }

    #[test]
    fn test_redact_connection_string() {
        assert_eq!(
            redact_connection_string("postgres://app:secret@db:5432/cards"),
            "postgres://app:***@db:5432/cards"
        );
        assert_eq!(
            redact_connection_string("sqlite::memory:"),
            "sqlite::memory:"
        );
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("p_id=42").unwrap(),
            ("p_id".to_string(), "42".to_string())
        );
        assert_eq!(
            parse_param("p_expr=a=b").unwrap(),
            ("p_expr".to_string(), "a=b".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_cli_parses_call() {
        let config = Config::try_parse_from([
            "bb-diag",
            "call",
            "-c",
            "cards",
            "pkg_card.get_cards",
            "-p",
            "p_customer_id=42",
        ])
        .unwrap();
        match config.command {
            Command::Call {
                connection,
                procedure,
                params,
                cursor,
                text,
            } => {
                assert_eq!(connection, "cards");
                assert_eq!(procedure, "pkg_card.get_cards");
                assert_eq!(params, vec!["p_customer_id=42".to_string()]);
                assert_eq!(cursor, "p_cursor");
                assert!(!text);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
