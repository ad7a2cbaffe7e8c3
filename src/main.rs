//! bb-diag - diagnostics for the building blocks.

use building_blocks::config::{Command, Config, Settings, parse_param};
use building_blocks::db::{
    Connector, DataRecord, DbValue, InstrumentedExecutor, Parameter, Provider, SqlxConnector,
};
use building_blocks::logging::{self, BatchingLayer, BatchingLogger};
use building_blocks::metrics::{MetricsRegistry, MetricsSink, TracingSink};
use building_blocks::models::{BankCardNumber, format_card_number, is_card_number_valid};
use building_blocks::{Error, Result};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize tracing; returns the started file logger when one is configured.
fn init_tracing(config: &Config, settings: &Settings) -> Result<Option<BatchingLogger>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.filter_directives(&config.log_level)));

    let file_logger = match &settings.file_logger {
        Some(options) => {
            let logger = logging::file_logger(options)?;
            logger.start()?;
            Some(logger)
        }
        None => None,
    };
    let file_layer = file_logger.clone().map(BatchingLayer::new);

    let subscriber = tracing_subscriber::registry().with(filter).with(file_layer);
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
    Ok(file_logger)
}

#[cfg(feature = "oracle")]
fn oracle_connector(connection_string: &str) -> Result<Option<Arc<dyn Connector>>> {
    if !connection_string.to_ascii_lowercase().starts_with("oracle://") {
        return Ok(None);
    }
    let connector = building_blocks::db::OracleConnector::from_url(connection_string)?;
    Ok(Some(Arc::new(connector)))
}

#[cfg(not(feature = "oracle"))]
fn oracle_connector(_connection_string: &str) -> Result<Option<Arc<dyn Connector>>> {
    Ok(None)
}

async fn connector(
    connection_string: &str,
    settings: &Settings,
    name: &str,
) -> Result<Arc<dyn Connector>> {
    if let Some(connector) = oracle_connector(connection_string)? {
        return Ok(connector);
    }

    let pool = settings
        .connection_strings
        .get(name)
        .map(|setting| setting.pool.clone())
        .unwrap_or_default();
    Ok(Arc::new(SqlxConnector::connect(connection_string, &pool).await?))
}

/// Run `procedure` and print its rows; `cursor` is `None` for SQL text.
async fn call(
    config: &Config,
    settings: &Settings,
    metrics: Arc<MetricsRegistry>,
    connection: &str,
    procedure: &str,
    params: &[String],
    cursor: Option<&str>,
) -> Result<()> {
    let cipher = config.cipher()?;
    let connection_string = settings.connection_string(connection, cipher.as_ref())?;
    let connector = connector(&connection_string, settings, connection).await?;

    let parameters = params
        .iter()
        .map(|p| {
            parse_param(p).map(|(name, value)| Parameter::input(name, DbValue::parse_loose(&value)))
        })
        .collect::<Result<Vec<_>>>()?;

    let executor = InstrumentedExecutor::new(settings.instrumentation.clone(), metrics);
    let provider = Provider::new(connector, executor);
    let to_json =
        |record: &DataRecord| -> Result<JsonValue> { Ok(JsonValue::Object(record.to_json_map())) };

    let rows = match cursor {
        Some(cursor) => provider.get(procedure, parameters, cursor, to_json).await?,
        None => provider.get_text(procedure, parameters, to_json).await?,
    };

    let output = serde_json::to_string_pretty(&rows)
        .map_err(|e| Error::internal(format!("Cannot serialize rows: {}", e)))?;
    println!("{}", output);
    Ok(())
}

async fn run(config: &Config, settings: &Settings, metrics: Arc<MetricsRegistry>) -> Result<()> {
    match &config.command {
        Command::Call {
            connection,
            procedure,
            params,
            cursor,
            text,
        } => {
            let request_id = uuid::Uuid::new_v4();
            let cursor = (!*text).then_some(cursor.as_str());
            call(config, settings, metrics, connection, procedure, params, cursor)
                .instrument(info_span!("call", %request_id, %connection))
                .await
        }
        Command::Encrypt { value } => {
            let cipher = config
                .cipher()?
                .ok_or_else(|| Error::config("--pass-phrase is required to encrypt"))?;
            println!("{}", cipher.encrypt(value)?);
            Ok(())
        }
        Command::Decrypt { value } => {
            let cipher = config
                .cipher()?
                .ok_or_else(|| Error::config("--pass-phrase is required to decrypt"))?;
            println!("{}", cipher.decrypt(value)?);
            Ok(())
        }
        Command::MaskCard { mask, number } => {
            println!("{}", format_card_number(mask, number)?);
            Ok(())
        }
        Command::CheckCard { number } => {
            let valid = is_card_number_valid(number);
            match BankCardNumber::parse(number) {
                Ok(card) => println!("{} valid={}", card, valid),
                Err(e) => println!("invalid: {}", e),
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    let settings = config.load_settings()?;
    let file_logger = init_tracing(&config, &settings)?;

    info!("Starting bb-diag v{}", env!("CARGO_PKG_VERSION"));

    let metrics = Arc::new(MetricsRegistry::new(settings.metrics.category.clone()));
    let reset_task = Arc::clone(&metrics)
        .spawn_reset_task(settings.metrics.reset_interval(), Arc::new(TracingSink));

    let result = tokio::select! {
        result = run(&config, &settings, Arc::clone(&metrics)) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Err(Error::internal("interrupted"))
        }
    };

    reset_task.abort();
    TracingSink.publish(&metrics.snapshot());

    if let Err(e) = &result {
        match e.suggestion() {
            Some(suggestion) => error!(error = %e, suggestion, "Command failed"),
            None => error!(error = %e, "Command failed"),
        }
    }
    if let Some(logger) = file_logger {
        logger.stop().await;
    }
    result.map_err(Into::into)
}
