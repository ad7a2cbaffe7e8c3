//! Database-agnostic value type and row decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders extract a [`DbValue`] for the category
//!
//! Values bound as parameters and values fetched from rows share the same
//! [`DbValue`] representation.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, Type, TypeInfo};
use std::fmt;
use std::sync::Arc;

use crate::db::record::DataRecord;
use crate::error::{Error, Result};

/// A single parameter or column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    /// SQL NULL
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl DbValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Timestamp(_) => "timestamp",
            Self::Text(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Parse a loosely typed textual value, as given on a command line.
    ///
    /// `null` becomes [`DbValue::Null`], integers and floats are recognised,
    /// `true`/`false` become booleans, anything else stays text.
    pub fn parse_loose(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Self::Float(v);
        }
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Convert to a JSON value for output.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Int(v) => JsonValue::Number((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Self::Timestamp(v) => JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::Text(v) => JsonValue::String(v.clone()),
            Self::Bytes(v) => decode_binary_value(v),
        }
    }
}

/// Renders the value the way it appears in a formatted command.
impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Timestamp(v) => write!(f, "'{}'", v.format("%Y-%m-%d %H:%M:%S")),
            Self::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<NaiveDateTime> for DbValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Encode binary data as a base64 JSON string.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    Binary,
    Uuid,
    Unknown,
}

/// Backend dialect, used for type classification and statement building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    SQLite,
    Oracle,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::SQLite => write!(f, "SQLite"),
            Self::Oracle => write!(f, "Oracle"),
        }
    }
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.ends_with("[]") {
        return TypeCategory::Unknown;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if dialect == Dialect::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    let integral = lower.contains("int") && !lower.contains("interval") && !lower.contains("point");
    if integral || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower.starts_with("timestamp") || lower == "datetime" {
        return TypeCategory::Timestamp;
    }

    if lower == "date" {
        return TypeCategory::Date;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    // Everything else (varchar, text, char, json, ...) decodes as text
    TypeCategory::Unknown
}

// =============================================================================
// Row to Record Trait
// =============================================================================

/// Trait for converting backend rows into [`DataRecord`]s.
pub trait IntoDataRecord {
    /// Column names in ordinal order.
    fn column_names(&self) -> Vec<String>;
    /// Convert the row, sharing an already computed column list.
    fn into_record(self, columns: Arc<[String]>) -> Result<DataRecord>;
}

impl IntoDataRecord for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn into_record(self, columns: Arc<[String]>) -> Result<DataRecord> {
        let values = (0..self.columns().len())
            .map(|idx| postgres::decode_column(&self, idx))
            .collect::<Result<Vec<_>>>()?;
        Ok(DataRecord::new(columns, values))
    }
}

impl IntoDataRecord for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn into_record(self, columns: Arc<[String]>) -> Result<DataRecord> {
        let values = self
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), Dialect::SQLite);
                sqlite::decode_column(&self, idx, category)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DataRecord::new(columns, values))
    }
}

/// Convert a batch of rows sharing one column list.
///
/// The first column that fails to decode fails the whole batch.
pub fn rows_to_records<R: IntoDataRecord>(rows: Vec<R>) -> Result<Vec<DataRecord>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Arc<[String]> = first.column_names().into();
    rows.into_iter()
        .map(|row| row.into_record(columns.clone()))
        .collect()
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::types::{Decimal, Uuid};

    /// Decode by the column's wire type; sqlx hands back binary values, so
    /// every type needs a matching Rust decoder.
    pub fn decode_column(row: &PgRow, idx: usize) -> Result<DbValue> {
        let column = &row.columns()[idx];
        let type_info = column.type_info();
        let type_name = type_info.name();

        let value = match categorize_type(type_name, Dialect::Postgres) {
            TypeCategory::Decimal => row
                .try_get::<Option<Decimal>, _>(idx)?
                .map(|v| DbValue::Text(v.to_string())),
            TypeCategory::Uuid => row
                .try_get::<Option<Uuid>, _>(idx)?
                .map(|v| DbValue::Text(v.to_string())),
            TypeCategory::Integer => match type_name {
                "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|v| DbValue::Int(v.into())),
                "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(DbValue::from),
                _ => row.try_get::<Option<i64>, _>(idx)?.map(DbValue::Int),
            },
            TypeCategory::Float => match type_name {
                "FLOAT4" => row
                    .try_get::<Option<f32>, _>(idx)?
                    .map(|v| DbValue::Float(v.into())),
                _ => row.try_get::<Option<f64>, _>(idx)?.map(DbValue::Float),
            },
            TypeCategory::Boolean => row.try_get::<Option<bool>, _>(idx)?.map(DbValue::Bool),
            TypeCategory::Timestamp => match type_name {
                "TIMESTAMPTZ" => row
                    .try_get::<Option<DateTime<Utc>>, _>(idx)?
                    .map(|v| DbValue::Timestamp(v.naive_utc())),
                _ => row
                    .try_get::<Option<NaiveDateTime>, _>(idx)?
                    .map(DbValue::Timestamp),
            },
            TypeCategory::Date => row
                .try_get::<Option<NaiveDate>, _>(idx)?
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(DbValue::Timestamp),
            TypeCategory::Binary => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(DbValue::Bytes),
            TypeCategory::Unknown => {
                if !<String as Type<sqlx::Postgres>>::compatible(type_info) {
                    return Err(Error::unsupported(format!(
                        "Column '{}' has unsupported type {}",
                        column.name(),
                        type_name
                    )));
                }
                row.try_get::<Option<String>, _>(idx)?.map(DbValue::Text)
            }
        };
        Ok(value.unwrap_or(DbValue::Null))
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Result<DbValue> {
        let typed = match category {
            TypeCategory::Integer => row.try_get::<Option<i64>, _>(idx).map(DbValue::from),
            TypeCategory::Boolean => row.try_get::<Option<bool>, _>(idx).map(DbValue::from),
            TypeCategory::Float | TypeCategory::Decimal => {
                row.try_get::<Option<f64>, _>(idx).map(DbValue::from)
            }
            TypeCategory::Binary => row.try_get::<Option<Vec<u8>>, _>(idx).map(DbValue::from),
            TypeCategory::Timestamp | TypeCategory::Date => {
                row.try_get::<Option<NaiveDateTime>, _>(idx).map(DbValue::from)
            }
            TypeCategory::Uuid | TypeCategory::Unknown => return decode_dynamic(row, idx),
        };
        match typed {
            Ok(value) => Ok(value),
            // Declared affinity does not fix the storage class of a value.
            Err(_) => decode_dynamic(row, idx),
        }
    }

    /// Expression columns carry no declared type; fall back on the storage class.
    fn decode_dynamic(row: &SqliteRow, idx: usize) -> Result<DbValue> {
        if let Ok(text) = row.try_get_unchecked::<Option<String>, _>(idx) {
            let Some(v) = text else {
                return Ok(DbValue::Null);
            };
            let storage = row.columns()[idx].type_info().name().to_ascii_uppercase();
            return Ok(match storage.as_str() {
                "INTEGER" => v.parse().map(DbValue::Int).unwrap_or(DbValue::Text(v)),
                "REAL" => v.parse().map(DbValue::Float).unwrap_or(DbValue::Text(v)),
                _ => DbValue::Text(v),
            });
        }
        Ok(row
            .try_get_unchecked::<Option<Vec<u8>>, _>(idx)?
            .map(DbValue::Bytes)
            .unwrap_or(DbValue::Null))
    }
}
