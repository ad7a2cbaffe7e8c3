//! Fetched row with null-aware typed accessors.
//!
//! Column lookup is case-insensitive because stored procedures return
//! upper-case column names on some backends and lower-case on others.
//! The `get_*` accessors return `Ok(None)` for SQL NULL; the `require_*`
//! variants treat NULL as an error.

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::db::types::DbValue;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    columns: Arc<[String]>,
    values: Vec<DbValue>,
}

impl DataRecord {
    /// Create a record. `values` must be in the same order as `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<DbValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a record from name/value pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, DbValue)>,
        K: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<DbValue>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self::new(columns.into(), values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[DbValue] {
        &self.values
    }

    /// Position of a column, ignoring case.
    pub fn ordinal(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.ordinal(column).is_some()
    }

    /// Raw value of a column.
    pub fn get(&self, column: &str) -> Result<&DbValue> {
        self.ordinal(column)
            .map(|idx| &self.values[idx])
            .ok_or_else(|| Error::missing_column(column))
    }

    /// Raw value by position.
    pub fn get_at(&self, idx: usize) -> Option<&DbValue> {
        self.values.get(idx)
    }

    pub fn is_null(&self, column: &str) -> Result<bool> {
        Ok(self.get(column)?.is_null())
    }

    /// Read a column as text. Numbers, booleans and timestamps are rendered.
    pub fn get_string(&self, column: &str) -> Result<Option<String>> {
        match self.get(column)? {
            DbValue::Null => Ok(None),
            DbValue::Text(v) => Ok(Some(v.clone())),
            DbValue::Int(v) => Ok(Some(v.to_string())),
            DbValue::Float(v) => Ok(Some(v.to_string())),
            DbValue::Bool(v) => Ok(Some(v.to_string())),
            DbValue::Timestamp(v) => Ok(Some(v.format("%Y-%m-%d %H:%M:%S").to_string())),
            other => Err(Error::type_mismatch(column, "string", other.type_name())),
        }
    }

    /// Read a column as a 64-bit integer.
    ///
    /// Integral floats and numeric text (NUMBER columns often arrive as text)
    /// are accepted.
    pub fn get_i64(&self, column: &str) -> Result<Option<i64>> {
        match self.get(column)? {
            DbValue::Null => Ok(None),
            DbValue::Int(v) => Ok(Some(*v)),
            DbValue::Float(v) if v.fract() == 0.0 => Ok(Some(*v as i64)),
            DbValue::Text(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::type_mismatch(column, "int", "string")),
            other => Err(Error::type_mismatch(column, "int", other.type_name())),
        }
    }

    pub fn get_i32(&self, column: &str) -> Result<Option<i32>> {
        match self.get_i64(column)? {
            None => Ok(None),
            Some(v) => i32::try_from(v)
                .map(Some)
                .map_err(|_| Error::type_mismatch(column, "int32", "int")),
        }
    }

    /// Read a column as a float. Integers and numeric text are accepted.
    pub fn get_f64(&self, column: &str) -> Result<Option<f64>> {
        match self.get(column)? {
            DbValue::Null => Ok(None),
            DbValue::Float(v) => Ok(Some(*v)),
            DbValue::Int(v) => Ok(Some(*v as f64)),
            DbValue::Text(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::type_mismatch(column, "float", "string")),
            other => Err(Error::type_mismatch(column, "float", other.type_name())),
        }
    }

    /// Read a column as a flag. Accepts booleans, `0`/`1`, and `Y`/`N` text.
    pub fn get_bool(&self, column: &str) -> Result<Option<bool>> {
        match self.get(column)? {
            DbValue::Null => Ok(None),
            DbValue::Bool(v) => Ok(Some(*v)),
            DbValue::Int(0) => Ok(Some(false)),
            DbValue::Int(1) => Ok(Some(true)),
            DbValue::Text(v) => match v.trim().to_ascii_uppercase().as_str() {
                "Y" | "YES" | "TRUE" | "1" => Ok(Some(true)),
                "N" | "NO" | "FALSE" | "0" => Ok(Some(false)),
                _ => Err(Error::type_mismatch(column, "bool", "string")),
            },
            other => Err(Error::type_mismatch(column, "bool", other.type_name())),
        }
    }

    pub fn get_datetime(&self, column: &str) -> Result<Option<NaiveDateTime>> {
        match self.get(column)? {
            DbValue::Null => Ok(None),
            DbValue::Timestamp(v) => Ok(Some(*v)),
            DbValue::Text(v) => parse_datetime(v)
                .map(Some)
                .ok_or_else(|| Error::type_mismatch(column, "timestamp", "string")),
            other => Err(Error::type_mismatch(column, "timestamp", other.type_name())),
        }
    }

    pub fn get_bytes(&self, column: &str) -> Result<Option<Vec<u8>>> {
        match self.get(column)? {
            DbValue::Null => Ok(None),
            DbValue::Bytes(v) => Ok(Some(v.clone())),
            other => Err(Error::type_mismatch(column, "bytes", other.type_name())),
        }
    }

    pub fn require_string(&self, column: &str) -> Result<String> {
        self.get_string(column)?
            .ok_or_else(|| Error::type_mismatch(column, "string", "null"))
    }

    pub fn require_i64(&self, column: &str) -> Result<i64> {
        self.get_i64(column)?
            .ok_or_else(|| Error::type_mismatch(column, "int", "null"))
    }

    /// Convert the record into a JSON object keyed by column name.
    pub fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect()
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
