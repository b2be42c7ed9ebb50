//! SQLite type conversion utilities.
//!
//! This module handles conversion between SQLite values (from SQLx)
//! and the `Value` type used by the session layer.
//!
//! SQLite uses dynamic typing: the declared column type is only an affinity,
//! each stored value carries one of five storage classes:
//! - INTEGER: 64-bit signed integer
//! - REAL: 64-bit floating point
//! - TEXT: UTF-8 string
//! - BLOB: Binary data
//! - NULL: Null value
//!
//! Conversion therefore branches on the storage class of the value itself,
//! never on the declared type of the column.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

use crate::services::database::traits::Value;

/// Converter for SQLite values to the unified `Value` type.
pub struct SqliteValueConverter;

impl SqliteValueConverter {
    /// Convert a SQLite row to positional values.
    pub fn convert_row(sqlite_row: &SqliteRow) -> Vec<Value> {
        (0..sqlite_row.len())
            .map(|idx| Self::extract_value(sqlite_row, idx))
            .collect()
    }

    /// Extract a value from a SQLite row at the given column index.
    fn extract_value(row: &SqliteRow, index: usize) -> Value {
        let storage_class = match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(_) => return Value::Null,
        };

        Self::decode_by_storage_class(row, index, &storage_class)
    }

    /// Decode a value based on its storage class name.
    fn decode_by_storage_class(row: &SqliteRow, index: usize, storage_class: &str) -> Value {
        match storage_class {
            "INTEGER" => row
                .try_get::<i64, _>(index)
                .map(Value::Integer)
                .unwrap_or_else(|_| Self::decode_unknown(row, index)),

            "REAL" => row
                .try_get::<f64, _>(index)
                .map(Value::Real)
                .unwrap_or_else(|_| Self::decode_unknown(row, index)),

            "TEXT" => row
                .try_get::<String, _>(index)
                .map(Value::Text)
                .unwrap_or_else(|_| Self::decode_unknown(row, index)),

            "BLOB" => row
                .try_get::<Vec<u8>, _>(index)
                .map(Value::Blob)
                .unwrap_or_else(|_| Self::decode_unknown(row, index)),

            _ => Self::decode_unknown(row, index),
        }
    }

    /// Decode a value whose storage class was not recognized by trying the
    /// common paths without type checks.
    fn decode_unknown(row: &SqliteRow, index: usize) -> Value {
        if let Ok(v) = row.try_get_unchecked::<i64, _>(index) {
            return Value::Integer(v);
        }

        if let Ok(v) = row.try_get_unchecked::<f64, _>(index) {
            return Value::Real(v);
        }

        if let Ok(v) = row.try_get_unchecked::<String, _>(index) {
            return Value::Text(v);
        }

        if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(index) {
            return Value::Blob(v);
        }

        tracing::warn!(index, "Could not decode SQLite value, treating as NULL");
        Value::Null
    }
}
