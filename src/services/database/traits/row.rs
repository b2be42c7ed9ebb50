//! Engine value and result-set types.
//!
//! This module contains:
//! - `Value` - The five SQLite storage classes as one sum type
//! - `ResultSet` - Column names plus positional rows, as returned by the engine

use serde::{Deserialize, Serialize};

/// A single value read from or bound to the engine.
///
/// SQLite is dynamically typed, so every cell is one of five storage classes.
/// The wire form is untagged: `null`, a number, a string, or a byte array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    #[default]
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Real(f64),
    /// UTF-8 text
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is the empty string.
    ///
    /// Edit forms send `""` for fields the user left untouched, so the
    /// mutation layer treats it as "not provided".
    pub fn is_empty_text(&self) -> bool {
        matches!(self, Value::Text(s) if s.is_empty())
    }

    /// Get the storage class name for display purposes
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    /// Convert this value to a display string
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(s) => s.clone(),
            Value::Blob(b) => format!("\\x{}", hex::encode(b)),
        }
    }

    /// Try to extract as an i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to extract as an f64 (integers widen)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to extract as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to extract as bytes reference
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Rows produced by one statement.
///
/// Rows are positional: `rows[r][c]` belongs to `columns[c]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names, in projection order
    pub columns: Vec<String>,
    /// Row values
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Create a new result set
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Create a result set with columns but no rows
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Get a value by row and column index
    pub fn get(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display_string() {
        assert_eq!(Value::Null.to_display_string(), "NULL");
        assert_eq!(Value::Integer(-123).to_display_string(), "-123");
        assert_eq!(Value::Real(129.99).to_display_string(), "129.99");
        assert_eq!(Value::Real(5.0).to_display_string(), "5");
        assert_eq!(Value::Text("hello".to_string()).to_display_string(), "hello");
    }

    #[test]
    fn test_value_blob_display() {
        let bytes = Value::Blob(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(bytes.to_display_string(), "\\xdeadbeef");
    }

    #[test]
    fn test_value_from_option() {
        let some_val: Value = Some(42i64).into();
        assert_eq!(some_val, Value::Integer(42));

        let none_val: Value = Option::<i64>::None.into();
        assert_eq!(none_val, Value::Null);
    }

    #[test]
    fn test_empty_text_detection() {
        assert!(Value::from("").is_empty_text());
        assert!(!Value::from(" ").is_empty_text());
        assert!(!Value::Null.is_empty_text());
    }

    #[test]
    fn test_untagged_wire_form() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, 5, 1.5, "x", [1, 2]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Integer(5),
                Value::Real(1.5),
                Value::Text("x".to_string()),
                Value::Blob(vec![1, 2]),
            ]
        );
        assert_eq!(serde_json::to_string(&Value::Integer(7)).unwrap(), "7");
    }

    #[test]
    fn test_result_set_lookup() {
        let set = ResultSet::new(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![Value::Integer(1), Value::from("a")]],
        );
        assert_eq!(set.column_index("name"), Some(1));
        assert_eq!(set.get(0, 1), Some(&Value::from("a")));
        assert_eq!(set.get(1, 0), None);
        assert_eq!(set.len(), 1);
    }
}
