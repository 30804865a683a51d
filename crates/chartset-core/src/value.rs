//! Scalar values, column types, and SQL bind/decode conversions
//!
//! Datetimes are stored as fixed-width `%Y-%m-%d %H:%M:%S%.3f` TEXT so that
//! lexicographic comparison in SQL matches chronological order.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Storage format for datetime values; fixed width keeps TEXT ordering chronological
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Declared type of a result column, used to decode raw rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Real,
    Text,
    Bool,
    DateTime,
    /// No declared type; values keep their storage representation
    #[default]
    Any,
}

/// A single scalar value bound into or read out of a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Whether this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Human-readable type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Decode a raw SQL value according to the declared column type
    pub fn decode(raw: ValueRef<'_>, datatype: ColumnType) -> QueryResult<Value> {
        match raw {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => match datatype {
                ColumnType::Bool => Ok(Value::Bool(i != 0)),
                ColumnType::Real => Ok(Value::Real(i as f64)),
                _ => Ok(Value::Int(i)),
            },
            ValueRef::Real(f) => Ok(Value::Real(f)),
            ValueRef::Text(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|_| {
                    QueryError::data_access("non-UTF8 text value in result row")
                })?;
                match datatype {
                    ColumnType::DateTime => Ok(Value::DateTime(parse_datetime(text)?)),
                    _ => Ok(Value::Text(text.to_string())),
                }
            }
            ValueRef::Blob(_) => Err(QueryError::invalid_argument(
                "BLOB columns are not supported in query results",
            )),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as SqlValue;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::DateTime(dt) => ToSqlOutput::Owned(SqlValue::Text(format_datetime(*dt))),
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::DateTime(v.and_time(NaiveTime::MIN))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Decode a typed value out of a result column
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> QueryResult<Self>;
}

fn type_error(expected: &str, found: &Value) -> QueryError {
    QueryError::invalid_argument(format!(
        "expected a {expected} value, found {}",
        found.type_name()
    ))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> QueryResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(type_error("int", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Int(i) => i32::try_from(*i)
                .map_err(|_| QueryError::invalid_argument(format!("{i} is out of range for i32"))),
            other => Err(type_error("int", other)),
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Int(i) => u32::try_from(*i)
                .map_err(|_| QueryError::invalid_argument(format!("{i} is out of range for u32"))),
            other => Err(type_error("int", other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Real(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(type_error("real", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            other => Err(type_error("bool", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(type_error("text", other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::Text(s) => parse_datetime(s),
            other => Err(type_error("datetime", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => Ok(Some(T::from_value(other)?)),
        }
    }
}

/// Render a datetime in the fixed-width storage format
pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a datetime from the storage format, tolerating missing fractional seconds
pub fn parse_datetime(text: &str) -> QueryResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| QueryError::invalid_argument(format!("cannot parse datetime '{text}': {e}")))
}

/// Midnight at the start of the given instant's day
pub fn start_of_day(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_time(NaiveTime::MIN)
}

/// The last stored millisecond of the given instant's day
pub fn end_of_day(dt: NaiveDateTime) -> NaiveDateTime {
    start_of_day(dt) + Duration::days(1) - Duration::milliseconds(1)
}

/// Whether the instant falls exactly on a day boundary (no time component)
pub fn is_whole_day(dt: NaiveDateTime) -> bool {
    dt.time() == NaiveTime::MIN
}
