//! In-memory representation of a query response
//!
//! A [`QueryResult`] holds named tables; each [`Table`] has typed columns and
//! rows of loosely-typed [`Cell`]s. Everything is read-only once decoded.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Column type tag the store uses for timestamps
const DATETIME_TYPE: &str = "datetime";

/// A single loosely-typed cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    /// Exact JSON number as received (no float rounding of 64-bit longs)
    Number(serde_json::Number),
    Boolean(bool),
    Null,
    Timestamp(DateTime<Utc>),
    /// Value with no scalar form (arrays, objects), kept as compact JSON text
    Opaque(String),
}

impl Cell {
    /// Decode a wire value, using the column's declared type as a hint
    pub fn from_json(value: Value, column_type: &str) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) if column_type.eq_ignore_ascii_case(DATETIME_TYPE) => {
                match DateTime::parse_from_rfc3339(&s) {
                    Ok(ts) => Self::Timestamp(ts.with_timezone(&Utc)),
                    Err(_) => Self::Text(s),
                }
            }
            Value::String(s) => Self::Text(s),
            other => Self::Opaque(other.to_string()),
        }
    }

    /// Text form of the cell, if it has one
    ///
    /// Only string cells are text. Opaque arrays and objects, numbers,
    /// booleans, timestamps and nulls are not, whatever their printed form.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Null => "null",
            Self::Timestamp(_) => "timestamp",
            Self::Opaque(_) => "opaque",
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Opaque(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Null => f.write_str("<null>"),
            Self::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
        }
    }
}

/// Snapshot form: timestamps as RFC 3339 strings, opaque values as their JSON text
impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) | Self::Opaque(s) => serializer.serialize_str(s),
            Self::Number(n) => n.serialize(serializer),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Null => serializer.serialize_unit(),
            Self::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
        }
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Column name and declared type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// Row cells in column order; length is expected, not guaranteed, to match the columns
pub type Row = Vec<Cell>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    /// Position of the first column with this name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

/// Full response of one query; zero tables is a valid, empty result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub tables: Vec<Table>,
}

impl QueryResult {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

/// Closed time interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Interval `[end - window, end]`
    pub fn ending_at(end: DateTime<Utc>, window: Duration) -> Self {
        Self {
            start: end - window,
            end,
        }
    }

    /// ISO 8601 `start/end` form accepted by the query service
    pub fn to_iso8601(&self) -> String {
        format!(
            "{}/{}",
            self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// One query to issue: text plus time window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    query: String,
    interval: TimeInterval,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, interval: TimeInterval) -> Self {
        Self {
            query: query.into(),
            interval,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn interval(&self) -> TimeInterval {
        self.interval
    }
}
