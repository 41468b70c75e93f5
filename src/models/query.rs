//! Query-related data models.
//!
//! This module defines statement parameters and the bounded result set
//! returned for row-producing statements.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Maximum rows kept from one result unless configured otherwise.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// Marker used for SQL NULL in text output.
pub const NULL_MARKER: &str = "NULL";

/// A parameter value bound to a named placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects, bound as JSON
    Json(JsonValue),
}

impl QueryParam {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

impl From<JsonValue> for QueryParam {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

/// Rows returned by a statement, capped at a maximum.
///
/// `rows.len() == returned_row_count` always holds. When the database
/// produced more than the cap, `truncated` is set and only the first rows
/// are kept while `database_row_count` still reports the true total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub database_row_count: usize,
    pub truncated: bool,
    pub returned_row_count: usize,
}

impl QueryResult {
    /// Bound an already materialized row set.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<JsonValue>>, max_rows: usize) -> Self {
        let mut collector = RowCollector::new(columns, max_rows);
        for row in rows {
            collector.push(row);
        }
        collector.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as column-name keyed objects.
    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Incrementally builds a [`QueryResult`] from a row stream.
///
/// Rows past the cap are counted and dropped, so memory stays bounded even
/// when the whole result has to be drained to learn its size.
#[derive(Debug)]
pub struct RowCollector {
    columns: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
    max_rows: usize,
    seen: usize,
}

impl RowCollector {
    pub fn new(columns: Vec<String>, max_rows: usize) -> Self {
        Self {
            columns,
            rows: Vec::with_capacity(max_rows.min(1024)),
            max_rows,
            seen: 0,
        }
    }

    /// Column names are only known once the first row arrives.
    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn push(&mut self, row: Vec<JsonValue>) {
        self.push_with(|| row);
    }

    /// Like [`push`](Self::push), but only builds the row when it will be kept.
    pub fn push_with(&mut self, row: impl FnOnce() -> Vec<JsonValue>) {
        self.seen += 1;
        if self.rows.len() < self.max_rows {
            self.rows.push(row());
        }
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn finish(self) -> QueryResult {
        let returned_row_count = self.rows.len();
        QueryResult {
            columns: self.columns,
            rows: self.rows,
            database_row_count: self.seen,
            truncated: self.seen > self.max_rows,
            returned_row_count,
        }
    }
}

/// What a single statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Rows(QueryResult),
    Affected { rows_affected: u64 },
}

/// Render one cell for text output. NULL gets an explicit marker so it can
/// be told apart from an empty string.
pub fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => NULL_MARKER.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
