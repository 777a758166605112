//! Result values and their JSON form
//!
//! Readers decode database cells into [`Value`] and hand back [`Rows`]. Before
//! anything leaves the pipeline every cell is converted to a JSON scalar:
//! dates and times become ISO-8601 strings, decimals become floats, bytes are
//! read as (lossy) UTF-8 text and non-finite floats become `null`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;

/// A single decoded database cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Arbitrary-precision number kept in its textual form
    Decimal(String),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Bytes(Vec<u8>),
}

impl Value {
    /// Convert to a JSON-safe scalar (string, number, boolean or null)
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(v) => JsonValue::Number((*v).into()),
            Value::UInt(v) => JsonValue::Number((*v).into()),
            Value::Float(v) => float_to_json(*v),
            Value::Decimal(s) => match s.trim().parse::<f64>() {
                Ok(v) => float_to_json(v),
                Err(_) => {
                    tracing::debug!("Keeping unparsable decimal as string: {}", s);
                    JsonValue::String(s.clone())
                }
            },
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Time(t) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
            Value::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

fn float_to_json(v: f64) -> JsonValue {
    Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            JsonValue::Null => write!(f, "NULL"),
            JsonValue::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other),
        }
    }
}

/// Tabular result of executing a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    /// Column names in result order
    pub columns: Vec<String>,
    /// Row values, each the same width as `columns`
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// A result with no columns, as returned by statements that produce no result set
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert every row into a `column -> JSON scalar` mapping.
    ///
    /// Mappings keep the column order of the result. When a result repeats a
    /// column name the last value wins.
    pub fn to_records(&self) -> Vec<Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::new();
                for (name, value) in self.columns.iter().zip(row) {
                    record.insert(name.clone(), value.to_json());
                }
                record
            })
            .collect()
    }

    /// Render as tab-separated text, header first (used for prompt samples)
    pub fn to_tsv(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(self.columns.join("\t"));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            lines.push(cells.join("\t"));
        }
        lines.join("\n")
    }
}
