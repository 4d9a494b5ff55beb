//! Cell values and the type-directed codec.
//!
//! A [`Value`] carries no type of its own; it is interpreted through the
//! [`ColumnType`] of the column that owns it. Coercion is total: [`decode`]
//! never fails, it falls back to the column type's policy instead (numbers
//! become `0`, booleans become `false`, everything else passes through).

use std::{cmp::Ordering, fmt};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::schema::{Column, ColumnType};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const TRUTHY_TOKENS: &[&str] = &["true", "t", "yes", "y", "1"];

/// Metadata for an attached file. The content itself lives elsewhere and is
/// referenced through `content_ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileRef {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, alias = "type")]
    pub mime_type: String,
    #[serde(default, alias = "url")]
    pub content_ref: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_modified: i64,
}

impl FileRef {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            content_ref: String::new(),
            last_modified: 0,
        }
    }

    pub fn with_content_ref(mut self, content_ref: impl Into<String>) -> Self {
        self.content_ref = content_ref.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
    File(FileRef),
    /// Anything the codec has no shape for (arrays, foreign objects). Kept so
    /// orphaned data survives a load/save cycle.
    Raw(serde_json::Value),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// Lifts an arbitrary JSON value without consulting any column type.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) if f.is_finite() => Value::Number(f),
                _ => Value::Raw(serde_json::Value::Number(n)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Object(map) => {
                let object = serde_json::Value::Object(map);
                match serde_json::from_value::<FileRef>(object.clone()) {
                    Ok(file) => Value::File(file),
                    Err(_) => Value::Raw(object),
                }
            }
            other @ serde_json::Value::Array(_) => Value::Raw(other),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(f) => format_number(*f),
            Value::Text(s) => s.clone(),
            Value::File(file) => file.name.clone(),
            Value::Raw(json) => json.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Value::Number(value)
        } else {
            Value::Number(0.0)
        }
    }
}

impl From<FileRef> for Value {
    fn from(value: FileRef) -> Self {
        Value::File(value)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses an ISO calendar date. A trailing time component (`2024-05-06T10:00`)
/// is tolerated and ignored.
pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

pub fn default_value(column_type: ColumnType) -> Value {
    default_value_on(column_type, today())
}

/// Same as [`default_value`] with an explicit "today" for date columns.
pub fn default_value_on(column_type: ColumnType, today: NaiveDate) -> Value {
    match column_type {
        ColumnType::Boolean => Value::Boolean(false),
        ColumnType::Date => Value::Text(format_date(today)),
        ColumnType::Number => Value::Number(0.0),
        ColumnType::File => Value::Null,
        ColumnType::Text
        | ColumnType::Select
        | ColumnType::Email
        | ColumnType::Phone
        | ColumnType::Url => Value::Text(String::new()),
    }
}

pub fn decode(column: &Column, raw: &Value) -> Value {
    decode_as(column.column_type, raw)
}

pub fn decode_as(column_type: ColumnType, raw: &Value) -> Value {
    match column_type {
        ColumnType::Number => Value::Number(coerce_number(raw)),
        ColumnType::Boolean => Value::Boolean(coerce_boolean(raw)),
        _ => raw.clone(),
    }
}

/// Parse-or-zero. Booleans, files and blobs are non-numeric.
pub fn coerce_number(raw: &Value) -> f64 {
    let parsed = match raw {
        Value::Number(n) => Some(*n),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

pub fn coerce_boolean(raw: &Value) -> bool {
    match raw {
        Value::Boolean(b) => *b,
        Value::Number(n) => *n != 0.0,
        Value::Text(s) => {
            let lowered = s.trim().to_ascii_lowercase();
            TRUTHY_TOKENS.contains(&lowered.as_str())
        }
        _ => false,
    }
}

/// Orders two cell values as seen through `column_type`. Equal values yield
/// `Ordering::Equal`; keeping equal rows in place is the caller's job.
pub fn compare(a: &Value, b: &Value, column_type: ColumnType) -> Ordering {
    match column_type {
        // Coerced numbers are finite, so only -0/0 could tell the two apart.
        ColumnType::Number => coerce_number(a)
            .partial_cmp(&coerce_number(b))
            .unwrap_or(Ordering::Equal),
        ColumnType::Boolean => coerce_boolean(a).cmp(&coerce_boolean(b)),
        _ => a.as_display().cmp(&b.as_display()),
    }
}
