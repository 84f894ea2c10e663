//! Detail-level shaping of successful results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Longest string kept intact at [`DetailLevel::Standard`].
pub const STANDARD_MAX_STRING_CHARS: usize = 1000;
/// Most array items kept at [`DetailLevel::Standard`].
pub const STANDARD_MAX_ARRAY_ITEMS: usize = 50;
/// Longest string kept intact at [`DetailLevel::Minimal`].
pub const MINIMAL_MAX_STRING_CHARS: usize = 120;

/// Errors produced while parsing output settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutputError {
    /// The tag is not `minimal`, `standard` or `verbose`.
    #[error("unknown detail level `{0}`")]
    UnknownDetailLevel(String),
}

/// How much of a result the caller wants back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Top-level scalars only; nested values are summarized.
    Minimal,
    /// Long strings and arrays are truncated.
    #[default]
    Standard,
    /// The result exactly as the backend returned it.
    Verbose,
}

impl DetailLevel {
    /// Returns the lower-case tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Verbose => "verbose",
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailLevel {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "standard" => Ok(Self::Standard),
            "verbose" => Ok(Self::Verbose),
            other => Err(OutputError::UnknownDetailLevel(other.to_owned())),
        }
    }
}

/// Returns a view of `result` at the requested level. The input is never
/// modified.
#[must_use]
pub fn shape(result: &Value, level: DetailLevel) -> Value {
    match level {
        DetailLevel::Verbose => result.clone(),
        DetailLevel::Standard => standard(result),
        DetailLevel::Minimal => minimal(result),
    }
}

fn standard(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(truncate(text, STANDARD_MAX_STRING_CHARS)),
        Value::Array(items) => {
            let mut shaped: Vec<Value> = items
                .iter()
                .take(STANDARD_MAX_ARRAY_ITEMS)
                .map(standard)
                .collect();
            if items.len() > STANDARD_MAX_ARRAY_ITEMS {
                let omitted = items.len() - STANDARD_MAX_ARRAY_ITEMS;
                shaped.push(Value::String(format!("[{omitted} more items omitted]")));
            }
            Value::Array(shaped)
        }
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), standard(value)))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

fn minimal(value: &Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), summarize(value)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(summarize).collect()),
        scalar => summarize(scalar),
    }
}

fn summarize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::String(format!("[{} items]", items.len())),
        Value::Object(fields) => Value::String(format!("{{{} fields}}", fields.len())),
        Value::String(text) => Value::String(truncate(text, MINIMAL_MAX_STRING_CHARS)),
        scalar => scalar.clone(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_owned();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}... [truncated {} chars]", total - max_chars)
}
