//! Dynamically typed configuration values.
//!
//! Each field carries a JSON value tagged with an explicit kind. The kind is
//! established by the field's default (or first non-null set) and checked on
//! every subsequent set; integers and floats are distinct kinds.

use std::fmt::{self, Display, Formatter};

use serde_json::Value;

/// Type tag over the configuration value union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Absent/optional marker; compatible with every kind.
    Null,
    /// Boolean.
    Bool,
    /// Whole number.
    Integer,
    /// Floating point number.
    Float,
    /// Text.
    String,
    /// JSON array.
    List,
    /// Nested JSON object.
    Document,
}

impl Display for ValueKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::List => "list",
            Self::Document => "document",
        };
        formatter.write_str(label)
    }
}

/// Classify a JSON value into its configuration kind.
#[must_use]
pub fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(number) => {
            if number.is_i64() || number.is_u64() {
                ValueKind::Integer
            } else {
                ValueKind::Float
            }
        }
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::List,
        Value::Object(_) => ValueKind::Document,
    }
}

/// Whether an incoming kind conflicts with the established kind.
///
/// `Null` on either side never conflicts: a null default means the field is
/// optional, and setting null clears toward the default.
#[must_use]
pub const fn kinds_conflict(established: ValueKind, incoming: ValueKind) -> bool {
    !matches!(established, ValueKind::Null)
        && !matches!(incoming, ValueKind::Null)
        && !matches!(
            (established, incoming),
            (ValueKind::Bool, ValueKind::Bool)
                | (ValueKind::Integer, ValueKind::Integer)
                | (ValueKind::Float, ValueKind::Float)
                | (ValueKind::String, ValueKind::String)
                | (ValueKind::List, ValueKind::List)
                | (ValueKind::Document, ValueKind::Document)
        )
}

/// Parse a raw command-line argument into a configuration value.
///
/// The argument is decoded as JSON; when that fails, the raw string is
/// re-encoded as a JSON string and used literally. Strings that happen to be
/// valid JSON (`"true"`, `"42"`) therefore decode as their JSON type, not as
/// text; this double-decode fallback is intentional, long-standing behavior.
#[must_use]
pub fn parse_cli_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Render a value as compact JSON for display.
#[must_use]
pub fn render(value: &Value) -> String {
    value.to_string()
}
