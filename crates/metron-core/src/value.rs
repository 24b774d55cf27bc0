//! ---
//! metron_section: "01-measurement-core"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Loosely typed measurement values carried by records."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A single measurement value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Free-form text such as identifiers or descriptive labels.
    Text(String),
    /// Floating point measurement.
    Number(f64),
    /// Integral measurement such as counts.
    Integer(i64),
    /// Boolean flag.
    Bool(bool),
    /// Elapsed time, exported as fractional seconds.
    Duration(Duration),
    /// Wall-clock instant, exported as RFC 3339.
    Timestamp(DateTime<Utc>),
    /// Ordered list of values.
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Integer(_) => "integer",
            Value::Bool(_) => "bool",
            Value::Duration(_) => "duration",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
        }
    }

    /// Numeric view of the value.
    ///
    /// Durations map to seconds and timestamps to unix seconds. Text and lists
    /// have no numeric view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            Value::Duration(duration) => Some(duration.as_secs_f64()),
            Value::Timestamp(ts) => Some(ts.timestamp_millis() as f64 / 1000.0),
            Value::Text(_) | Value::List(_) => None,
        }
    }

    /// Borrow the inner text, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Borrow the inner list, if this is a list value.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Text(text) => serializer.serialize_str(text),
            Value::Number(value) => serializer.serialize_f64(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Bool(flag) => serializer.serialize_bool(*flag),
            Value::Duration(duration) => serializer.serialize_f64(duration.as_secs_f64()),
            Value::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            Value::Number(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::Duration(duration) => write!(f, "{:.6}s", duration.as_secs_f64()),
            Value::Timestamp(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Value::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Duration> for Value {
    fn from(value: Duration) -> Self {
        Value::Duration(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}
