//! Conversion of raw JSON cells into driver values.

use crate::error::Error;
use crate::typesig::Column;

/// A decoded Presto cell value.
///
/// The set is closed on purpose: complex server types (map, array, row)
/// degrade to their canonical JSON text, so downstream code only ever deals
/// with five shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

/// Decodes one cell according to the root of the column's parsed type path.
pub(crate) fn decode_value(column: &Column, raw: &serde_json::Value) -> Result<Value, Error> {
    match column.parsed_type()[0].as_str() {
        "boolean" => match raw {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(v) => Ok(Value::Bool(*v)),
            other => Err(conversion_error(other, "bool")),
        },
        "tinyint" | "smallint" | "integer" | "bigint" => match raw {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int64)
                .ok_or_else(|| conversion_error(raw, "int64")),
            other => Err(conversion_error(other, "int64")),
        },
        "real" | "double" => decode_float(raw),
        "json" | "char" | "varchar" | "varbinary" | "date" | "time" | "time with time zone"
        | "timestamp" | "timestamp with time zone" | "interval year to month"
        | "interval day to second" | "decimal" | "ipprefix" | "ipaddress" | "uuid"
        | "unknown" => match raw {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(conversion_error(other, "string")),
        },
        "map" => decode_map(raw),
        "array" | "row" => decode_slice(raw),
        _ => Ok(opaque(raw)),
    }
}

/// Floats arrive either as JSON numbers or as strings; the string form
/// carries the IEEE sentinels JSON itself cannot represent.
fn decode_float(raw: &serde_json::Value) -> Result<Value, Error> {
    match raw {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Value::Float64)
            .ok_or_else(|| conversion_error(raw, "float64")),
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Ok(Value::Float64(f64::NAN)),
            "Infinity" => Ok(Value::Float64(f64::INFINITY)),
            "-Infinity" => Ok(Value::Float64(f64::NEG_INFINITY)),
            other => other
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|_| conversion_error(raw, "float64")),
        },
        other => Err(conversion_error(other, "float64")),
    }
}

/// Trino returns maps as JSON objects; Presto returns a string containing a
/// serialized JSON object. Both decode to the same canonical JSON text.
fn decode_map(raw: &serde_json::Value) -> Result<Value, Error> {
    match raw {
        serde_json::Value::Null => Ok(Value::String(String::new())),
        serde_json::Value::Object(_) => Ok(Value::String(serde_json::to_string(raw)?)),
        serde_json::Value::String(s) => {
            if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(s).is_err() {
                return Err(conversion_error(raw, "map"));
            }
            Ok(Value::String(s.clone()))
        }
        other => Err(conversion_error(other, "map")),
    }
}

/// Same dual-dialect handling as maps, for arrays and rows.
fn decode_slice(raw: &serde_json::Value) -> Result<Value, Error> {
    match raw {
        serde_json::Value::Null => Ok(Value::String(String::new())),
        serde_json::Value::Array(_) => Ok(Value::String(serde_json::to_string(raw)?)),
        serde_json::Value::String(s) => {
            if serde_json::from_str::<Vec<serde_json::Value>>(s).is_err() {
                return Err(conversion_error(raw, "slice"));
            }
            Ok(Value::String(s.clone()))
        }
        other => Err(conversion_error(other, "slice")),
    }
}

/// Pass-through for root types without a scan rule, folded into the closed
/// value set.
fn opaque(raw: &serde_json::Value) -> Value {
    match raw {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(v) => Value::Bool(*v),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => Value::Int64(v),
            None => Value::Float64(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

fn conversion_error(raw: &serde_json::Value, target: &str) -> Error {
    Error::Decode(format!("cannot convert {} to {}", raw, target))
}
