//! Column type signatures.
//!
//! The coordinator describes each column with a recursive type signature.
//! Presto and Trino tag the signature arguments differently
//! (`TYPE_SIGNATURE` vs `TYPE`, and so on), so the raw argument payload is
//! kept as JSON and decoded lazily once the tag is known.

use serde::Deserialize;

use crate::error::Error;

/// Raw type signature as sent by the server, before argument decoding.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct TypeSignature {
    pub raw_type: String,
    pub arguments: Vec<TypeArgument>,
}

/// One argument of a type signature. `kind` determines the shape of `value`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TypeArgument {
    pub kind: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NamedTypeSignature {
    field_name: RowFieldName,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RowFieldName {
    name: String,
}

/// A fully decoded type signature tree.
#[derive(Debug, Clone)]
pub(crate) struct DecodedSignature {
    pub raw_type: String,
    pub arguments: Vec<DecodedArgument>,
}

#[derive(Debug, Clone)]
pub(crate) enum DecodedArgument {
    Type(DecodedSignature),
    NamedType(String),
    Long(i64),
}

pub(crate) fn decode_signature(signature: &TypeSignature) -> Result<DecodedSignature, Error> {
    let mut arguments = Vec::with_capacity(signature.arguments.len());
    for argument in &signature.arguments {
        arguments.push(decode_argument(argument)?);
    }
    Ok(DecodedSignature {
        raw_type: signature.raw_type.clone(),
        arguments,
    })
}

fn decode_argument(argument: &TypeArgument) -> Result<DecodedArgument, Error> {
    match argument.kind.as_str() {
        // Trino uses the short tags, Presto the long ones.
        "TYPE" | "TYPE_SIGNATURE" => {
            let inner: TypeSignature = serde_json::from_value(argument.value.clone())?;
            Ok(DecodedArgument::Type(decode_signature(&inner)?))
        }
        "NAMED_TYPE" | "NAMED_TYPE_SIGNATURE" => {
            let named: NamedTypeSignature = serde_json::from_value(argument.value.clone())?;
            Ok(DecodedArgument::NamedType(named.field_name.name))
        }
        "LONG" | "LONG_LITERAL" => {
            let long: i64 = serde_json::from_value(argument.value.clone())?;
            Ok(DecodedArgument::Long(long))
        }
        other => Err(Error::Decode(format!("unknown type argument kind: {}", other))),
    }
}

/// Driver-side scan category for a column, derived from the root of its
/// parsed type path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    NullBool,
    NullInt32,
    NullInt64,
    NullFloat64,
    NullString,
    Opaque,
}

/// Metadata for a single result column.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    type_name: String,
    parsed_type: Vec<String>,
    scan_type: ScanType,
    size: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
}

impl Column {
    pub(crate) fn new(name: &str, type_name: &str, signature: &TypeSignature) -> Result<Self, Error> {
        let decoded = decode_signature(signature)?;
        let parsed_type = nested_types(&decoded);
        let scan_type = scan_type_for(&parsed_type[0]);

        let mut size = None;
        let mut precision = None;
        let mut scale = None;
        match decoded.raw_type.as_str() {
            "char" | "varchar" => {
                size = long_argument(&decoded, 0);
            }
            "decimal" => {
                precision = long_argument(&decoded, 0);
                scale = long_argument(&decoded, 1);
            }
            "time" | "time with time zone" | "timestamp" | "timestamp with time zone" => {
                precision = long_argument(&decoded, 0);
            }
            _ => {}
        }

        Ok(Column {
            name: name.to_string(),
            type_name: type_name.to_string(),
            parsed_type,
            scan_type,
            size,
            precision,
            scale,
        })
    }

    /// The column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type string exactly as the server printed it, e.g. `varchar(10)`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The parsed type path obtained by descending single-argument
    /// signatures, e.g. `[array, varchar]` for `array(varchar)`.
    pub fn parsed_type(&self) -> &[String] {
        &self.parsed_type
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    /// The database type name, upper-cased. Containers report the full
    /// printed type so the element types are not lost.
    pub fn database_type_name(&self) -> String {
        let name = match self.parsed_type[0].as_str() {
            "map" | "array" | "row" => self.type_name.as_str(),
            root => root,
        };
        name.to_uppercase()
    }

    /// Declared length for `char`/`varchar` columns.
    pub fn length(&self) -> Option<i64> {
        self.size
    }

    /// Declared precision and scale for `decimal` columns, and the temporal
    /// precision for time/timestamp columns (scale 0).
    pub fn precision_scale(&self) -> Option<(i64, i64)> {
        self.precision.map(|p| (p, self.scale.unwrap_or(0)))
    }
}

/// Walks the signature appending each raw type name, descending only while
/// the node has exactly one argument and that argument is itself a type.
fn nested_types(signature: &DecodedSignature) -> Vec<String> {
    let mut types = vec![signature.raw_type.clone()];
    let mut current = signature;
    while current.arguments.len() == 1 {
        match &current.arguments[0] {
            DecodedArgument::Type(inner) => {
                types.push(inner.raw_type.clone());
                current = inner;
            }
            _ => break,
        }
    }
    types
}

fn long_argument(signature: &DecodedSignature, index: usize) -> Option<i64> {
    match signature.arguments.get(index) {
        Some(DecodedArgument::Long(value)) => Some(*value),
        _ => None,
    }
}

fn scan_type_for(root: &str) -> ScanType {
    match root {
        "boolean" => ScanType::NullBool,
        "tinyint" | "smallint" | "integer" => ScanType::NullInt32,
        "bigint" => ScanType::NullInt64,
        "real" | "double" => ScanType::NullFloat64,
        "json" | "char" | "varchar" | "varbinary" | "date" | "time" | "time with time zone"
        | "timestamp" | "timestamp with time zone" | "interval year to month"
        | "interval day to second" | "decimal" | "ipprefix" | "ipaddress" | "uuid" | "unknown"
        | "map" | "array" | "row" => ScanType::NullString,
        _ => ScanType::Opaque,
    }
}
