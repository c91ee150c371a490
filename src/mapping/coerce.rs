//! Value coercion into schema field types.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

use crate::schema::FieldType;

/// Leading decimal literal, the way lenient float parsers read a prefix.
static NUMERIC_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").ok()
});

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingFieldError {
    #[error("field '{field}' expects {expected} but the source value is {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: &'static str,
    },
    #[error("field '{field}' value {raw:?} is not numeric")]
    Unparsable { field: String, raw: String },
}

/// Parse the numeric prefix of `text` ("12.50" → 12.5, "7kg" → 7.0).
///
/// Returns `None` for text without a leading number and for non-finite results.
pub fn parse_float_prefix(text: &str) -> Option<f64> {
    let prefix = NUMERIC_PREFIX.as_ref()?.find(text)?;
    prefix
        .as_str()
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce an extracted value into `field_type`.
///
/// Absent, null and blank-string values yield the type's zero value without
/// error; values that cannot be represented in the target type are errors.
pub fn coerce(field: &str, field_type: FieldType, raw: Option<Value>) -> Result<Value, MappingFieldError> {
    let value = match raw {
        None | Some(Value::Null) => return Ok(field_type.zero_value()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(field_type.zero_value()),
        Some(value) => value,
    };

    let mismatch = |value: &Value| MappingFieldError::TypeMismatch {
        field: field.to_string(),
        expected: field_type,
        found: kind(value),
    };

    match field_type {
        FieldType::Number => {
            let parsed = match &value {
                Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
                Value::String(s) => parse_float_prefix(s),
                other => return Err(mismatch(other)),
            };
            parsed.map(Value::from).ok_or_else(|| MappingFieldError::Unparsable {
                field: field.to_string(),
                raw: match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            })
        }
        FieldType::String => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch(&other)),
        },
        FieldType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(mismatch(other)),
        },
        FieldType::Array => match value {
            Value::Array(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        FieldType::Object => match value {
            Value::Object(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
    }
}
