//! Record and target-schema types shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Opaque source record: field name to JSON value, in source order.
pub type Record = Map<String, Value>;

/// Primitive type tags a destination schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    /// Value substituted when extraction yields nothing usable.
    pub fn zero_value(self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Number => Value::from(0.0_f64),
            FieldType::Boolean => Value::Bool(false),
            FieldType::Array => Value::Array(Vec::new()),
            FieldType::Object => Value::Object(Map::new()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("field '{field}' declares unsupported type tag {tag}")]
    UnsupportedType { field: String, tag: Value },
}

/// Ordered field declarations required by the destination system.
///
/// Serialized as a JSON object (`{"id": "string", "price": "number"}`);
/// declaration order is preserved in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Record", into = "Record")]
pub struct TargetSchema {
    fields: Vec<(String, FieldType)>,
}

impl TargetSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, FieldType)]) -> Self {
        pairs
            .iter()
            .fold(Self::new(), |schema, (name, ty)| schema.with_field(*name, *ty))
    }

    /// Declare a field. Redeclaring a name replaces its type in place.
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = field_type,
            None => self.fields.push((name, field_type)),
        }
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, ty)| *ty)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<Record> for TargetSchema {
    type Error = SchemaError;

    fn try_from(map: Record) -> Result<Self, Self::Error> {
        let mut schema = TargetSchema::new();
        for (field, tag) in map {
            let field_type: FieldType = serde_json::from_value(tag.clone())
                .map_err(|_| SchemaError::UnsupportedType {
                    field: field.clone(),
                    tag,
                })?;
            schema = schema.with_field(field, field_type);
        }
        Ok(schema)
    }
}

impl From<TargetSchema> for Record {
    fn from(schema: TargetSchema) -> Self {
        schema
            .fields
            .into_iter()
            .map(|(name, ty)| (name, Value::String(ty.as_str().to_string())))
            .collect()
    }
}

/// A record shaped to a [`TargetSchema`]: every declared field present and typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    /// Approval key for this record.
    pub id: String,
    pub fields: Record,
}

impl TransformedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Render an identifier-like value as a string key.
pub fn identifier_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The record's `id` field, if it has a usable one.
pub fn record_identifier(record: &Record) -> Option<String> {
    record.get("id").and_then(identifier_from_value)
}

/// Identifier for log lines; never empty.
pub fn display_identifier(record: &Record) -> String {
    record_identifier(record).unwrap_or_else(|| "<no id>".to_string())
}
