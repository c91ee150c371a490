//! Source ledger abstraction

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::entity::EntityType;
use crate::schema::Record;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Source ledger unavailable: {message}")]
    Unavailable { message: String },
    #[error("Source does not provide {entity_type} records")]
    Unsupported { entity_type: EntityType },
    #[error("Malformed source data: {message}")]
    Malformed { message: String },
}

/// Trait for reading raw records out of the source billing system
#[async_trait]
pub trait SourceLedger: Send + Sync {
    /// Fetch every record of the given entity type.
    async fn fetch(&self, entity_type: EntityType) -> Result<Vec<Record>, FetchError>;
}

/// Source backed by a JSON document already in memory.
///
/// Accepts either an object keyed by entity tag (`{"plans": [...]}`) or a
/// bare array, which is filed under `default_entity`.
#[derive(Debug, Clone, Default)]
pub struct JsonFixtureSource {
    records: HashMap<EntityType, Vec<Record>>,
}

impl JsonFixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, entity_type: EntityType, records: Vec<Record>) -> Self {
        self.records.insert(entity_type, records);
        self
    }

    pub fn from_value(document: Value, default_entity: EntityType) -> Result<Self, FetchError> {
        match document {
            Value::Array(items) => Ok(Self::new().with_records(default_entity, into_records(items)?)),
            Value::Object(sections) => {
                let mut source = Self::new();
                for (tag, section) in sections {
                    let entity_type: EntityType = tag.parse().map_err(|e| FetchError::Malformed {
                        message: format!("{e}"),
                    })?;
                    let Value::Array(items) = section else {
                        return Err(FetchError::Malformed {
                            message: format!("section '{tag}' is not an array"),
                        });
                    };
                    source = source.with_records(entity_type, into_records(items)?);
                }
                Ok(source)
            }
            other => Err(FetchError::Malformed {
                message: format!("expected an array or object, got {other}"),
            }),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>, default_entity: EntityType) -> Result<Self, FetchError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::Unavailable {
                message: format!("{}: {e}", path.display()),
            })?;
        let document: Value = serde_json::from_str(&raw).map_err(|e| FetchError::Malformed {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_value(document, default_entity)
    }
}

fn into_records(items: Vec<Value>) -> Result<Vec<Record>, FetchError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(FetchError::Malformed {
                message: format!("item {index} is not an object: {other}"),
            }),
        })
        .collect()
}

#[async_trait]
impl SourceLedger for JsonFixtureSource {
    async fn fetch(&self, entity_type: EntityType) -> Result<Vec<Record>, FetchError> {
        self.records
            .get(&entity_type)
            .cloned()
            .ok_or(FetchError::Unsupported { entity_type })
    }
}
