//! Destination ERP abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::EntityType;
use crate::schema::TransformedRecord;

/// Where and how to write transformed records.
#[derive(Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl DestinationConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    /// Endpoint for an entity type under a base URL.
    pub fn for_entity(base_url: &str, entity_type: EntityType, api_key: Option<String>) -> Self {
        Self {
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), entity_type.destination_path()),
            api_key,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl std::fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The destination's answer for a single record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub success: bool,
    pub detail: String,
}

impl WriteOutcome {
    pub fn accepted(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }

    pub fn into_result(self) -> Result<String, WriteError> {
        if self.success {
            Ok(self.detail)
        } else {
            Err(WriteError::Rejected { detail: self.detail })
        }
    }
}

/// A single record refused by the destination; recorded, never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("destination rejected record: {detail}")]
    Rejected { detail: String },
}

/// The destination itself could not be used; aborts the sweep.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteSweepError {
    #[error("Destination unreachable: {message}")]
    Unreachable { message: String },
    #[error("Destination refused credentials: {message}")]
    AuthenticationFailed { message: String },
}

/// Trait for persisting transformed records into the destination system
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    /// Write one record.
    ///
    /// Any per-record answer, including a rejection, is `Ok`. `Err` means the
    /// destination could not be reached at all.
    async fn write_one(
        &self,
        record: &TransformedRecord,
        config: &DestinationConfig,
    ) -> Result<WriteOutcome, WriteSweepError>;
}

/// Destination that only logs what it would have written.
#[derive(Debug, Clone, Default)]
pub struct DryRunDestination;

#[async_trait]
impl DestinationWriter for DryRunDestination {
    async fn write_one(
        &self,
        record: &TransformedRecord,
        config: &DestinationConfig,
    ) -> Result<WriteOutcome, WriteSweepError> {
        let payload = serde_json::to_string(&record.fields).map_err(|e| WriteSweepError::Unreachable {
            message: e.to_string(),
        })?;
        tracing::info!(
            endpoint = %config.endpoint,
            record_id = %record.id,
            payload = %payload,
            "Dry run: record not sent"
        );
        Ok(WriteOutcome::accepted(format!("dry run for {}", config.endpoint)))
    }
}
