//! Cohort (classification) service abstraction

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;
use serde::Serialize;
use thiserror::Error;

use crate::entity::EntityType;

/// One classification call: everything the service needs to label a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortRequest {
    pub record_id: String,
    pub entity_type: EntityType,
    pub system_prompt: String,
    pub prompt: String,
    /// Upper bound on the response length, in tokens.
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassificationError {
    #[error("Classification timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Malformed classification response: {message}")]
    MalformedResponse { message: String },
    #[error("Classification quota exceeded")]
    QuotaExceeded,
    #[error("Network error: {message}")]
    Network { message: String },
    #[error("Classification service returned an empty label")]
    EmptyResponse,
}

/// Trait for the external labelling service
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CohortService: Send + Sync {
    /// Return a cohort label for the request's record.
    async fn classify_one(&self, request: &CohortRequest) -> Result<String, ClassificationError>;
}

/// Service that answers every request with the same label.
#[derive(Debug, Clone)]
pub struct FixedCohortService {
    label: String,
}

impl FixedCohortService {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[async_trait]
impl CohortService for FixedCohortService {
    async fn classify_one(&self, request: &CohortRequest) -> Result<String, ClassificationError> {
        tracing::debug!(record_id = %request.record_id, label = %self.label, "Assigning fixed cohort");
        Ok(self.label.clone())
    }
}
