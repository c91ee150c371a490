//! Cohort Classifier
//!
//! Labels each record through the external [`CohortService`], one call per
//! record. Calls may run concurrently (bounded by a semaphore and an optional
//! rate limit) but results always come back in input order. A failed call
//! labels its record [`UNCLASSIFIED`] and the batch carries on.

pub mod prompts;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::entity::EntityType;
use crate::external::{ClassificationError, CohortRequest, CohortService};
use crate::isolate::{isolate, FailureScope, IsolatedFailure};
use crate::observability::migration_metrics;
use crate::schema::{display_identifier, Record};

pub use prompts::{cohort_prompt, DEFAULT_SYSTEM_PROMPT};

/// Cohort assigned when classification fails.
pub const UNCLASSIFIED: &str = "unclassified";

/// A source record plus its classification-enriched copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub original: Record,
    /// `original` with a `cohort` field attached.
    pub enriched: Record,
}

impl EnrichedRecord {
    pub fn new(original: Record, cohort: &str) -> Self {
        let mut enriched = original.clone();
        enriched.insert("cohort".to_string(), Value::String(cohort.to_string()));
        Self { original, enriched }
    }

    pub fn cohort(&self) -> Option<&str> {
        self.enriched.get("cohort").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    /// Maximum calls in flight at once (at least 1).
    pub max_concurrency: usize,
    /// Calls per second; 0 disables rate limiting.
    pub requests_per_second: u32,
    pub max_response_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            requests_per_second: 0,
            max_response_tokens: 50,
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationReport {
    pub records: Vec<EnrichedRecord>,
    /// One entry per record that fell back to [`UNCLASSIFIED`], in input order.
    pub failures: Vec<IsolatedFailure>,
}

pub struct CohortClassifier {
    service: Arc<dyn CohortService>,
    settings: ClassifierSettings,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl std::fmt::Debug for CohortClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CohortClassifier")
            .field("settings", &self.settings)
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish()
    }
}

impl CohortClassifier {
    pub fn new(service: Arc<dyn CohortService>) -> Self {
        Self::with_settings(service, ClassifierSettings::default())
    }

    pub fn with_settings(service: Arc<dyn CohortService>, settings: ClassifierSettings) -> Self {
        // Burst of one: calls are evenly spaced from the first request on.
        let rate_limiter = NonZeroU32::new(settings.requests_per_second).map(|per_second| {
            Arc::new(RateLimiter::direct(
                Quota::per_second(per_second).allow_burst(NonZeroU32::MIN),
            ))
        });
        Self {
            service,
            settings,
            rate_limiter,
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    fn request_for(&self, record: &Record, entity_type: EntityType) -> CohortRequest {
        CohortRequest {
            record_id: display_identifier(record),
            entity_type,
            system_prompt: self.settings.system_prompt.clone(),
            prompt: cohort_prompt(entity_type, record),
            max_tokens: self.settings.max_response_tokens,
            temperature: self.settings.temperature,
        }
    }

    /// Classify every record; one output per input, same order.
    pub async fn classify(&self, records: Vec<Record>, entity_type: EntityType) -> ClassificationReport {
        let total = records.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, record) in records.iter().enumerate() {
            let request = self.request_for(record, entity_type);
            let service = Arc::clone(&self.service);
            let semaphore = Arc::clone(&semaphore);
            let rate_limiter = self.rate_limiter.clone();

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        if let Some(limiter) = rate_limiter {
                            limiter.until_ready().await;
                        }
                        service.classify_one(&request).await
                    }
                    Err(_) => Err(ClassificationError::Network {
                        message: "classifier shut down".to_string(),
                    }),
                };
                (index, outcome)
            });
        }

        let mut labels: Vec<Option<Result<String, ClassificationError>>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => labels[index] = Some(outcome),
                Err(e) => debug!(error = %e, "Classification task did not complete"),
            }
        }

        let mut failures = Vec::new();
        let enriched = records
            .into_iter()
            .zip(labels)
            .map(|(record, label)| {
                let outcome = label
                    .unwrap_or_else(|| {
                        Err(ClassificationError::MalformedResponse {
                            message: "classification task aborted".to_string(),
                        })
                    })
                    .and_then(|text| {
                        let trimmed = text.trim();
                        if trimmed.is_empty() {
                            Err(ClassificationError::EmptyResponse)
                        } else {
                            Ok(trimmed.to_string())
                        }
                    });

                let (cohort, failure) = isolate(
                    FailureScope::Classification,
                    display_identifier(&record),
                    outcome,
                    || UNCLASSIFIED.to_string(),
                )
                .into_parts();
                match failure {
                    Some(failure) => failures.push(failure),
                    None => migration_metrics().record_classified(),
                }
                EnrichedRecord::new(record, &cohort)
            })
            .collect();

        info!(
            entity_type = %entity_type,
            records = total,
            unclassified = failures.len(),
            "Cohort classification finished"
        );

        ClassificationReport {
            records: enriched,
            failures,
        }
    }
}
