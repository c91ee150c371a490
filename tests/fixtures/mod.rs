//! Fake collaborators for driving the orchestrator in integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use billing_bridge::{
    ClassificationError, CohortClassifier, CohortRequest, CohortService, DestinationConfig,
    DestinationWriter, EntityType, FetchError, MigrationOrchestrator, Record, SourceLedger,
    TransformedRecord, WriteOutcome, WriteSweepError,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Turn a JSON array literal into source records.
pub fn records(value: Value) -> Vec<Record> {
    value
        .as_array()
        .expect("fixture must be a JSON array")
        .iter()
        .map(|item| item.as_object().cloned().expect("fixture items must be objects"))
        .collect()
}

/// `count` plan records with ids `p0..p{count-1}`.
pub fn plan_records(count: usize) -> Vec<Record> {
    let items: Vec<Value> = (0..count)
        .map(|i| serde_json::json!({"id": format!("p{i}"), "name": format!("Plan {i}"), "billingFrequency": "monthly", "price": "10.00"}))
        .collect();
    records(Value::Array(items))
}

/// Source that serves fixed records, optionally holding every fetch until released.
#[derive(Default)]
pub struct GatedSource {
    records: HashMap<EntityType, Vec<Record>>,
    gate: Option<Arc<Notify>>,
    fail_with: Option<String>,
    panics: bool,
    fetches: AtomicUsize,
}

impl GatedSource {
    pub fn new(entity_type: EntityType, records: Vec<Record>) -> Self {
        let mut by_entity = HashMap::new();
        by_entity.insert(entity_type, records);
        Self {
            records: by_entity,
            ..Self::default()
        }
    }

    /// Fetches block until [`release`](Self::release) is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Fetches panic once the gate (if any) opens.
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceLedger for GatedSource {
    async fn fetch(&self, entity_type: EntityType) -> Result<Vec<Record>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.panics {
            panic!("source ledger driver crashed");
        }
        if let Some(message) = &self.fail_with {
            return Err(FetchError::Unavailable {
                message: message.clone(),
            });
        }
        Ok(self.records.get(&entity_type).cloned().unwrap_or_default())
    }
}

/// Classifier that answers with a fixed label except for ids it is told to fail.
pub struct ScriptedCohortService {
    label: String,
    failing_ids: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedCohortService {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            failing_ids: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_for(mut self, ids: &[&str]) -> Self {
        self.failing_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CohortService for ScriptedCohortService {
    async fn classify_one(&self, request: &CohortRequest) -> Result<String, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.contains(&request.record_id) {
            return Err(ClassificationError::QuotaExceeded);
        }
        Ok(self.label.clone())
    }
}

/// Destination that records every write it receives.
#[derive(Default)]
pub struct RecordingDestination {
    writes: Mutex<Vec<TransformedRecord>>,
    rejected_ids: HashSet<String>,
    unreachable_after: Option<usize>,
    panic_on: Option<String>,
}

impl RecordingDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, ids: &[&str]) -> Self {
        self.rejected_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Accept `writes` calls, then report the destination as unreachable.
    pub fn unreachable_after(mut self, writes: usize) -> Self {
        self.unreachable_after = Some(writes);
        self
    }

    /// Panic when asked to write `id`.
    pub fn panicking_on(mut self, id: &str) -> Self {
        self.panic_on = Some(id.to_string());
        self
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.writes.lock().unwrap().iter().map(|record| record.id.clone()).collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl DestinationWriter for RecordingDestination {
    async fn write_one(
        &self,
        record: &TransformedRecord,
        config: &DestinationConfig,
    ) -> Result<WriteOutcome, WriteSweepError> {
        if self.panic_on.as_deref() == Some(record.id.as_str()) {
            panic!("destination client crashed on {}", record.id);
        }
        let mut writes = self.writes.lock().unwrap();
        if self.unreachable_after.is_some_and(|limit| writes.len() >= limit) {
            return Err(WriteSweepError::Unreachable {
                message: format!("connection refused: {}", config.endpoint),
            });
        }
        writes.push(record.clone());
        if self.rejected_ids.contains(&record.id) {
            Ok(WriteOutcome::rejected(format!("duplicate key {}", record.id)))
        } else {
            Ok(WriteOutcome::accepted(format!("created {}", record.id)))
        }
    }
}

pub fn orchestrator(
    source: Arc<GatedSource>,
    cohorts: Arc<ScriptedCohortService>,
    destination: Arc<RecordingDestination>,
) -> MigrationOrchestrator {
    MigrationOrchestrator::new(source, CohortClassifier::new(cohorts), destination)
}

pub fn plans_destination() -> DestinationConfig {
    DestinationConfig::for_entity("https://erp.test/api", EntityType::Plans, None)
}
