//! Orchestrator: drives one migration run at a time through
//! fetch → classify → transform → approval → write.
//!
//! Each stage runs as its own task so a panicking collaborator, or a caller
//! that stops waiting, can never leave the run stuck in `running`.

use serde::Serialize;
use statig::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use super::broadcaster::{EventBroadcaster, Subscription};
use super::errors::MigrationError;
use super::events::LedgerEvent;
use super::ledger::{LedgerSnapshot, LogLevel, RunLedger, RunPhase, RunStatus};
use super::lifecycle::{LifecycleEvent, RunLifecycle};
use crate::classify::{CohortClassifier, UNCLASSIFIED};
use crate::config::BillingBridgeConfig;
use crate::entity::EntityType;
use crate::external::{CohortService, DestinationConfig, DestinationWriter, SourceLedger};
use crate::isolate::{isolate, FailureScope};
use crate::mapping::{map_work_items, WorkItem};
use crate::observability::{migration_metrics, OperationTimer};
use crate::schema::TargetSchema;
use crate::telemetry::{create_run_span, generate_correlation_id};

/// What the pipeline produced, returned once the run is waiting for approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub entity_type: EntityType,
    pub fetched: usize,
    pub results: usize,
    pub unclassified: usize,
    pub field_fallbacks: usize,
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedWrite {
    pub id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub run_id: String,
    pub attempted: usize,
    pub written: Vec<String>,
    pub rejected: Vec<RejectedWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalUpdate {
    pub changed: usize,
    pub approved_ids: Vec<String>,
}

struct RunSlot {
    lifecycle: StateMachine<RunLifecycle>,
    ledger: RunLedger,
}

impl RunSlot {
    fn transition(&mut self, event: LifecycleEvent) {
        self.lifecycle.handle(&event);
        self.ledger.set_status(self.lifecycle.inner().status());
    }
}

pub struct MigrationOrchestrator {
    engine: Arc<RunEngine>,
}

/// State and collaborators shared with the spawned stage tasks.
struct RunEngine {
    source: Arc<dyn SourceLedger>,
    classifier: CohortClassifier,
    destination: Arc<dyn DestinationWriter>,
    slot: Mutex<RunSlot>,
    broadcaster: EventBroadcaster,
}

impl MigrationOrchestrator {
    pub fn new(
        source: Arc<dyn SourceLedger>,
        classifier: CohortClassifier,
        destination: Arc<dyn DestinationWriter>,
    ) -> Self {
        Self {
            engine: Arc::new(RunEngine {
                source,
                classifier,
                destination,
                slot: Mutex::new(RunSlot {
                    lifecycle: RunLifecycle::new().state_machine(),
                    ledger: RunLedger::idle(),
                }),
                broadcaster: EventBroadcaster::default(),
            }),
        }
    }

    /// Wire collaborators using the classifier and broadcast sections of `config`.
    pub fn from_config(
        source: Arc<dyn SourceLedger>,
        cohort_service: Arc<dyn CohortService>,
        destination: Arc<dyn DestinationWriter>,
        config: &BillingBridgeConfig,
    ) -> Self {
        let classifier = CohortClassifier::with_settings(cohort_service, config.classifier.settings());
        Self::new(source, classifier, destination)
            .with_subscriber_buffer(config.broadcast.subscriber_buffer)
    }

    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        match Arc::get_mut(&mut self.engine) {
            Some(engine) => engine.broadcaster = EventBroadcaster::new(buffer),
            None => warn!(buffer, "Subscriber buffer unchanged: a run is already in flight"),
        }
        self
    }

    /// Start a run and drive it to the approval gate.
    ///
    /// Returns once results are ready; the run then stays `running` until
    /// [`complete`](Self::complete) is called. Fails immediately with
    /// [`MigrationError::AlreadyRunning`] if another run is in flight.
    ///
    /// The pipeline runs on its own task. Dropping this future detaches it
    /// and the run still reaches the approval gate; a panic in any stage
    /// ends the run in `error` with [`MigrationError::Interrupted`].
    pub async fn start(
        &self,
        entity_type: EntityType,
        schema: TargetSchema,
    ) -> Result<RunSummary, MigrationError> {
        let run_id = self.engine.begin(entity_type).await?;

        let span = create_run_span("pipeline", &run_id, entity_type);
        let engine = Arc::clone(&self.engine);
        let pipeline = tokio::spawn(
            async move { engine.run_pipeline(run_id, entity_type, &schema).await }.instrument(span),
        );
        self.engine.settle("pipeline", pipeline).await
    }

    /// Add (`approved = true`) or remove ids from the approval set.
    ///
    /// Allowed at any time. Ids need not match any result. Only an actual
    /// change is logged and broadcast.
    pub async fn set_approval<I, S>(&self, ids: I, approved: bool) -> ApprovalUpdate
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine = &self.engine;
        let mut slot = engine.slot.lock().await;
        let changed = slot.ledger.set_approval(ids, approved);
        let approved_ids: Vec<String> = slot.ledger.approved_ids().iter().cloned().collect();

        if changed > 0 {
            let verb = if approved { "Approved" } else { "Unapproved" };
            engine.log_locked(&mut slot, LogLevel::Info, format!("{verb} {changed} record(s)"));
            engine.broadcaster.broadcast(&LedgerEvent::Approvals(approved_ids.clone()));
        }

        ApprovalUpdate { changed, approved_ids }
    }

    /// Write every approved result to the destination and finish the run.
    ///
    /// Per-record rejections are reported and do not stop the sweep. A
    /// destination that cannot be reached ends the run in `error`, and so
    /// does a panicking writer.
    pub async fn complete(
        &self,
        destination: DestinationConfig,
    ) -> Result<CompletionReport, MigrationError> {
        let (run_id, entity_type, approved) = self.engine.begin_writing().await?;

        let span = create_run_span("completion", &run_id, entity_type);
        let engine = Arc::clone(&self.engine);
        let sweep = tokio::spawn(
            async move { engine.write_approved(run_id, approved, &destination).await }.instrument(span),
        );
        self.engine.settle("write sweep", sweep).await
    }

    /// Copy of the current ledger.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.engine.slot.lock().await.ledger.snapshot()
    }

    /// Register an observer. Its first event is a `state` snapshot; every
    /// later ledger change follows in order.
    pub async fn subscribe(&self) -> Subscription {
        let slot = self.engine.slot.lock().await;
        self.engine
            .broadcaster
            .subscribe(LedgerEvent::state(slot.ledger.snapshot()))
    }

    pub fn subscriber_count(&self) -> usize {
        self.engine.broadcaster.subscriber_count()
    }
}

impl RunEngine {
    async fn begin(&self, entity_type: EntityType) -> Result<String, MigrationError> {
        let mut slot = self.slot.lock().await;
        if slot.lifecycle.inner().is_running() {
            warn!(entity = %entity_type, "Rejected start: migration already in progress");
            return Err(MigrationError::AlreadyRunning);
        }

        let run_id = generate_correlation_id();
        slot.ledger = RunLedger::begin(run_id.clone(), entity_type);
        slot.transition(LifecycleEvent::Start);
        self.broadcaster.broadcast(&LedgerEvent::state(slot.ledger.snapshot()));
        Ok(run_id)
    }

    /// Wait for a stage task. A task that panicked or was cancelled fails the run.
    async fn settle<T>(
        &self,
        stage: &str,
        task: JoinHandle<Result<T, MigrationError>>,
    ) -> Result<T, MigrationError> {
        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    format!("{stage} panicked")
                } else {
                    format!("{stage} was cancelled")
                };
                error!(%stage, error = %join_error, "Stage task did not finish");
                Err(self.fail(MigrationError::Interrupted { message }).await)
            }
        }
    }

    async fn run_pipeline(
        &self,
        run_id: String,
        entity_type: EntityType,
        schema: &TargetSchema,
    ) -> Result<RunSummary, MigrationError> {
        info!(fields = schema.len(), "Starting migration pipeline");

        self.progress(10, "Fetching data from source").await;
        let timer = OperationTimer::new("fetch");
        let records = match self.source.fetch(entity_type).await {
            Ok(records) => records,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        timer.finish();
        let fetched = records.len();
        migration_metrics().record_fetched(fetched);
        self.log(LogLevel::Info, format!("Fetched {fetched} {entity_type} from source"))
            .await;

        self.progress(30, "Analyzing and assigning cohorts").await;
        let timer = OperationTimer::new("classify");
        let classified = self.classifier.classify(records, entity_type).await;
        timer.finish();
        for failure in &classified.failures {
            self.log(LogLevel::Error, format!("{failure}; assigned cohort '{UNCLASSIFIED}'"))
                .await;
        }
        self.log(LogLevel::Info, "Cohort analysis complete").await;

        self.progress(50, "Transforming data").await;
        let timer = OperationTimer::new("transform");
        let mapping = match map_work_items(&classified.records, schema, Some(entity_type)) {
            Ok(mapping) => mapping,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        timer.finish();
        for failure in &mapping.failures {
            self.log(LogLevel::Error, format!("{failure}; using zero value")).await;
        }
        self.log(LogLevel::Info, "Data transformation complete").await;

        let mut slot = self.slot.lock().await;
        let duplicates = slot.ledger.set_results(mapping.items);
        if !duplicates.is_empty() {
            self.log_locked(
                &mut slot,
                LogLevel::Warn,
                format!("Duplicate record ids collapsed (last one kept): {}", duplicates.join(", ")),
            );
        }
        let results = slot.ledger.results().map_or(0, <[_]>::len);
        slot.ledger.set_phase(RunPhase::AwaitingApproval);
        self.progress_locked(&mut slot, 70, "Ready for approval");
        drop(slot);

        info!(results, "Migration awaiting approval");
        Ok(RunSummary {
            run_id,
            entity_type,
            fetched,
            results,
            unclassified: classified.failures.len(),
            field_fallbacks: mapping.failures.len(),
            duplicates,
        })
    }

    async fn begin_writing(&self) -> Result<(String, EntityType, Vec<WorkItem>), MigrationError> {
        let mut slot = self.slot.lock().await;
        let (Some(_), Some(entity_type)) = (slot.ledger.results(), slot.ledger.entity_type()) else {
            return Err(MigrationError::NoResults);
        };
        let (status, phase) = (slot.ledger.status(), slot.ledger.phase());
        if status != RunStatus::Running || phase != RunPhase::AwaitingApproval {
            warn!(%status, %phase, "Rejected completion: run is not awaiting approval");
            return Err(MigrationError::NotAwaitingApproval { status, phase });
        }

        let approved = slot.ledger.approved_items();
        slot.ledger.set_phase(RunPhase::Writing);
        self.progress_locked(&mut slot, 90, "Writing to destination");
        let run_id = slot.ledger.run_id().unwrap_or_default().to_string();
        Ok((run_id, entity_type, approved))
    }

    async fn write_approved(
        &self,
        run_id: String,
        approved: Vec<WorkItem>,
        destination: &DestinationConfig,
    ) -> Result<CompletionReport, MigrationError> {
        info!(approved = approved.len(), endpoint = %destination.endpoint, "Writing approved records");
        let timer = OperationTimer::new("write");
        let mut report = CompletionReport {
            run_id,
            attempted: approved.len(),
            ..CompletionReport::default()
        };

        for item in &approved {
            let outcome = match self.destination.write_one(&item.transformed, destination).await {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.fail(e.into()).await),
            };

            let (_, failure) =
                isolate(FailureScope::Write, item.id(), outcome.into_result(), String::new).into_parts();
            match failure {
                None => {
                    migration_metrics().record_write(true);
                    report.written.push(item.id().to_string());
                }
                Some(failure) => {
                    self.log(LogLevel::Error, failure.to_string()).await;
                    report.rejected.push(RejectedWrite {
                        id: failure.key,
                        detail: failure.message,
                    });
                }
            }
        }
        timer.finish();

        let mut slot = self.slot.lock().await;
        self.progress_locked(&mut slot, 100, "Migration complete");
        self.log_locked(
            &mut slot,
            LogLevel::Info,
            format!(
                "Migration successfully completed: {} written, {} rejected",
                report.written.len(),
                report.rejected.len()
            ),
        );
        slot.ledger.set_phase(RunPhase::Finished);
        slot.transition(LifecycleEvent::Finish);
        self.broadcaster.broadcast(&LedgerEvent::state(slot.ledger.snapshot()));
        drop(slot);

        migration_metrics().log_stats();
        Ok(report)
    }

    async fn progress(&self, progress: u8, step: &str) {
        let mut slot = self.slot.lock().await;
        self.progress_locked(&mut slot, progress, step);
    }

    fn progress_locked(&self, slot: &mut RunSlot, progress: u8, step: &str) {
        let update = slot.ledger.advance(progress, step);
        info!(progress = update.progress, step = %update.step, "Run progress");
        self.broadcaster.broadcast(&LedgerEvent::Progress(update));
    }

    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let mut slot = self.slot.lock().await;
        self.log_locked(&mut slot, level, message);
    }

    fn log_locked(&self, slot: &mut RunSlot, level: LogLevel, message: impl Into<String>) {
        let entry = slot.ledger.append_log(level, message);
        match entry.level {
            LogLevel::Info => info!(message = %entry.message, "Run log"),
            LogLevel::Warn => warn!(message = %entry.message, "Run log"),
            LogLevel::Error => error!(message = %entry.message, "Run log"),
        }
        self.broadcaster.broadcast(&LedgerEvent::Log(entry));
    }

    /// Move the run to `error`, record why, and hand the error back.
    async fn fail(&self, error: MigrationError) -> MigrationError {
        let mut slot = self.slot.lock().await;
        self.log_locked(&mut slot, LogLevel::Error, format!("Migration failed: {error}"));
        slot.transition(LifecycleEvent::Fail);
        self.broadcaster.broadcast(&LedgerEvent::state(slot.ledger.snapshot()));
        error
    }
}

impl std::fmt::Debug for MigrationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationOrchestrator")
            .field("classifier", &self.engine.classifier)
            .field("broadcaster", &self.engine.broadcaster)
            .finish_non_exhaustive()
    }
}
