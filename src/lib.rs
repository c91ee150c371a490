// Billing Bridge Library - Billing Data Migration Orchestration
// This exposes the core components for testing and integration

pub mod classify;
pub mod config;
pub mod entity;
pub mod external;
pub mod isolate;
pub mod mapping;
pub mod observability;
pub mod run;
pub mod schema;
pub mod telemetry;

// Re-export key types for easy access
pub use classify::{ClassificationReport, ClassifierSettings, CohortClassifier, EnrichedRecord, UNCLASSIFIED};
pub use config::{config, init_config, BillingBridgeConfig};
pub use entity::{EntityType, UnsupportedEntityType};
pub use external::{
    ClassificationError, CohortRequest, CohortService, DestinationConfig, DestinationWriter,
    DryRunDestination, FetchError, FixedCohortService, JsonFixtureSource, SourceLedger,
    WriteOutcome, WriteSweepError,
};
pub use isolate::{isolate, FailureScope, Isolated, IsolatedFailure};
pub use mapping::{map_work_items, MappingError, MappingReport, WorkItem};
pub use observability::{migration_metrics, MigrationMetrics, OperationTimer};
pub use run::{
    CompletionReport, LedgerEvent, LedgerSnapshot, LogLevel, MigrationError, MigrationOrchestrator,
    RunStatus, RunSummary, Subscription,
};
pub use schema::{FieldType, Record, TargetSchema, TransformedRecord};
pub use telemetry::{create_run_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
