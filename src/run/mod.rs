//! Migration runs: the ledger, its lifecycle, event fan-out and the
//! orchestrator that drives the pipeline.

pub mod broadcaster;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod orchestrator;

pub use broadcaster::{BroadcastReport, EventBroadcaster, Subscription, DEFAULT_SUBSCRIBER_BUFFER};
pub use errors::MigrationError;
pub use events::LedgerEvent;
pub use ledger::{
    LedgerSnapshot, LogEntry, LogLevel, ProgressUpdate, RunLedger, RunPhase, RunStatus,
};
pub use lifecycle::{LifecycleEvent, RunLifecycle};
pub use orchestrator::{
    ApprovalUpdate, CompletionReport, MigrationOrchestrator, RejectedWrite, RunSummary,
};
