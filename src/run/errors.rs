use thiserror::Error;

use super::ledger::{RunPhase, RunStatus};
use crate::external::{FetchError, WriteSweepError};
use crate::mapping::MappingError;

/// Failures that stop a run or reject an orchestrator call.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration already in progress")]
    AlreadyRunning,

    #[error("Failed to fetch source data: {0}")]
    Fetch(#[from] FetchError),

    #[error("Unable to determine entity type from record structure")]
    UnknownEntityType,

    #[error("No migration results to complete")]
    NoResults,

    #[error("Run is not awaiting approval (status: {status}, phase: {phase})")]
    NotAwaitingApproval { status: RunStatus, phase: RunPhase },

    #[error("Write sweep aborted: {0}")]
    WriteSweep(#[from] WriteSweepError),

    #[error("Migration interrupted: {message}")]
    Interrupted { message: String },
}

impl From<MappingError> for MigrationError {
    fn from(error: MappingError) -> Self {
        match error {
            MappingError::UnknownEntityType => MigrationError::UnknownEntityType,
        }
    }
}

impl MigrationError {
    /// Whether the error moved the run into the `error` status, as opposed
    /// to a call that was refused without touching the ledger.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::Fetch(_)
                | MigrationError::UnknownEntityType
                | MigrationError::WriteSweep(_)
                | MigrationError::Interrupted { .. }
        )
    }
}
