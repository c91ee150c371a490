use serde::{Deserialize, Serialize};

use super::ledger::{LedgerSnapshot, LogEntry, ProgressUpdate};

/// One change to the ledger, as delivered to observers.
///
/// Serialized as `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum LedgerEvent {
    Log(LogEntry),
    Progress(ProgressUpdate),
    /// Full approval set after a change, sorted.
    Approvals(Vec<String>),
    /// Full snapshot; sent on subscribe, run replacement and terminal transitions.
    State(Box<LedgerSnapshot>),
}

impl LedgerEvent {
    pub fn state(snapshot: LedgerSnapshot) -> Self {
        LedgerEvent::State(Box::new(snapshot))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::Log(_) => "log",
            LedgerEvent::Progress(_) => "progress",
            LedgerEvent::Approvals(_) => "approvals",
            LedgerEvent::State(_) => "state",
        }
    }
}
