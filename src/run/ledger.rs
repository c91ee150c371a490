//! Run Ledger: the mutable state of one migration run.
//!
//! A ledger is never reused: starting a run builds a fresh one and the previous
//! value is dropped. Readers get [`LedgerSnapshot`] copies, never the live value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::entity::EntityType;
use crate::mapping::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Complete,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Complete => "complete",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a `running` run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Pipeline,
    AwaitingApproval,
    Writing,
    Finished,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunPhase::Pipeline => "pipeline",
            RunPhase::AwaitingApproval => "awaiting approval",
            RunPhase::Writing => "writing",
            RunPhase::Finished => "finished",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub step: String,
}

/// Point-in-time copy of a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub run_id: Option<String>,
    pub entity_type: Option<EntityType>,
    pub status: RunStatus,
    pub phase: RunPhase,
    pub progress: u8,
    pub current_step: String,
    pub logs: Vec<LogEntry>,
    /// `None` until the transform stage has produced results. Observers
    /// see an empty list either way; `phase` tells the two apart.
    #[serde(serialize_with = "results_or_empty", default)]
    pub results: Option<Vec<WorkItem>>,
    pub approved_ids: Vec<String>,
}

fn results_or_empty<S: Serializer>(results: &Option<Vec<WorkItem>>, serializer: S) -> Result<S::Ok, S::Error> {
    results.as_deref().unwrap_or_default().serialize(serializer)
}

impl LedgerSnapshot {
    pub fn result_count(&self) -> usize {
        self.results.as_ref().map_or(0, Vec::len)
    }

    pub fn is_approved(&self, id: &str) -> bool {
        self.approved_ids.iter().any(|approved| approved == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunLedger {
    run_id: Option<String>,
    entity_type: Option<EntityType>,
    status: RunStatus,
    phase: RunPhase,
    progress: u8,
    current_step: String,
    logs: Vec<LogEntry>,
    results: Option<Vec<WorkItem>>,
    approved_ids: BTreeSet<String>,
}

impl RunLedger {
    /// Ledger for a process that has not started any run yet.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Fresh ledger for a new run: running, zero progress, empty everything.
    pub fn begin(run_id: String, entity_type: EntityType) -> Self {
        Self {
            run_id: Some(run_id),
            entity_type: Some(entity_type),
            status: RunStatus::Running,
            phase: RunPhase::Pipeline,
            progress: 0,
            current_step: "Initializing".to_string(),
            ..Self::default()
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn entity_type(&self) -> Option<EntityType> {
        self.entity_type
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn current_step(&self) -> &str {
        &self.current_step
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn results(&self) -> Option<&[WorkItem]> {
        self.results.as_deref()
    }

    pub fn approved_ids(&self) -> &BTreeSet<String> {
        &self.approved_ids
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    pub(crate) fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
    }

    /// Move progress forward and relabel the step. Progress never decreases.
    pub fn advance(&mut self, progress: u8, step: impl Into<String>) -> ProgressUpdate {
        self.progress = self.progress.max(progress.min(100));
        self.current_step = step.into();
        ProgressUpdate {
            progress: self.progress,
            step: self.current_step.clone(),
        }
    }

    pub fn append_log(&mut self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
            level,
        };
        self.logs.push(entry.clone());
        entry
    }

    /// Install the run's results. Only the first call per run takes effect.
    ///
    /// Items sharing an id collapse last-write-wins into the first occurrence's
    /// slot; the colliding ids are returned so the caller can report them.
    pub fn set_results(&mut self, items: Vec<WorkItem>) -> Vec<String> {
        if self.results.is_some() {
            tracing::warn!(run_id = ?self.run_id, "Results already set for this run; ignoring replacement");
            return Vec::new();
        }

        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut unique: Vec<WorkItem> = Vec::with_capacity(items.len());
        let mut duplicates = BTreeSet::new();
        for item in items {
            match positions.get(item.id()) {
                Some(&slot) => {
                    duplicates.insert(item.id().to_string());
                    unique[slot] = item;
                }
                None => {
                    positions.insert(item.id().to_string(), unique.len());
                    unique.push(item);
                }
            }
        }

        self.results = Some(unique);
        duplicates.into_iter().collect()
    }

    /// Add or remove ids from the approval set; returns how many actually changed.
    pub fn set_approval<I, S>(&mut self, ids: I, approved: bool) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter()
            .map(Into::<String>::into)
            .filter(|id| {
                if approved {
                    self.approved_ids.insert(id.clone())
                } else {
                    self.approved_ids.remove(id)
                }
            })
            .count()
    }

    /// Results whose id is in the approval set, in result order.
    pub fn approved_items(&self) -> Vec<WorkItem> {
        self.results
            .iter()
            .flatten()
            .filter(|item| self.approved_ids.contains(item.id()))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            run_id: self.run_id.clone(),
            entity_type: self.entity_type,
            status: self.status,
            phase: self.phase,
            progress: self.progress,
            current_step: self.current_step.clone(),
            logs: self.logs.clone(),
            results: self.results.clone(),
            approved_ids: self.approved_ids.iter().cloned().collect(),
        }
    }
}
