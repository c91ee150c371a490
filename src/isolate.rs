//! Continue-on-error policy shared by classification, field mapping and the
//! write sweep.
//!
//! A failed operation is logged and replaced by a fallback value; the caller
//! receives the value together with a description of what went wrong so it can
//! surface the failure on the run's log stream. Nothing here ever aborts a
//! batch.

use std::fmt;

use crate::observability::migration_metrics;

/// Which per-item operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    Classification,
    Field,
    Write,
}

impl FailureScope {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureScope::Classification => "classification",
            FailureScope::Field => "field mapping",
            FailureScope::Write => "write",
        }
    }
}

/// A recovered per-item failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedFailure {
    pub scope: FailureScope,
    /// Record id, or `record.field` for field failures.
    pub key: String,
    pub message: String,
}

impl fmt::Display for IsolatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed for {}: {}", self.scope.as_str(), self.key, self.message)
    }
}

/// Outcome of an isolated operation: always a value, sometimes a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Isolated<T> {
    pub value: T,
    pub failure: Option<IsolatedFailure>,
}

impl<T> Isolated<T> {
    pub fn is_recovered(&self) -> bool {
        self.failure.is_some()
    }

    pub fn into_parts(self) -> (T, Option<IsolatedFailure>) {
        (self.value, self.failure)
    }
}

/// Run the partial-failure policy over one operation's result.
pub fn isolate<T, E, F>(scope: FailureScope, key: impl Into<String>, result: Result<T, E>, fallback: F) -> Isolated<T>
where
    E: fmt::Display,
    F: FnOnce() -> T,
{
    match result {
        Ok(value) => Isolated { value, failure: None },
        Err(error) => {
            let failure = IsolatedFailure {
                scope,
                key: key.into(),
                message: error.to_string(),
            };
            tracing::error!(
                scope = failure.scope.as_str(),
                key = %failure.key,
                error = %failure.message,
                "Isolated per-item failure; continuing with fallback"
            );
            match scope {
                FailureScope::Classification => migration_metrics().record_classification_fallback(),
                FailureScope::Field => migration_metrics().record_field_fallback(),
                FailureScope::Write => migration_metrics().record_write(false),
            }
            Isolated {
                value: fallback(),
                failure: Some(failure),
            }
        }
    }
}
