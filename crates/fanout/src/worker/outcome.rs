//! Per-item outcomes

use serde::{Deserialize, Serialize};

/// Why an item did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionFailure<E> {
    /// The action returned an error
    #[error("{0}")]
    Error(E),

    /// The action panicked; carries the panic message when it was a string
    #[error("action panicked: {0}")]
    Panicked(String),

    /// The pool was shut down before the item could be dispatched
    #[error("cancelled before dispatch: pool shut down")]
    Cancelled,
}

impl<E> ActionFailure<E> {
    /// The action's own error, if that is what failed
    pub fn error(&self) -> Option<&E> {
        match self {
            ActionFailure::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of processing one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<V, E> {
    Success(V),
    Failure(ActionFailure<E>),
}

impl<V, E> Outcome<V, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn success(&self) -> Option<&V> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ActionFailure<E>> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(f) => Some(f),
        }
    }

    pub fn into_result(self) -> Result<V, ActionFailure<E>> {
        match self {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(f) => Err(f),
        }
    }
}

impl<V, E> From<Result<V, E>> for Outcome<V, E> {
    fn from(result: Result<V, E>) -> Self {
        match result {
            Ok(v) => Outcome::Success(v),
            Err(e) => Outcome::Failure(ActionFailure::Error(e)),
        }
    }
}

/// Counts over a set of outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    /// True when every item succeeded (vacuously true for an empty run)
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Tally successes and failures
pub fn summarize<V, E>(outcomes: &[Outcome<V, E>]) -> RunSummary {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    RunSummary {
        total: outcomes.len(),
        succeeded,
        failed: outcomes.len() - succeeded,
    }
}
