//! Result model: what a worker (or a forced drain) reports for one task.
//!
//! This module does not know about queues or workers. It only defines the
//! shape of a result, so that "value XOR failure" holds by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;
use crate::error::DispatchError;

/// Why a task did not produce a value.
///
/// Serialized as SCREAMING_SNAKE_CASE (TASK / PANICKED / CANCELLED) to match
/// the other wire-facing enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The work itself returned an error.
    Task,
    /// The work panicked. The worker survived and kept going.
    Panicked,
    /// Abandoned during a forced drain (never started, or no longer waited
    /// for and left to finish detached).
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn task(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Task,
            message: message.into(),
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panicked,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == FailureKind::Cancelled
    }
}

/// Exactly one of value / failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Value(serde_json::Value),
    Failed(Failure),
}

impl Outcome {
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Value(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

impl From<Result<serde_json::Value, String>> for Outcome {
    fn from(result: Result<serde_json::Value, String>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(message) => Self::Failed(Failure::task(message)),
        }
    }
}

/// The one-to-one outcome of executing a submitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub outcome: Outcome,

    /// Worker index that produced this result. `None` when the dispatcher
    /// itself reported a queued task as cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<usize>,

    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(task_id: TaskId, outcome: Outcome, finished_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            outcome,
            worker: None,
            finished_at,
        }
    }

    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome.failure().is_some_and(Failure::is_cancelled)
    }

    pub fn value(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            Outcome::Value(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    /// Unwrap into the value, mapping failures onto the error taxonomy.
    pub fn into_result(self) -> Result<serde_json::Value, DispatchError> {
        match self.outcome {
            Outcome::Value(value) => Ok(value),
            Outcome::Failed(failure) if failure.is_cancelled() => Err(DispatchError::Cancelled {
                task_id: self.task_id,
            }),
            Outcome::Failed(failure) => Err(DispatchError::TaskFailed {
                task_id: self.task_id,
                message: failure.message,
            }),
        }
    }
}
