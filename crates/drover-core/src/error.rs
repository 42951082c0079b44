use std::time::Duration;

use thiserror::Error;

use crate::domain::{DispatcherState, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{op} is not allowed while the dispatcher is {state}")]
    InvalidState {
        op: &'static str,
        state: DispatcherState,
    },

    #[error("deadline of {0:?} elapsed")]
    Timeout(Duration),

    #[error("queue is full (capacity={capacity})")]
    QueueFull { capacity: usize },

    #[error("{task_id} was cancelled before it could finish")]
    Cancelled { task_id: TaskId },

    #[error("{task_id} failed: {message}")]
    TaskFailed { task_id: TaskId, message: String },

    /// Bookkeeping was corrupted by a caller bug. Never recoverable.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl DispatchError {
    pub fn invalid_state(op: &'static str, state: DispatcherState) -> Self {
        Self::InvalidState { op, state }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Transient back-pressure: the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::QueueFull { .. })
    }
}

/// Rejected dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("worker count must be at least 1")]
    ZeroWorkers,
}
