use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::{DispatcherState, FailureKind, Outcome};

/// Point-in-time view of a dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherCounts {
    pub queued: usize,
    pub outstanding: usize,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// What `shutdown()` observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub state: DispatcherState,
    /// The drain timeout elapsed and the stop signal was raised.
    pub timed_out: bool,
    /// Number of tasks reported as cancelled by the forced drain.
    pub cancelled: u64,
    pub elapsed: Duration,
}

/// Lock-free counters updated by submitters and workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    pub(crate) fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, outcome: &Outcome) {
        let counter = match outcome.failure().map(|f| f.kind) {
            None => &self.succeeded,
            Some(FailureKind::Cancelled) => &self.cancelled,
            Some(FailureKind::Task | FailureKind::Panicked) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self, queued: usize, outstanding: usize) -> DispatcherCounts {
        DispatcherCounts {
            queued,
            outstanding,
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
