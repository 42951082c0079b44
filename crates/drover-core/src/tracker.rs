//! CompletionTracker - 未完了タスク数の管理
//!
//! WaitGroup と同じ役割だが、`finish` の呼びすぎは黙って負数にせず
//! 即座に落とす（bookkeeping が壊れた状態で動き続けない）。

use std::time::Duration;

use tokio::sync::watch;
use tracing::error;

use crate::cancel::with_deadline;
use crate::error::DispatchError;

/// Counts submitted-but-not-finished tasks and wakes `wait_idle` at zero.
///
/// Protocol:
/// 1. `track()` once per accepted submission, before the task is queued.
/// 2. `finish()` once per task, when its result has been produced.
#[derive(Debug)]
pub struct CompletionTracker {
    outstanding: watch::Sender<usize>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        let (outstanding, _rx) = watch::channel(0);
        Self { outstanding }
    }

    pub fn track(&self) {
        self.outstanding.send_modify(|n| *n += 1);
    }

    /// Like [`finish`](Self::finish) but reports an unmatched call instead
    /// of aborting. The counter is left untouched on error.
    pub fn try_finish(&self) -> Result<(), DispatchError> {
        let mut unmatched = false;
        self.outstanding.send_if_modified(|n| {
            if *n == 0 {
                unmatched = true;
                return false;
            }
            *n -= 1;
            true
        });
        if unmatched {
            return Err(DispatchError::InvariantViolation(
                "finish() called with no outstanding track()".to_string(),
            ));
        }
        Ok(())
    }

    /// Mark one tracked task as finished.
    ///
    /// # Panics
    /// If nothing is outstanding. That is a caller bug, not a runtime
    /// condition.
    pub fn finish(&self) {
        if let Err(err) = self.try_finish() {
            error!(error = %err, "completion tracker corrupted");
            panic!("{err}");
        }
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Wait until nothing is outstanding. Returns immediately at zero.
    pub async fn wait_idle(&self, deadline: Option<Duration>) -> Result<(), DispatchError> {
        let mut rx = self.outstanding.subscribe();
        with_deadline(deadline, async move {
            // Sender は self が持っているので Err にはならない
            let _ = rx.wait_for(|n| *n == 0).await;
        })
        .await
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_nothing_is_tracked() {
        let tracker = CompletionTracker::new();
        tracker.wait_idle(Some(Duration::ZERO)).await.unwrap();
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn wait_idle_wakes_when_last_task_finishes() {
        let tracker = Arc::new(CompletionTracker::new());
        for _ in 0..3 {
            tracker.track();
        }

        let finisher = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                for _ in 0..3 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    tracker.finish();
                }
            })
        };

        tracker.wait_idle(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(tracker.outstanding(), 0);
        finisher.await.unwrap();
    }

    #[tokio::test]
    async fn wait_idle_times_out_while_work_is_outstanding() {
        let tracker = CompletionTracker::new();
        tracker.track();
        let err = tracker
            .wait_idle(Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)));
        assert_eq!(tracker.outstanding(), 1);
    }

    #[test]
    fn unmatched_try_finish_is_reported_and_counter_stays_at_zero() {
        let tracker = CompletionTracker::new();
        tracker.track();
        tracker.try_finish().unwrap();
        let err = tracker.try_finish().unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn unmatched_finish_panics() {
        let tracker = CompletionTracker::new();
        tracker.finish();
    }
}
