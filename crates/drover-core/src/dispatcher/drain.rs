//! Drain - shutdown の本体
//!
//! `shutdown()` はこれを spawn して Stopped を待つだけ。呼び出し側の future が
//! timeout や select! で drop されても drain は最後まで進み、全タスクの result
//! と stream の close が保証される。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::counts::ShutdownReport;
use super::queue::TaskQueue;
use super::transition;
use super::worker::Bookkeeping;
use crate::cancel::StopSignal;
use crate::domain::{DispatcherState, Failure, Outcome};

/// Everything the drain needs, owned so it can outlive the `shutdown()` call.
pub(crate) struct Drain {
    pub(crate) state: Arc<watch::Sender<DispatcherState>>,
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) books: Arc<Bookkeeping>,
    pub(crate) stop: StopSignal,
    pub(crate) workers: Option<JoinSet<()>>,
    pub(crate) report: Arc<Mutex<Option<ShutdownReport>>>,
    pub(crate) drain_timeout: Duration,
    pub(crate) started: Instant,
}

impl Drain {
    /// Wait for the workers, force the stop on timeout, report leftovers,
    /// close the result stream, then move `Draining -> Stopped`.
    pub(crate) async fn run(self) {
        let Drain {
            state,
            queue,
            books,
            stop,
            workers,
            report,
            drain_timeout,
            started,
        } = self;

        let mut timed_out = false;
        if let Some(mut workers) = workers {
            if tokio::time::timeout(drain_timeout, join_all(&mut workers))
                .await
                .is_err()
            {
                timed_out = true;
                warn!(
                    outstanding = books.tracker.outstanding(),
                    "drain timeout elapsed, abandoning remaining work"
                );
                stop.stop();
                join_all(&mut workers).await;
            }
        }

        // 誰も開始しなかったタスク
        for task in queue.drain() {
            books.complete(
                task.id(),
                Outcome::Failed(Failure::cancelled("dispatcher stopped before the task started")),
                None,
            );
        }
        books.results.close();

        let shutdown = ShutdownReport {
            state: DispatcherState::Stopped,
            timed_out,
            cancelled: books.counters.cancelled(),
            elapsed: started.elapsed(),
        };
        // report は Stopped にする前に置く（wait_stopped が読む）
        *report.lock() = Some(shutdown.clone());
        if let Err(err) = transition(
            &state,
            "shutdown",
            DispatcherState::Draining,
            DispatcherState::Stopped,
        ) {
            warn!(error = %err, "drain finished in an unexpected state");
            return;
        }
        info!(timed_out, cancelled = shutdown.cancelled, "dispatcher stopped");
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "worker ended abnormally");
        }
    }
}
