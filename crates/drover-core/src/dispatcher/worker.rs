//! Worker loop: pull → execute → emit → finish.
//!
//! # チェックポイント（停止シグナルを見る場所）
//! 1. queue から pull する前
//! 2. pull したタスクを開始する前
//! 3. 実行中の work を待っている間（work 自体は止めない）
//!
//! Every task a worker pulls produces exactly one result, whichever of
//! these points the stop signal is observed at. Work that already started is
//! never interrupted: on stop the worker reports it as cancelled and leaves
//! it running detached, so its side effects are applied in full.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, warn};

use super::counts::Counters;
use super::queue::TaskQueue;
use super::results::ResultSink;
use crate::cancel::StopListener;
use crate::domain::{Failure, Outcome, Task, TaskId, TaskResult};
use crate::ports::Clock;
use crate::tracker::CompletionTracker;

/// Shared bookkeeping: every finished task goes through [`complete`](Self::complete).
pub(crate) struct Bookkeeping {
    pub(crate) tracker: CompletionTracker,
    pub(crate) counters: Counters,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) results: ResultSink,
}

impl Bookkeeping {
    /// Record, emit, then finish. The result is on the stream before
    /// `wait_idle` can observe the task as done.
    pub(crate) fn complete(&self, task_id: TaskId, outcome: Outcome, worker: Option<usize>) {
        self.counters.record(&outcome);
        let mut result = TaskResult::new(task_id, outcome, self.clock.now());
        if let Some(worker) = worker {
            result = result.with_worker(worker);
        }
        self.results.emit(result);
        self.tracker.finish();
    }
}

pub(crate) struct WorkerContext {
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) books: Arc<Bookkeeping>,
    pub(crate) stop: StopListener,
}

pub(crate) async fn worker_loop(worker: usize, ctx: WorkerContext) {
    debug!(worker, "worker started");
    loop {
        if ctx.stop.is_stopped() {
            break;
        }

        // pop は待つ可能性があるので select で停止シグナルと競合させる
        let task = tokio::select! {
            biased;
            _ = ctx.stop.stopped() => break,
            task = ctx.queue.pop() => task,
        };
        // None: queue が close されて空になった
        let Some(task) = task else {
            break;
        };

        let task_id = task.id();
        let outcome = if ctx.stop.is_stopped() {
            Outcome::Failed(Failure::cancelled("stop signal raised before the task started"))
        } else {
            execute(worker, task, &ctx.stop).await
        };
        ctx.books.complete(task_id, outcome, Some(worker));
    }
    debug!(worker, "worker exited");
}

/// Run one task on its own tokio task so a panic stays contained.
///
/// On stop the worker stops waiting and the handle is dropped, which detaches
/// the task. It finishes on the runtime and its value is discarded.
async fn execute(worker: usize, task: Task, stop: &StopListener) -> Outcome {
    let task_id = task.id();
    debug!(worker, %task_id, "executing task");

    let mut handle = tokio::spawn(task.into_work().execute());
    tokio::select! {
        biased;
        joined = &mut handle => match joined {
            Ok(result) => result.into(),
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                warn!(worker, %task_id, %message, "task panicked");
                Outcome::Failed(Failure::panicked(message))
            }
            Err(err) => Outcome::Failed(Failure::cancelled(err.to_string())),
        },
        _ = stop.stopped() => {
            // abort はしない。handle の drop で detach される
            warn!(worker, %task_id, "abandoning in-flight task, leaving it to finish detached");
            Outcome::Failed(Failure::cancelled("abandoned after drain timeout"))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "task panicked".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::StopSignal;
    use crate::ports::SystemClock;
    use crate::work;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use ulid::Ulid;

    fn books() -> (Arc<Bookkeeping>, super::super::results::ResultStream) {
        let (results, stream) = ResultSink::channel();
        let books = Arc::new(Bookkeeping {
            tracker: CompletionTracker::new(),
            counters: Counters::default(),
            clock: Arc::new(SystemClock),
            results,
        });
        (books, stream)
    }

    fn task(work: impl crate::work::Work) -> Task {
        Task::new(TaskId::from_ulid(Ulid::new()), Box::new(work), Utc::now())
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "task panicked");
    }

    #[tokio::test]
    async fn panicking_work_becomes_a_failure() {
        let stop = StopSignal::new();
        let outcome = execute(
            0,
            task(work::from_fn(|| panic!("kaboom"))),
            &stop.listener(),
        )
        .await;
        assert_eq!(outcome, Outcome::Failed(Failure::panicked("kaboom")));
    }

    #[tokio::test]
    async fn stop_reports_cancelled_but_lets_the_work_finish() {
        let stop = StopSignal::new();
        let listener = stop.listener();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let slow = task(work::from_future(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = done_tx.send("finished");
            Ok(json!("late"))
        }));

        let running = tokio::spawn(async move { execute(0, slow, &listener).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.stop();

        // worker は work の完了を待たずに戻る
        let outcome = tokio::time::timeout(Duration::from_millis(30), running)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.failure().unwrap().is_cancelled());

        // detach された work は最後まで走る
        let done = tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .unwrap();
        assert_eq!(done, Ok("finished"));
    }

    #[tokio::test]
    async fn worker_exits_when_queue_closes_and_reports_every_task() {
        let queue = Arc::new(TaskQueue::new(4));
        let (books, mut stream) = books();
        let stop = StopSignal::new();

        for i in 0..3 {
            books.tracker.track();
            queue
                .try_reserve()
                .unwrap()
                .push(task(work::from_fn(move || Ok(json!(i)))))
                .unwrap();
        }
        queue.close();

        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            books: Arc::clone(&books),
            stop: stop.listener(),
        };
        tokio::time::timeout(Duration::from_secs(1), worker_loop(7, ctx))
            .await
            .unwrap();

        books.results.close();
        let mut values = Vec::new();
        while let Some(result) = stream.next().await {
            assert_eq!(result.worker, Some(7));
            values.push(result.value().cloned().unwrap());
        }
        assert_eq!(values, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(books.tracker.outstanding(), 0);
    }
}
