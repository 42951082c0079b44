//! Dispatcher - bounded queue + fixed worker pool + lifecycle.
//!
//! # フロー
//! 1. `submit()`: スロット確保（満杯なら待つ）→ track → queue に push
//! 2. worker: pop → 実行 → result を送信 → finish
//! 3. `shutdown()`: Draining へ遷移 → queue を close → drain を spawn
//!    → worker の終了を待つ → timeout したら停止シグナル
//!    → 残りを Cancelled として報告 → Stopped
//!
//! The dispatcher is the only owner of the queue, the stop signal and the
//! result channel, and the only one that ever closes them.

mod builder;
mod config;
mod counts;
mod drain;
mod queue;
mod results;
mod worker;

pub use self::builder::DispatcherBuilder;
pub use self::config::DispatcherConfig;
pub use self::counts::{DispatcherCounts, ShutdownReport};
pub use self::results::ResultStream;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use self::counts::Counters;
use self::drain::Drain;
use self::queue::{ReserveError, Slot, TaskQueue};
use self::results::ResultSink;
use self::worker::{Bookkeeping, WorkerContext, worker_loop};
use crate::cancel::{StopSignal, with_deadline};
use crate::domain::{DispatcherState, Task, TaskId};
use crate::error::{ConfigError, DispatchError};
use crate::ports::{Clock, IdGenerator};
use crate::tracker::CompletionTracker;
use crate::work::Work;

/// Bounded concurrent task dispatcher.
///
/// `&self` everywhere: share it behind an `Arc` to submit from many tasks.
/// Requires a tokio runtime from `start()` on.
pub struct Dispatcher {
    config: DispatcherConfig,
    state: Arc<watch::Sender<DispatcherState>>,
    queue: Arc<TaskQueue>,
    books: Arc<Bookkeeping>,
    stop: StopSignal,
    ids: Arc<dyn IdGenerator>,
    workers: Mutex<Option<JoinSet<()>>>,
    results: Mutex<Option<ResultStream>>,
    report: Arc<Mutex<Option<ShutdownReport>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self, ConfigError> {
        DispatcherBuilder::new().config(config).build()
    }

    /// Queue capacity N, worker count W.
    pub fn with_capacity(capacity: usize, workers: usize) -> Result<Self, ConfigError> {
        Self::new(DispatcherConfig::new(capacity, workers))
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    fn from_parts(
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let (sink, stream) = ResultSink::channel();
        let (state, _rx) = watch::channel(DispatcherState::Created);
        Self {
            config,
            state: Arc::new(state),
            queue: Arc::new(TaskQueue::new(config.capacity)),
            books: Arc::new(Bookkeeping {
                tracker: CompletionTracker::new(),
                counters: Counters::default(),
                clock,
                results: sink,
            }),
            stop: StopSignal::new(),
            ids,
            workers: Mutex::new(None),
            results: Mutex::new(Some(stream)),
            report: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    pub fn counts(&self) -> DispatcherCounts {
        self.books
            .counters
            .snapshot(self.queue.len(), self.books.tracker.outstanding())
    }

    /// Spawn the W workers and start accepting work. Only valid once, from
    /// `Created`.
    pub fn start(&self) -> Result<(), DispatchError> {
        // shutdown は workers を取り出す前にこのロックを待つ
        let mut workers = self.workers.lock();
        transition(
            &self.state,
            "start",
            DispatcherState::Created,
            DispatcherState::Running,
        )?;

        let mut set = JoinSet::new();
        for worker in 0..self.config.workers {
            let ctx = WorkerContext {
                queue: Arc::clone(&self.queue),
                books: Arc::clone(&self.books),
                stop: self.stop.listener(),
            };
            set.spawn(worker_loop(worker, ctx));
        }
        *workers = Some(set);
        info!(
            workers = self.config.workers,
            capacity = self.config.capacity,
            "dispatcher started"
        );
        Ok(())
    }

    /// Queue `work`, waiting while the queue is full.
    ///
    /// Fails with `InvalidState` unless running (including when draining
    /// starts while waiting) and with `Timeout` when `deadline` elapses
    /// first. On either error nothing was queued.
    pub async fn submit<W: Work>(
        &self,
        work: W,
        deadline: Option<Duration>,
    ) -> Result<TaskId, DispatchError> {
        self.ensure_running("submit")?;
        let slot = with_deadline(deadline, self.queue.reserve())
            .await?
            .map_err(|_| DispatchError::invalid_state("submit", self.state()))?;
        self.enqueue("submit", slot, Box::new(work))
    }

    /// Queue `work` only if a slot is free right now.
    pub fn try_submit<W: Work>(&self, work: W) -> Result<TaskId, DispatchError> {
        self.ensure_running("try_submit")?;
        let slot = self.queue.try_reserve().map_err(|err| match err {
            ReserveError::Full => DispatchError::QueueFull {
                capacity: self.queue.capacity(),
            },
            ReserveError::Closed => DispatchError::invalid_state("try_submit", self.state()),
        })?;
        self.enqueue("try_submit", slot, Box::new(work))
    }

    fn enqueue(
        &self,
        op: &'static str,
        slot: Slot<'_>,
        work: Box<dyn Work>,
    ) -> Result<TaskId, DispatchError> {
        let task_id = self.ids.generate_task_id();
        let task = Task::new(task_id, work, self.books.clock.now());

        // queue に入る前に track（worker の finish が先行しないように）
        self.books.tracker.track();
        if slot.push(task).is_err() {
            // 受理されなかったので打ち消す
            self.books.tracker.finish();
            return Err(DispatchError::invalid_state(op, self.state()));
        }
        self.books.counters.record_submit();
        debug!(%task_id, "task queued");
        Ok(task_id)
    }

    /// Wait until every accepted task has produced its result.
    pub async fn wait_idle(&self, deadline: Option<Duration>) -> Result<(), DispatchError> {
        self.books.tracker.wait_idle(deadline).await
    }

    /// Take the result stream. Only one stream exists per dispatcher.
    pub fn results(&self) -> Result<ResultStream, DispatchError> {
        self.results
            .lock()
            .take()
            .ok_or_else(|| DispatchError::invalid_state("results", self.state()))
    }

    /// Drain and stop.
    ///
    /// Queued and in-flight tasks keep running for up to `drain_timeout`.
    /// After that the stop signal is raised: in-flight tasks are reported as
    /// cancelled and left to finish on their own, and everything still
    /// queued is reported as cancelled. Either way the dispatcher ends up
    /// `Stopped`.
    ///
    /// The drain runs on its own tokio task, so dropping this future (say,
    /// under `tokio::time::timeout`) does not interrupt it. A later caller,
    /// or a concurrent one, waits for that drain and gets the same report;
    /// its own `drain_timeout` is ignored.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Result<ShutdownReport, DispatchError> {
        match transition(
            &self.state,
            "shutdown",
            DispatcherState::Running,
            DispatcherState::Draining,
        ) {
            Ok(()) => self.begin_drain(drain_timeout),
            Err(DispatchError::InvalidState {
                state: DispatcherState::Draining,
                ..
            }) => {}
            Err(err) => return Err(err),
        }
        self.wait_stopped().await
    }

    fn begin_drain(&self, drain_timeout: Duration) {
        info!(drain_timeout = ?drain_timeout, "dispatcher draining");
        // 新規 submit を止め、満杯待ちの submit も解放
        self.queue.close();

        let drain = Drain {
            state: Arc::clone(&self.state),
            queue: Arc::clone(&self.queue),
            books: Arc::clone(&self.books),
            stop: self.stop.clone(),
            workers: self.workers.lock().take(),
            report: Arc::clone(&self.report),
            drain_timeout,
            started: Instant::now(),
        };
        tokio::spawn(drain.run());
    }

    async fn wait_stopped(&self) -> Result<ShutdownReport, DispatchError> {
        let mut rx = self.state.subscribe();
        // Sender は self が持っているので Err にはならない
        let _ = rx.wait_for(|state| state.is_terminal()).await;
        self.report
            .lock()
            .clone()
            .ok_or_else(|| DispatchError::invalid_state("shutdown", self.state()))
    }

    fn ensure_running(&self, op: &'static str) -> Result<(), DispatchError> {
        let state = self.state();
        if !state.accepts_work() {
            return Err(DispatchError::invalid_state(op, state));
        }
        Ok(())
    }
}

/// Atomically move `from -> to`, or report the state actually found.
fn transition(
    state: &watch::Sender<DispatcherState>,
    op: &'static str,
    from: DispatcherState,
    to: DispatcherState,
) -> Result<(), DispatchError> {
    let mut found = from;
    let moved = state.send_if_modified(|state| {
        if *state == from && from.can_transition_to(to) {
            *state = to;
            return true;
        }
        found = *state;
        false
    });
    if !moved {
        return Err(DispatchError::invalid_state(op, found));
    }
    debug!(%from, %to, "dispatcher state changed");
    Ok(())
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let state = self.state();
        // Draining なら drain task が最後まで面倒を見る
        if state == DispatcherState::Running {
            // worker は止まるが、キュー上のタスクは報告されない
            warn!(%state, queued = self.queue.len(), "dispatcher dropped without shutdown");
            self.stop.stop();
        }
    }
}
