//! Bounded FIFO queue shared by the submitters and the workers.
//!
//! # 実装詳細
//! - `Mutex<QueueState>`: ready キューと closed フラグ（同期区間のみでロック）
//! - `Semaphore`: 空きスロット数。submit 側は permit を取ってから push する
//! - `Notify`: push / close 時に待機中の worker を起こす
//!
//! A slot is taken from the semaphore before a task is pushed and handed back
//! when a worker pops it, so at most `capacity` tasks are ever queued.
//! Closing the queue also closes the semaphore, which releases every
//! submitter blocked on a full queue.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, SemaphorePermit, TryAcquireError};

use crate::domain::Task;

struct QueueState {
    ready: VecDeque<Task>,
    closed: bool,
}

/// Why a slot could not be reserved right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReserveError {
    Full,
    Closed,
}

pub(crate) struct TaskQueue {
    state: Mutex<QueueState>,
    slots: Semaphore,
    notify: Notify,
    capacity: usize,
}

impl TaskQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            slots: Semaphore::new(capacity),
            notify: Notify::new(),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Wait for a free slot. Fails once the queue is closed.
    ///
    /// Cancel-safe: dropping the future before it resolves takes nothing.
    pub(crate) async fn reserve(&self) -> Result<Slot<'_>, ReserveError> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| ReserveError::Closed)?;
        Ok(Slot {
            queue: self,
            permit,
        })
    }

    pub(crate) fn try_reserve(&self) -> Result<Slot<'_>, ReserveError> {
        let permit = self.slots.try_acquire().map_err(|err| match err {
            TryAcquireError::NoPermits => ReserveError::Full,
            TryAcquireError::Closed => ReserveError::Closed,
        })?;
        Ok(Slot {
            queue: self,
            permit,
        })
    }

    /// Take the oldest task, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and nothing is left.
    /// Cancel-safe: a task is only removed right before returning it.
    pub(crate) async fn pop(&self) -> Option<Task> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // 先に waiter 登録してから状態を見る（close の通知を取りこぼさない）
            notified.as_mut().enable();

            let popped = {
                let mut state = self.state.lock();
                match state.ready.pop_front() {
                    Some(task) => Some(Some(task)),
                    None if state.closed => Some(None),
                    None => None,
                }
            };

            match popped {
                Some(Some(task)) => {
                    self.slots.add_permits(1);
                    return Some(task);
                }
                Some(None) => return None,
                None => notified.await,
            }
        }
    }

    /// Stop accepting tasks and wake every waiter. Queued tasks stay
    /// poppable. Idempotent.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.slots.close();
        self.notify.notify_waiters();
    }

    /// Remove everything still queued.
    pub(crate) fn drain(&self) -> Vec<Task> {
        self.state.lock().ready.drain(..).collect()
    }
}

/// A reserved queue slot. Dropping it without pushing gives the slot back.
pub(crate) struct Slot<'a> {
    queue: &'a TaskQueue,
    permit: SemaphorePermit<'a>,
}

impl Slot<'_> {
    /// Enqueue `task` into the reserved slot. Hands the task back if the
    /// queue was closed after the slot was reserved.
    pub(crate) fn push(self, task: Task) -> Result<(), Task> {
        let Slot { queue, permit } = self;
        {
            let mut state = queue.state.lock();
            if state.closed {
                return Err(task);
            }
            state.ready.push_back(task);
        }
        // スロットは pop 側で add_permits して返す
        permit.forget();
        queue.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use crate::work;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use ulid::Ulid;

    fn task() -> Task {
        Task::new(
            TaskId::from_ulid(Ulid::new()),
            Box::new(work::from_fn(|| Ok(serde_json::json!(null)))),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn push_pop_is_fifo() {
        let queue = TaskQueue::new(4);
        let first = task();
        let second = task();
        let (id1, id2) = (first.id(), second.id());

        queue.reserve().await.unwrap().push(first).unwrap();
        queue.reserve().await.unwrap().push(second).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().await.unwrap().id(), id1);
        assert_eq!(queue.pop().await.unwrap().id(), id2);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn try_reserve_reports_full_queue() {
        let queue = TaskQueue::new(1);
        queue.try_reserve().unwrap().push(task()).unwrap();
        assert!(matches!(queue.try_reserve(), Err(ReserveError::Full)));

        queue.pop().await.unwrap();
        assert!(queue.try_reserve().is_ok());
    }

    #[tokio::test]
    async fn dropped_slot_is_returned() {
        let queue = TaskQueue::new(1);
        let slot = queue.try_reserve().unwrap();
        drop(slot);
        assert!(queue.try_reserve().is_ok());
    }

    #[tokio::test]
    async fn reserve_blocks_until_a_worker_pops() {
        let queue = Arc::new(TaskQueue::new(1));
        queue.reserve().await.unwrap().push(task()).unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), queue.reserve()).await;
        assert!(blocked.is_err());

        let popper = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                queue.pop().await
            })
        };

        let slot = tokio::time::timeout(Duration::from_secs(1), queue.reserve())
            .await
            .unwrap();
        assert!(slot.is_ok());
        assert!(popper.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn close_releases_blocked_reserve_and_pop() {
        let queue = Arc::new(TaskQueue::new(1));
        queue.reserve().await.unwrap().push(task()).unwrap();

        let submitter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.reserve().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        assert_eq!(submitter.await.unwrap(), Err(ReserveError::Closed));

        // 残っているタスクは close 後も取り出せる
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn close_wakes_idle_workers() {
        let queue = Arc::new(TaskQueue::new(1));
        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        let exited = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
        assert!(exited);
    }

    #[tokio::test]
    async fn push_after_close_hands_the_task_back() {
        let queue = TaskQueue::new(2);
        let slot = queue.try_reserve().unwrap();
        queue.close();
        let t = task();
        let id = t.id();
        let rejected = slot.push(t).unwrap_err();
        assert_eq!(rejected.id(), id);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn drain_empties_the_queue() {
        let queue = TaskQueue::new(3);
        for _ in 0..3 {
            queue.try_reserve().unwrap().push(task()).unwrap();
        }
        queue.close();
        assert_eq!(queue.drain().len(), 3);
        assert!(queue.pop().await.is_none());
    }
}
