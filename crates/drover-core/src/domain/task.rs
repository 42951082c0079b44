use chrono::{DateTime, Utc};
use std::fmt;

use super::TaskId;
use crate::work::Work;

/// A unit of submitted work plus the metadata the dispatcher assigned to it.
///
/// Immutable once built: the queue owns it until exactly one worker takes it,
/// and the worker consumes it by executing the work.
pub struct Task {
    id: TaskId,
    work: Box<dyn Work>,
    enqueued_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, work: Box<dyn Work>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            work,
            enqueued_at,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    /// Give up ownership of the work so it can be executed.
    pub fn into_work(self) -> Box<dyn Work> {
        self.work
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}
