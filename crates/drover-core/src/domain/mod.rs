//! Domain model (ids, tasks, results, lifecycle).

pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use ids::TaskId;
pub use outcome::{Failure, FailureKind, Outcome, TaskResult};
pub use state::DispatcherState;
pub use task::Task;
