//! Dispatcher lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a [`Dispatcher`](crate::dispatcher::Dispatcher).
///
/// State transitions (linear, no cycles, no skipping):
/// - Created -> Running (`start`)
/// - Running -> Draining (`shutdown` begins)
/// - Draining -> Stopped (workers exited or were abandoned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl DispatcherState {
    /// The only state this one may move to, if any.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::Running),
            Self::Running => Some(Self::Draining),
            Self::Draining => Some(Self::Stopped),
            Self::Stopped => None,
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.successor() == Some(next)
    }

    pub fn accepts_work(self) -> bool {
        self == Self::Running
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
