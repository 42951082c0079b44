//! Dispatcher sizing.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Queue capacity (N) and worker count (W).
///
/// Both must be at least 1. Missing fields fall back to the defaults when
/// deserialized, so `{"workers": 8}` is a valid config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of queued (not yet started) tasks.
    pub capacity: usize,

    /// Number of long-lived workers spawned by `start()`.
    pub workers: usize,
}

impl DispatcherConfig {
    pub fn new(capacity: usize, workers: usize) -> Self {
        Self { capacity, workers }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            workers: 4,
        }
    }
}
