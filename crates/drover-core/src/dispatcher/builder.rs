//! DispatcherBuilder - 構築とワイヤリング
//!
//! # Fail-fast 設計
//! - sizing は build() 時に検証し、不正なら ConfigError を返す
//! - Clock / IdGenerator は差し替え可能（テストでは FixedClock）

use std::sync::Arc;

use super::{Dispatcher, DispatcherConfig};
use crate::error::ConfigError;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// Builds a [`Dispatcher`] in the `Created` state.
///
/// # 使用例
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .capacity(2)
///     .workers(1)
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
            clock: None,
            ids: None,
        }
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<Dispatcher, ConfigError> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        // 指定がなければ同じ Clock で ULID を採番する
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        Ok(Dispatcher::from_parts(self.config, clock, ids))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DispatcherState;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn build_validates_sizing() {
        let err = DispatcherBuilder::new().workers(0).build().unwrap_err();
        assert_eq!(err, ConfigError::ZeroWorkers);

        let err = DispatcherBuilder::new().capacity(0).build().unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity);
    }

    #[test]
    fn built_dispatcher_starts_in_created_state() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let dispatcher = DispatcherBuilder::new()
            .capacity(2)
            .workers(1)
            .clock(Arc::new(FixedClock::new(at)))
            .build()
            .unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Created);
        assert_eq!(dispatcher.config(), DispatcherConfig::new(2, 1));
    }
}
