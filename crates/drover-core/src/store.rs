//! SafeStore - 並行アクセス可能なカウンタ
//!
//! # 実装詳細
//! - `RwLock<HashMap<String, i64>>`: read は並行、write は排他
//! - parking_lot の lock は poison しないので、全操作が失敗しない
//! - lock は同期区間だけで保持し、await を跨がない

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// String-keyed integer counters, safe under any mix of concurrent calls.
///
/// Every operation on a key is linearizable: increments are never lost and a
/// reader never sees a half-applied write. Cloning yields another handle to
/// the same counters.
#[derive(Debug, Clone, Default)]
pub struct SafeStore {
    counters: Arc<RwLock<HashMap<String, i64>>>,
}

impl SafeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `key` (created at 0 if absent). Returns the new value.
    pub fn increment(&self, key: &str) -> i64 {
        self.add(key, 1)
    }

    /// Add `delta` to `key` (created at 0 if absent). Returns the new value.
    ///
    /// Saturates at `i64::MIN` / `i64::MAX` instead of overflowing.
    pub fn add(&self, key: &str, delta: i64) -> i64 {
        let mut counters = self.counters.write();
        // 既存キーでは String を確保しない
        if let Some(value) = counters.get_mut(key) {
            *value = value.saturating_add(delta);
            return *value;
        }
        counters.insert(key.to_string(), delta);
        delta
    }

    /// Current value, or `None` if the key does not exist.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.counters.read().get(key).copied()
    }

    /// Remove `key`. Returns whether it was present; absent keys are a no-op.
    pub fn delete(&self, key: &str) -> bool {
        self.counters.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }

    /// Consistent copy of every counter, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
