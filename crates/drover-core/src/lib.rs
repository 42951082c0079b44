//! drover-core
//!
//! Bounded concurrent task dispatcher plus a shared counter store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskId, Task, TaskResult, DispatcherState）
//! - **ports**: 差し替え可能な依存（Clock, IdGenerator）
//! - **work**: 実行単位の trait と closure adapter
//! - **dispatcher**: bounded queue + worker pool + lifecycle
//! - **tracker**: 未完了数の管理（WaitGroup 相当）
//! - **cancel**: 停止シグナルと deadline
//! - **store**: 並行アクセス可能なカウンタ
//! - **error**: エラー型
//!
//! # 使用例
//! ```ignore
//! let dispatcher = Dispatcher::with_capacity(2, 1)?;
//! let mut results = dispatcher.results()?;
//! dispatcher.start()?;
//! dispatcher.submit(work::from_fn(|| Ok(json!(42))), None).await?;
//! dispatcher.shutdown(Duration::from_secs(1)).await?;
//! while let Some(result) = results.next().await { /* ... */ }
//! ```

pub mod cancel;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod ports;
pub mod store;
pub mod tracker;
pub mod work;

pub use self::cancel::{StopListener, StopSignal};
pub use self::dispatcher::{
    Dispatcher, DispatcherBuilder, DispatcherConfig, DispatcherCounts, ResultStream,
    ShutdownReport,
};
pub use self::domain::{DispatcherState, Failure, FailureKind, Outcome, Task, TaskId, TaskResult};
pub use self::error::{ConfigError, DispatchError};
pub use self::store::SafeStore;
pub use self::tracker::CompletionTracker;
pub use self::work::Work;
