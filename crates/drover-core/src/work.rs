//! Work - 実行単位の抽象化
//!
//! # 学習ポイント
//! - `self: Box<Self>` で一度きりの実行を型で表現（FnOnce と同じ意味）
//! - closure / future を `Work` に包む adapter（type erasure）
//!
//! Work carries its inputs by value. Nothing is borrowed from the submitter,
//! so a loop variable can never be observed after it changed.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Something a worker can execute exactly once.
///
/// # 使用例
/// ```ignore
/// struct Resize { width: u32 }
///
/// #[async_trait]
/// impl Work for Resize {
///     async fn execute(self: Box<Self>) -> Result<Value, String> {
///         Ok(serde_json::json!({ "width": self.width }))
///     }
/// }
/// ```
///
/// Errors are plain strings: they end up inside a
/// [`Failure`](crate::domain::Failure) and never cross the queue boundary as
/// a Rust error.
#[async_trait]
pub trait Work: Send + 'static {
    async fn execute(self: Box<Self>) -> Result<Value, String>;
}

/// Wraps a synchronous closure. The closure runs on a worker, so keep it
/// short or move blocking parts to `spawn_blocking` inside [`from_future`].
pub struct FnWork<F> {
    f: F,
}

#[async_trait]
impl<F> Work for FnWork<F>
where
    F: FnOnce() -> Result<Value, String> + Send + 'static,
{
    async fn execute(self: Box<Self>) -> Result<Value, String> {
        (self.f)()
    }
}

/// Wraps a future that has already captured its inputs.
pub struct FutureWork<Fut> {
    fut: Fut,
}

#[async_trait]
impl<Fut> Work for FutureWork<Fut>
where
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn execute(self: Box<Self>) -> Result<Value, String> {
        self.fut.await
    }
}

/// Wraps a closure that builds its future only when a worker runs it.
pub struct AsyncFnWork<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Work for AsyncFnWork<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn execute(self: Box<Self>) -> Result<Value, String> {
        (self.f)().await
    }
}

pub fn from_fn<F>(f: F) -> FnWork<F>
where
    F: FnOnce() -> Result<Value, String> + Send + 'static,
{
    FnWork { f }
}

pub fn from_future<Fut>(fut: Fut) -> FutureWork<Fut>
where
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    FutureWork { fut }
}

pub fn from_async<F, Fut>(f: F) -> AsyncFnWork<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    AsyncFnWork { f }
}
