//! Cancellation - 停止シグナルと deadline
//!
//! - `StopSignal`: dispatcher ごとに 1 つ。watch channel で全 worker に broadcast
//! - `with_deadline`: blocking 操作に上限時間を付ける
//!
//! Cancellation is cooperative. Workers look at the signal before pulling a
//! task and before starting it. Work that already started is never
//! interrupted: the worker stops waiting for it, reports it cancelled and
//! leaves it to finish detached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::DispatchError;

/// Broadcast stop signal. Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Idempotent; returns `true` only for the call that
    /// actually raised it.
    pub fn stop(&self) -> bool {
        // send_replace は receiver がいなくても値を保存する
        !self.tx.send_replace(true)
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side handed to each worker.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is raised. A dropped [`StopSignal`] counts as
    /// raised: nobody is left who could ever lower it again.
    ///
    /// Cancel-safe, so it can sit in a `select!` arm.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Run `fut` with an optional upper bound.
///
/// On expiry the future is dropped and [`DispatchError::Timeout`] is
/// returned. `fut` is polled once before the deadline is checked, so a zero
/// deadline still succeeds when the result is already available.
pub async fn with_deadline<F>(deadline: Option<Duration>, fut: F) -> Result<F::Output, DispatchError>
where
    F: Future,
{
    match deadline {
        None => Ok(fut.await),
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| DispatchError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_is_idempotent() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
        assert!(signal.stop());
        assert!(!signal.stop());
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn listeners_created_before_and_after_stop_both_observe_it() {
        let signal = StopSignal::new();
        let early = signal.listener();

        let waiter = tokio::spawn(async move { early.stopped().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        let late = signal.listener();
        assert!(late.is_stopped());
        tokio::time::timeout(Duration::from_millis(100), late.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_signal_releases_listeners() {
        let signal = StopSignal::new();
        let listener = signal.listener();
        drop(signal);
        tokio::time::timeout(Duration::from_millis(100), listener.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn with_deadline_times_out_pending_futures() {
        let err = with_deadline(Some(Duration::from_millis(20)), std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn with_deadline_zero_still_returns_ready_values() {
        let value = with_deadline(Some(Duration::ZERO), async { 5 }).await.unwrap();
        assert_eq!(value, 5);
        let value = with_deadline(None, async { 6 }).await.unwrap();
        assert_eq!(value, 6);
    }
}
