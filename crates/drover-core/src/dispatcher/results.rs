//! Result stream.
//!
//! 閉じるのは作った側（Dispatcher）だけ。worker は送るだけで close しない。

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::TaskResult;

/// Lazy, finite sequence of [`TaskResult`]s.
///
/// Ends exactly when the dispatcher is stopped and every result has been
/// delivered. Not restartable: once it returns `None` it stays exhausted.
/// The channel is unbounded so a slow consumer never stalls the workers.
#[derive(Debug)]
pub struct ResultStream {
    rx: mpsc::UnboundedReceiver<TaskResult>,
}

impl ResultStream {
    pub async fn next(&mut self) -> Option<TaskResult> {
        self.rx.recv().await
    }

    /// Non-blocking poll for an already delivered result.
    pub fn try_next(&mut self) -> Option<TaskResult> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ResultStream {
    type Item = TaskResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Sending half, owned by the dispatcher's bookkeeping.
#[derive(Debug)]
pub(crate) struct ResultSink {
    tx: Mutex<Option<mpsc::UnboundedSender<TaskResult>>>,
}

impl ResultSink {
    pub(crate) fn channel() -> (Self, ResultStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            ResultStream { rx },
        )
    }

    pub(crate) fn emit(&self, result: TaskResult) {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            debug!(task_id = %result.task_id, "result stream already closed");
            return;
        };
        if tx.send(result).is_err() {
            // 誰も読んでいない（ResultStream が drop 済み）
            debug!("result stream has no receiver");
        }
    }

    /// Close the stream. Results already sent stay readable.
    pub(crate) fn close(&self) {
        self.tx.lock().take();
    }
}
