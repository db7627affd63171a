//! Per-call cancellation
//!
//! A [`CallContext`] is handed to every upload, delete and read. It is
//! cancelled by its [`CancelHandle`]; the server holds one handle and fires
//! it when the shutdown grace period runs out.

use std::future::Future;
use tokio::sync::watch;

/// Cancellation signal shared by the calls of one server
#[derive(Debug, Clone)]
pub struct CallContext {
    cancelled: watch::Receiver<bool>,
}

/// Cancels every [`CallContext`] cloned from the pair it was created with
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CallContext {
    /// Create a context together with the handle that cancels it
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { cancelled: rx }, CancelHandle { tx })
    }

    /// A context that is never cancelled
    pub fn background() -> Self {
        // Dropping the sender leaves the value at `false` forever.
        let (ctx, _handle) = Self::with_cancel();
        ctx
    }

    /// Check whether the context has already been cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolve once the context is cancelled. Pends forever for a
    /// context whose handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `fut` to completion unless the context is cancelled first.
    ///
    /// Returns `None` on cancellation; `fut` is dropped at that point.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl CancelHandle {
    /// Cancel all contexts tied to this handle
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}
