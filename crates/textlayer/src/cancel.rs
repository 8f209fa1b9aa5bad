//! Cooperative cancellation.
//!
//! A [`CancelToken`] is cloned into every stage; loop heads and recognizer
//! call sites check it with [`CancelToken::bail`]. Cancellation is
//! observed, never preemptive: in-flight work settles before the page task
//! returns [`TextlayerError::Aborted`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use crate::error::{Result, TextlayerError};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation signal shared across a page task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent; wakes every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(Aborted)` once cancellation has been signalled.
    pub fn bail(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TextlayerError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Resolve when cancellation is signalled. Used with `tokio::select!`
    /// to abandon a pending recognizer call.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before the flag re-check so a cancel racing this call
        // cannot slip between the check and the await.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}
