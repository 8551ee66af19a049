//! Cooperative cancellation for periodic background work.
//!
//! A [`CancellationSource`] is held by the component that started a task;
//! the task receives a [`CancellationToken`] and stops at its next tick once
//! the source is cancelled. Each animation run gets a fresh pair, so
//! superseding a run is "cancel the old source, create a new one".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct CancellationInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// The control handle that triggers cancellation.
///
/// Dropping the source does **not** cancel its tokens; call
/// [`cancel`](Self::cancel) explicitly.
pub struct CancellationSource {
    inner: Arc<CancellationInner>,
}

/// A cloneable view of a [`CancellationSource`].
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationInner>,
}

impl CancellationSource {
    /// Creates a new source with an uncancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Obtains a token observing this source.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Signals cancellation and wakes every pending [`CancellationToken::cancelled`].
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Returns `true` if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once the source is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel cannot be missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_starts_uncancelled() {
        let source = CancellationSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());
        assert!(!source.is_cancelled());
    }

    #[test]
    fn test_cancel_propagates_to_all_clones() {
        let source = CancellationSource::new();
        let t1 = source.token();
        let t2 = t1.clone();
        source.cancel();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[test]
    fn test_drop_source_does_not_cancel() {
        let source = CancellationSource::new();
        let token = source.token();
        drop(source);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let source = CancellationSource::new();
        let token = source.token();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::task::yield_now().await;
        source.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let source = CancellationSource::new();
        source.cancel();
        source.token().cancelled().await;
    }
}
