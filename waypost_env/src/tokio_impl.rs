//! Production implementation of WaypostContext using Tokio.

use crate::WaypostContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Production context backed by the Tokio clock.
///
/// Uses `tokio::time::Instant` so that a paused test runtime drives
/// `now()` and `sleep()` from the same clock.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaypostContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.to_string();
        tokio::spawn(async move {
            future.await;
            drop(name);
        });
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}
