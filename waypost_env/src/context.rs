//! Core environment context trait for Waypost components.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// Abstracts the clock and task spawning so that the animation driver and
/// the event consumers run identically against tokio and against the
/// virtual clock of the simulation harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
#[async_trait]
pub trait WaypostContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Animation progress is always measured against this clock.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    ///
    /// Periodic work spawned here must watch a `CancellationToken` so that
    /// nothing outlives the component that started it.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
