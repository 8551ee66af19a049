//! Simulation context implementing WaypostContext for deterministic testing.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use waypost_env::WaypostContext;

/// Simulation context backed by a virtual clock and seeded RNG.
///
/// This implements `WaypostContext` using:
/// - A virtual clock that only moves when advanced (or slept on)
/// - ChaCha8 streams derived from one master seed
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,
}

fn lock(time: &Mutex<u64>) -> MutexGuard<'_, u64> {
    time.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = lock(&self.virtual_time_ns);
        *time = time.saturating_add(duration.as_nanos() as u64);
    }

    /// Moves virtual time forward to `at`. Never goes backwards.
    pub fn advance_to(&self, at: Duration) {
        let mut time = lock(&self.virtual_time_ns);
        *time = (*time).max(at.as_nanos() as u64);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *lock(&self.virtual_time_ns)
    }

    /// Independent RNG stream for one concern (posters, visitor, jitter...).
    ///
    /// Same seed and stream always give the same sequence.
    pub fn rng_stream(&self, stream: u64) -> ChaCha8Rng {
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream;
        ChaCha8Rng::seed_from_u64(combined_seed)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
        }
    }
}

#[async_trait]
impl WaypostContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        // sleeping advances virtual time, then lets other tasks observe it
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = name, "spawning simulated task");
        tokio::spawn(future);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_advance_to_is_monotonic() {
        let ctx = SimContext::new(42);
        ctx.advance_to(Duration::from_secs(3));
        ctx.advance_to(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_rng_streams_deterministic() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        let a: u64 = ctx1.rng_stream(1).gen();
        let b: u64 = ctx2.rng_stream(1).gen();
        assert_eq!(a, b);

        let c: u64 = ctx1.rng_stream(2).gen();
        assert_ne!(a, c);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
        assert_eq!(ctx2.seed(), 42);
    }

    #[tokio::test]
    async fn test_sleep_advances_virtual_time() {
        let ctx = SimContext::new(7);
        ctx.sleep(Duration::from_millis(250)).await;
        assert_eq!(ctx.now(), Duration::from_millis(250));
    }
}
