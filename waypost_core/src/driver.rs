//! Async driver that ticks a [`PathAnimator`] on the context clock.
//!
//! Every run owns a [`CancellationSource`]. Starting a new run cancels the
//! previous source before touching the animator, and the tick loop checks
//! its token while holding the animator lock, so at most one loop ever
//! mutates the animator. A cancelled loop wakes from its pause at once
//! instead of sleeping out the period. Dropping the driver cancels the live run.

use crate::animator::{AnimatorPhase, MotionSnapshot, PathAnimator, PathMotion, PathStyle};
use crate::layout::Position;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};
use waypost_env::{CancellationSource, CancellationToken, WaypostContext};

/// Owns an animator and the periodic tasks that advance it.
pub struct AnimationDriver<Ctx: WaypostContext> {
    context: Arc<Ctx>,
    animator: Arc<Mutex<PathAnimator>>,
    current: Option<CancellationSource>,
}

impl<Ctx: WaypostContext> AnimationDriver<Ctx> {
    pub fn new(context: Arc<Ctx>, animator: PathAnimator) -> Self {
        Self {
            context,
            animator: Arc::new(Mutex::new(animator)),
            current: None,
        }
    }

    /// Cancels the live run (if any) and starts a new one from the context clock.
    pub fn move_to(&mut self, from: Position, to: Position) {
        let now = self.context.now();
        self.start_run(from, to, now);
    }

    fn start_run(&mut self, from: Position, to: Position, now: Duration) {
        if let Some(previous) = self.current.take() {
            previous.cancel();
            debug!("animation superseded");
        }

        let source = CancellationSource::new();
        let token = source.token();
        let (tick, decay) = {
            let mut animator = lock(&self.animator);
            animator.move_to(from, to, now);
            (animator.config().tick_period(), animator.config().decay_period())
        };
        debug!(?from, ?to, "animation started");

        self.context.spawn(
            "path-animator",
            drive(self.context.clone(), self.animator.clone(), token, tick, decay),
        );
        self.current = Some(source);
    }

    /// Stops all periodic work for this animator (view teardown).
    pub fn shutdown(&mut self) {
        if let Some(source) = self.current.take() {
            source.cancel();
        }
    }

    pub fn snapshot(&self) -> MotionSnapshot {
        lock(&self.animator).snapshot()
    }

    pub fn phase(&self) -> AnimatorPhase {
        lock(&self.animator).phase()
    }
}

impl<Ctx: WaypostContext> Drop for AnimationDriver<Ctx> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<Ctx: WaypostContext> PathMotion for AnimationDriver<Ctx> {
    fn begin(&mut self, from: Position, to: Position, now: Duration) {
        self.start_run(from, to, now);
    }

    fn park(&mut self, at: Position) {
        self.shutdown();
        lock(&self.animator).park(at);
    }

    fn restyle(&mut self, style: PathStyle) {
        lock(&self.animator).restyle(style);
    }

    fn cursor(&self) -> Position {
        lock(&self.animator).cursor()
    }

    fn is_animating(&self) -> bool {
        lock(&self.animator).is_animating()
    }
}

fn lock(animator: &Mutex<PathAnimator>) -> MutexGuard<'_, PathAnimator> {
    animator.lock().unwrap_or_else(|e| e.into_inner())
}

/// Motion loop followed by the decay loop, both abandoned on cancellation.
async fn drive<Ctx: WaypostContext>(
    context: Arc<Ctx>,
    animator: Arc<Mutex<PathAnimator>>,
    token: CancellationToken,
    tick: Duration,
    decay: Duration,
) {
    loop {
        if !pause(context.as_ref(), &token, tick).await {
            return;
        }
        let phase = {
            let mut guard = lock(&animator);
            if token.is_cancelled() {
                return;
            }
            guard.tick(context.now())
        };
        if phase != AnimatorPhase::Animating {
            break;
        }
    }
    trace!("motion complete, decaying trail");

    loop {
        if !pause(context.as_ref(), &token, decay).await {
            return;
        }
        let phase = {
            let mut guard = lock(&animator);
            if token.is_cancelled() {
                return;
            }
            guard.decay_step()
        };
        if phase != AnimatorPhase::Decaying {
            break;
        }
    }
    trace!("trail drained");
}

/// Sleeps for `period` unless the run is cancelled first. Returns `false` on cancellation.
async fn pause<Ctx: WaypostContext>(context: &Ctx, token: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = context.sleep(period) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::AnimatorConfig;
    use approx::assert_relative_eq;
    use waypost_env::TokioContext;

    fn driver() -> AnimationDriver<TokioContext> {
        AnimationDriver::new(
            TokioContext::shared(),
            PathAnimator::new(AnimatorConfig::linear(), PathStyle::Straight),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_and_decays() {
        let mut driver = driver();
        driver.move_to(Position::new(0.0, 10.0), Position::new(300.0, 10.0));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let mid = driver.snapshot();
        assert_eq!(mid.phase, AnimatorPhase::Animating);
        assert!(mid.cursor.x > 100.0 && mid.cursor.x < 200.0);
        assert!(driver.is_animating());

        tokio::time::sleep(Duration::from_millis(1600)).await;
        let done = driver.snapshot();
        assert_ne!(done.phase, AnimatorPhase::Animating);
        assert_relative_eq!(done.cursor.x, 300.0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let idle = driver.snapshot();
        assert_eq!(idle.phase, AnimatorPhase::Idle);
        assert!(idle.trail.len() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_move_supersedes_running_one() {
        let mut driver = driver();
        driver.move_to(Position::new(0.0, 0.0), Position::new(100.0, 0.0));
        tokio::time::sleep(Duration::from_secs(1)).await;

        driver.move_to(Position::new(500.0, 0.0), Position::new(800.0, 0.0));
        assert!(driver.snapshot().trail.is_empty());

        tokio::time::sleep(Duration::from_millis(3100)).await;
        let snap = driver.snapshot();
        assert_relative_eq!(snap.cursor.x, 800.0);
        // one run's worth of ticks, never the superseded run's points
        assert!(snap.trail.iter().all(|p| p.x >= 500.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticking() {
        let mut driver = driver();
        driver.move_to(Position::new(0.0, 0.0), Position::new(100.0, 0.0));
        tokio::time::sleep(Duration::from_millis(500)).await;
        driver.shutdown();

        let frozen = driver.snapshot();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(driver.snapshot(), frozen);
        assert_eq!(frozen.phase, AnimatorPhase::Animating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_exits_without_waiting_for_tick() {
        // one tick per minute, so only cancellation can end the pause
        let config = AnimatorConfig {
            tick_hz: 1.0 / 60.0,
            ..AnimatorConfig::linear()
        };
        let mut driver = AnimationDriver::new(
            TokioContext::shared(),
            PathAnimator::new(config, PathStyle::Straight),
        );
        driver.move_to(Position::new(0.0, 0.0), Position::new(100.0, 0.0));
        tokio::task::yield_now().await;
        assert_eq!(Arc::strong_count(&driver.animator), 2);

        driver.shutdown();
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        // the loop task has returned and dropped its handle
        assert_eq!(Arc::strong_count(&driver.animator), 1);
    }
}
