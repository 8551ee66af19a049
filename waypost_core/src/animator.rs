//! The "MOTION" Engine - cursor animation and fading trail
//!
//! [`PathAnimator`] is a clock-agnostic state machine:
//!
//! ```text
//!   move_to()          progress >= 1        trail <= floor
//! Idle ─────────▶ Animating ─────────▶ Decaying ─────────▶ Idle
//!   ▲                 │  move_to()           │ move_to()
//!   └─────────────────┴──────(restart)───────┘
//! ```
//!
//! Time only enters through the `now` passed to [`PathAnimator::move_to`] and
//! [`PathAnimator::tick`], so the same code is driven by the async
//! [`crate::driver::AnimationDriver`] in production and stepped by hand in
//! tests and the simulator.

use crate::layout::{Position, SpiralGeometry};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Timing and trail parameters for one animator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimatorConfig {
    /// Length of one move in seconds (default: 3.0)
    pub duration_secs: f64,

    /// Motion tick rate in Hz (default: 120)
    pub tick_hz: f64,

    /// Trail decay rate in Hz (default: 100)
    pub decay_hz: f64,

    /// Maximum trail length while moving (default: 120)
    pub trail_capacity: usize,

    /// Decay stops once the trail is this short (default: 2)
    pub decay_floor: usize,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self::linear()
    }
}

impl AnimatorConfig {
    /// Line boards: 3 s moves, 120-point trail.
    pub fn linear() -> Self {
        Self {
            duration_secs: 3.0,
            tick_hz: 120.0,
            decay_hz: 100.0,
            trail_capacity: 120,
            decay_floor: 2,
        }
    }

    /// Pendulum board: slower 3.5 s swings.
    pub fn pendulum() -> Self {
        Self {
            duration_secs: 3.5,
            ..Self::linear()
        }
    }

    /// Spiral board: shorter 60-point trail.
    pub fn spiral() -> Self {
        Self {
            trail_capacity: 60,
            ..Self::linear()
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(f64::EPSILON))
    }

    pub fn decay_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.decay_hz.max(f64::EPSILON))
    }
}

/// Shape of the path between two waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathStyle {
    /// Horizontal slide: `x` interpolated, `y` held at the start value
    Straight,
    /// Along the spiral, interpolating the radial parameter
    Spiral(SpiralGeometry),
}

/// Externally visible phase of an animator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimatorPhase {
    Idle,
    Animating,
    Decaying,
}

#[derive(Debug, Clone, Copy)]
struct AnimationRun {
    style: PathStyle,
    from: Position,
    to: Position,
    from_progress: f64,
    to_progress: f64,
    started_at: Duration,
}

// ============================================================================
// PATH ANIMATOR
// ============================================================================

/// Cursor position plus a bounded trail of recent positions.
#[derive(Debug, Clone)]
pub struct PathAnimator {
    config: AnimatorConfig,
    style: PathStyle,
    phase: AnimatorPhase,
    run: Option<AnimationRun>,
    cursor: Position,
    trail: VecDeque<Position>,
    runs_started: u64,
}

impl PathAnimator {
    pub fn new(config: AnimatorConfig, style: PathStyle) -> Self {
        let capacity = config.trail_capacity;
        Self {
            config,
            style,
            phase: AnimatorPhase::Idle,
            run: None,
            cursor: Position::origin(),
            trail: VecDeque::with_capacity(capacity + 1),
            runs_started: 0,
        }
    }

    /// Starts a new run, replacing whatever was in flight and clearing the trail.
    ///
    /// A zero-length move completes at once: the trail holds the single
    /// target point and the animator goes straight to decay.
    pub fn move_to(&mut self, from: Position, to: Position, now: Duration) {
        self.trail.clear();
        self.runs_started += 1;

        if from == to {
            self.run = None;
            self.cursor = to;
            self.trail.push_back(to);
            self.phase = AnimatorPhase::Decaying;
            return;
        }

        let (from_progress, to_progress) = match self.style {
            PathStyle::Straight => (0.0, 1.0),
            PathStyle::Spiral(geometry) => (geometry.progress_of(from), geometry.progress_of(to)),
        };
        self.run = Some(AnimationRun {
            style: self.style,
            from,
            to,
            from_progress,
            to_progress,
            started_at: now,
        });
        self.phase = AnimatorPhase::Animating;
    }

    /// Advances the motion to `now`, appending the new cursor to the trail.
    ///
    /// No-op unless animating. Returns the phase after the tick.
    pub fn tick(&mut self, now: Duration) -> AnimatorPhase {
        let run = match (self.phase, self.run) {
            (AnimatorPhase::Animating, Some(run)) => run,
            _ => return self.phase,
        };

        let progress = self.progress_at(&run, now);
        self.cursor = self.sample(&run, progress);
        self.trail.push_back(self.cursor);
        while self.trail.len() > self.config.trail_capacity {
            self.trail.pop_front();
        }

        if progress >= 1.0 {
            self.run = None;
            self.phase = AnimatorPhase::Decaying;
        }
        self.phase
    }

    /// Drops the oldest trail point; returns to idle once the floor is reached.
    pub fn decay_step(&mut self) -> AnimatorPhase {
        if self.phase != AnimatorPhase::Decaying {
            return self.phase;
        }
        if self.trail.len() > self.config.decay_floor {
            self.trail.pop_front();
        } else {
            self.phase = AnimatorPhase::Idle;
        }
        self.phase
    }

    /// Puts the cursor somewhere without animating (view mount).
    pub fn park(&mut self, at: Position) {
        self.run = None;
        self.trail.clear();
        self.cursor = at;
        self.phase = AnimatorPhase::Idle;
    }

    /// Replaces the path shape, e.g. after the spiral view is resized.
    ///
    /// A run in flight keeps the shape it started with; the new one applies
    /// from the next [`move_to`](Self::move_to).
    pub fn restyle(&mut self, style: PathStyle) {
        self.style = style;
    }

    fn progress_at(&self, run: &AnimationRun, now: Duration) -> f64 {
        let duration = self.config.duration().as_secs_f64();
        if duration <= 0.0 {
            return 1.0;
        }
        let elapsed = now.saturating_sub(run.started_at).as_secs_f64();
        (elapsed / duration).clamp(0.0, 1.0)
    }

    fn sample(&self, run: &AnimationRun, progress: f64) -> Position {
        match run.style {
            PathStyle::Straight => {
                Position::new(run.from.x + progress * (run.to.x - run.from.x), run.from.y)
            }
            PathStyle::Spiral(geometry) => {
                let s = run.from_progress + (run.to_progress - run.from_progress) * progress;
                geometry.point_at(s)
            }
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn cursor(&self) -> Position {
        self.cursor
    }

    /// Trail points, oldest first.
    pub fn trail(&self) -> impl ExactSizeIterator<Item = &Position> + '_ {
        self.trail.iter()
    }

    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    pub fn phase(&self) -> AnimatorPhase {
        self.phase
    }

    /// True only while moving; taps are accepted again during decay.
    pub fn is_animating(&self) -> bool {
        self.phase == AnimatorPhase::Animating
    }

    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    /// Total runs started over the animator's life.
    pub fn runs_started(&self) -> u64 {
        self.runs_started
    }

    /// Copy of the observable state for the presentation layer.
    pub fn snapshot(&self) -> MotionSnapshot {
        MotionSnapshot {
            cursor: self.cursor,
            trail: self.trail.iter().copied().collect(),
            phase: self.phase,
        }
    }
}

/// Read-only view of an animator at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSnapshot {
    pub cursor: Position,
    pub trail: Vec<Position>,
    pub phase: AnimatorPhase,
}

// ============================================================================
// MOTION SEAM
// ============================================================================

/// What a waypoint view needs from whatever moves its cursor.
///
/// Implemented by [`PathAnimator`] (stepped by the caller) and by
/// [`crate::driver::AnimationDriver`] (self-ticking).
pub trait PathMotion {
    fn begin(&mut self, from: Position, to: Position, now: Duration);
    fn park(&mut self, at: Position);
    fn restyle(&mut self, style: PathStyle);
    fn cursor(&self) -> Position;
    fn is_animating(&self) -> bool;
}

impl PathMotion for PathAnimator {
    fn begin(&mut self, from: Position, to: Position, now: Duration) {
        self.move_to(from, to, now);
    }

    fn park(&mut self, at: Position) {
        PathAnimator::park(self, at);
    }

    fn restyle(&mut self, style: PathStyle) {
        PathAnimator::restyle(self, style);
    }

    fn cursor(&self) -> Position {
        self.cursor
    }

    fn is_animating(&self) -> bool {
        PathAnimator::is_animating(self)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{compute_layout, Bounds, LayoutStyle};
    use approx::assert_relative_eq;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    /// Ticks at the configured rate until the run completes.
    fn run_to_completion(animator: &mut PathAnimator, start: Duration) -> Vec<usize> {
        let period = animator.config().tick_period();
        let mut now = start;
        let mut lengths = Vec::new();
        while animator.phase() == AnimatorPhase::Animating {
            now += period;
            animator.tick(now);
            lengths.push(animator.trail_len());
        }
        lengths
    }

    #[test]
    fn test_straight_endpoints() {
        let mut animator = PathAnimator::new(AnimatorConfig::linear(), PathStyle::Straight);
        let a = Position::new(10.0, 50.0);
        let b = Position::new(410.0, 80.0);

        animator.move_to(a, b, secs(1.0));
        animator.tick(secs(1.0));
        assert_relative_eq!(animator.cursor().x, a.x);

        animator.tick(secs(2.5));
        assert_relative_eq!(animator.cursor().x, 210.0, epsilon = 1e-9);
        // y is held at the start value
        assert_relative_eq!(animator.cursor().y, 50.0);

        assert_eq!(animator.tick(secs(4.0)), AnimatorPhase::Decaying);
        assert_relative_eq!(animator.cursor().x, b.x);
    }

    #[test]
    fn test_trail_capped_and_then_decays() {
        let mut animator = PathAnimator::new(AnimatorConfig::linear(), PathStyle::Straight);
        animator.move_to(Position::new(0.0, 0.0), Position::new(100.0, 0.0), Duration::ZERO);

        let lengths = run_to_completion(&mut animator, Duration::ZERO);
        assert!(lengths.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(*lengths.last().unwrap(), 120);

        let mut previous = animator.trail_len();
        while animator.decay_step() == AnimatorPhase::Decaying {
            assert!(animator.trail_len() < previous);
            previous = animator.trail_len();
        }
        assert_eq!(animator.phase(), AnimatorPhase::Idle);
        assert_eq!(animator.trail_len(), 2);
    }

    #[test]
    fn test_spiral_trail_cap() {
        let bounds = Bounds::new(800.0, 800.0);
        let geometry = SpiralGeometry::for_waypoints(bounds, 80.0);
        let points = compute_layout(7, bounds, 80.0, LayoutStyle::Spiral);
        let mut animator = PathAnimator::new(AnimatorConfig::spiral(), PathStyle::Spiral(geometry));

        animator.move_to(points[2], points[3], Duration::ZERO);
        let lengths = run_to_completion(&mut animator, Duration::ZERO);
        assert_eq!(*lengths.last().unwrap(), 60);
        assert_relative_eq!(animator.cursor().x, points[3].x, epsilon = 1e-9);
        assert_relative_eq!(animator.cursor().y, points[3].y, epsilon = 1e-9);
    }

    #[test]
    fn test_spiral_start_matches_waypoint() {
        let bounds = Bounds::new(800.0, 600.0);
        let geometry = SpiralGeometry::for_waypoints(bounds, 80.0);
        let points = compute_layout(7, bounds, 80.0, LayoutStyle::Spiral);
        let mut animator = PathAnimator::new(AnimatorConfig::spiral(), PathStyle::Spiral(geometry));

        animator.move_to(points[5], points[4], Duration::ZERO);
        animator.tick(Duration::ZERO);
        assert_relative_eq!(animator.cursor().x, points[5].x, epsilon = 1e-9);
        assert_relative_eq!(animator.cursor().y, points[5].y, epsilon = 1e-9);
    }

    #[test]
    fn test_restyle_mid_run_keeps_current_path() {
        let bounds = Bounds::new(800.0, 600.0);
        let geometry = SpiralGeometry::for_waypoints(bounds, 80.0);
        let points = compute_layout(7, bounds, 80.0, LayoutStyle::Spiral);
        let mut animator = PathAnimator::new(AnimatorConfig::spiral(), PathStyle::Spiral(geometry));
        let half = animator.config().duration() / 2;

        animator.move_to(points[5], points[4], Duration::ZERO);
        animator.tick(half);
        animator.restyle(PathStyle::Straight);
        run_to_completion(&mut animator, half);
        // a straight slide would have held y at the start waypoint
        assert_relative_eq!(animator.cursor().x, points[4].x, epsilon = 0.5);
        assert_relative_eq!(animator.cursor().y, points[4].y, epsilon = 0.5);

        let (a, b) = (Position::new(0.0, 10.0), Position::new(100.0, 90.0));
        animator.move_to(a, b, Duration::ZERO);
        animator.tick(half);
        assert_relative_eq!(animator.cursor().y, a.y);
        assert_relative_eq!(animator.cursor().x, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_length_move_completes_immediately() {
        let mut animator = PathAnimator::new(AnimatorConfig::linear(), PathStyle::Straight);
        let p = Position::new(42.0, 7.0);
        animator.move_to(p, p, secs(3.0));

        assert!(!animator.is_animating());
        assert_eq!(animator.phase(), AnimatorPhase::Decaying);
        assert_eq!(animator.trail().copied().collect::<Vec<_>>(), vec![p]);
        assert_eq!(animator.decay_step(), AnimatorPhase::Idle);
    }

    #[test]
    fn test_new_run_replaces_old_and_clears_trail() {
        let mut animator = PathAnimator::new(AnimatorConfig::linear(), PathStyle::Straight);
        animator.move_to(Position::new(0.0, 0.0), Position::new(100.0, 0.0), Duration::ZERO);
        for i in 1..=30 {
            animator.tick(secs(i as f64 / 120.0));
        }
        assert_eq!(animator.trail_len(), 30);

        animator.move_to(Position::new(500.0, 0.0), Position::new(600.0, 0.0), secs(1.0));
        assert_eq!(animator.trail_len(), 0);
        assert_eq!(animator.runs_started(), 2);

        animator.tick(secs(4.0));
        assert_relative_eq!(animator.cursor().x, 600.0);
    }

    #[test]
    fn test_tick_before_start_clamps_to_origin() {
        let mut animator = PathAnimator::new(AnimatorConfig::pendulum(), PathStyle::Straight);
        animator.move_to(Position::new(0.0, 0.0), Position::new(10.0, 0.0), secs(5.0));
        animator.tick(secs(4.0));
        assert_relative_eq!(animator.cursor().x, 0.0);
    }

    #[test]
    fn test_decay_ignored_while_animating() {
        let mut animator = PathAnimator::new(AnimatorConfig::linear(), PathStyle::Straight);
        animator.move_to(Position::new(0.0, 0.0), Position::new(10.0, 0.0), Duration::ZERO);
        animator.tick(secs(0.5));
        assert_eq!(animator.decay_step(), AnimatorPhase::Animating);
        assert_eq!(animator.trail_len(), 1);
    }
}
