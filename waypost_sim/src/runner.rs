//! Scenario runner - executes deterministic test scenarios.
//!
//! Anchor scenarios replay an oracle-scripted provider feed through an
//! [`ExperienceRuntime`] on the virtual clock. Board scenarios step
//! [`ProgressionPanel`]s millisecond by millisecond with a scripted visitor,
//! ticking each animator at its own rate.

use crate::context::SimContext;
use crate::exporter::{AnchorFrame, BoardFrame, SimEvent, SimExport, SimFrame};
use crate::oracle::{merge, PosterOracle, TimedEvent};
use crate::scenarios::ScenarioId;

use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use waypost_core::anchors::AnchorError;
use waypost_core::prompts::{movement_label, pendulum_prompts};
use waypost_core::runtime::RuntimeError;
use waypost_core::scene::EntityKind;
use waypost_core::view::ViewError;
use waypost_core::{
    AnchorEvent, AnchorOutcome, AnimatorPhase, AttachmentSource, Bounds, ExhibitKind, ExperienceRuntime, PathAnimator,
    Progression, ProgressionPanel, RuntimeConfig, RuntimeEvent, Sequence, SequenceError, Step,
};
use waypost_env::WaypostContext;

/// Base simulation step for board scenarios.
const STEP: Duration = Duration::from_millis(1);

/// Board steps between exported frames.
const EXPORT_EVERY: u64 = 100;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Simulation steps executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Live anchors at the end
    pub final_anchor_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Provider events delivered
    pub anchor_events: u64,

    pub anchors_created: u64,

    pub anchors_removed: u64,

    /// Stale or duplicate events ignored
    pub events_ignored: u64,

    /// Taps that advanced a sequence
    pub taps_accepted: u64,

    /// Taps refused (moving, not armed, boundary)
    pub taps_refused: u64,

    /// Animation runs started across all boards
    pub runs_started: u64,

    /// Longest trail observed
    pub max_trail_len: usize,
}

/// Why a scenario failed.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("runtime failure: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("anchor failure: {0}")]
    Anchor(#[from] AnchorError),

    #[error("sequence failure: {0}")]
    Sequence(#[from] SequenceError),
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        Err(ScenarioError::Invariant(message()))
    }
}

/// Per-run bookkeeping shared by all scenarios.
struct Recorder<'a> {
    export: Option<&'a mut SimExport>,
    metrics: ScenarioMetrics,
    ticks: u64,
}

impl Recorder<'_> {
    fn wants_frame(&self) -> bool {
        self.export.is_some() && self.ticks % EXPORT_EVERY == 0
    }

    fn push(&mut self, frame: SimFrame) {
        if let Some(export) = self.export.as_deref_mut() {
            export.add_frame(frame);
        }
    }
}

// ============================================================================
// BOARD CLOCK
// ============================================================================

/// Ticks every animator of a panel at its configured rates and checks the
/// trail contract on every step.
struct BoardClock {
    due: Vec<Duration>,
    runs: Vec<u64>,
}

impl BoardClock {
    /// Runs already started at mount count towards `metrics`.
    fn new(panel: &ProgressionPanel<PathAnimator>, now: Duration, metrics: &mut ScenarioMetrics) -> Self {
        let views = panel.views();
        metrics.runs_started += views.iter().map(|v| v.motion().runs_started()).sum::<u64>();
        Self {
            due: views
                .iter()
                .map(|v| now + v.motion().config().tick_period())
                .collect(),
            runs: views.iter().map(|v| v.motion().runs_started()).collect(),
        }
    }

    fn advance(
        &mut self,
        panel: &mut ProgressionPanel<PathAnimator>,
        now: Duration,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), ScenarioError> {
        for (i, view) in panel.views_mut().iter_mut().enumerate() {
            let animator = view.motion_mut();
            let config = animator.config().clone();

            if animator.runs_started() != self.runs[i] {
                metrics.runs_started += animator.runs_started() - self.runs[i];
                self.runs[i] = animator.runs_started();
                self.due[i] = now + config.tick_period();
            }

            while animator.phase() != AnimatorPhase::Idle && self.due[i] <= now {
                let before = animator.trail_len();
                match animator.phase() {
                    AnimatorPhase::Animating => {
                        animator.tick(self.due[i]);
                        ensure(animator.trail_len() >= before, || {
                            format!("board {i}: trail shrank while animating")
                        })?;
                        self.due[i] += config.tick_period();
                    }
                    AnimatorPhase::Decaying => {
                        let phase = animator.decay_step();
                        if phase == AnimatorPhase::Decaying {
                            ensure(animator.trail_len() < before, || {
                                format!("board {i}: trail did not shrink while decaying")
                            })?;
                        } else {
                            ensure(animator.trail_len() <= config.decay_floor, || {
                                format!("board {i}: idle with {} trail points", animator.trail_len())
                            })?;
                        }
                        self.due[i] += config.decay_period();
                    }
                    AnimatorPhase::Idle => {}
                }

                let len = animator.trail_len();
                ensure(len <= config.trail_capacity, || {
                    format!("board {i}: trail {len} over capacity {}", config.trail_capacity)
                })?;
                metrics.max_trail_len = metrics.max_trail_len.max(len);
            }
        }
        Ok(())
    }
}

// ============================================================================
// VISITOR
// ============================================================================

/// Taps the armed waypoint after a human reaction delay.
struct Visitor {
    rng: ChaCha8Rng,
    reaction_secs: (f64, f64),
    tap_at: Option<Duration>,
}

impl Visitor {
    fn new(rng: ChaCha8Rng) -> Self {
        Self {
            rng,
            reaction_secs: (0.2, 1.5),
            tap_at: None,
        }
    }

    fn max_reaction(&self) -> f64 {
        self.reaction_secs.1
    }

    /// Returns true when it is time to tap.
    fn ready(&mut self, armed: bool, now: Duration) -> bool {
        match self.tap_at {
            None => {
                if armed {
                    let (lo, hi) = self.reaction_secs;
                    self.tap_at = Some(now + Duration::from_secs_f64(self.rng.gen_range(lo..hi)));
                }
                false
            }
            Some(at) if now >= at => {
                self.tap_at = None;
                true
            }
            Some(_) => false,
        }
    }
}

fn armed_view(panel: &ProgressionPanel<PathAnimator>) -> Option<usize> {
    let pointer = panel.sequence().pointer();
    let view = panel.view_for(pointer)?;
    let armed = !panel.is_animating() && panel.views()[view].armed(pointer, panel.sequence());
    armed.then_some(view)
}

/// Checks the sequence invariants that hold for every progression.
fn check_sequence(sequence: &Sequence, before: &[i32]) -> Result<(), ScenarioError> {
    let (lo, hi) = sequence.progression().range();
    let pointer = sequence.pointer();
    ensure((lo..=hi).contains(&pointer), || {
        format!("pointer {pointer} outside [{lo}, {hi}]")
    })?;

    let visited: Vec<i32> = sequence.visited().collect();
    ensure(before.iter().all(|id| visited.contains(id)), || {
        "visited set shrank".to_string()
    })?;
    ensure(visited.windows(2).all(|w| w[0] < w[1]), || {
        "visited not sorted".to_string()
    })?;
    if let Progression::Linear { start, .. } = sequence.progression() {
        let expected: Vec<i32> = (start..=pointer).collect();
        ensure(visited == expected, || {
            format!("linear visited {visited:?} != {expected:?}")
        })?;
    }
    Ok(())
}

fn board_frame(panel: &ProgressionPanel<PathAnimator>, now: Duration) -> SimFrame {
    let mut frame = SimFrame::new(now.as_secs_f64());
    frame.boards = panel
        .views()
        .iter()
        .enumerate()
        .map(|(i, view)| BoardFrame::capture(i, view, panel.sequence()))
        .collect();
    frame
}

// ============================================================================
// RUNNER
// ============================================================================

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Experience configuration for anchor scenarios
    config: RuntimeConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_duration_secs: 60.0,
            config: RuntimeConfig::default(),
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Uses a custom experience configuration.
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_inner(scenario, None)
    }

    /// Runs a scenario, recording frames into `export`.
    pub fn run_with_export(&self, scenario: ScenarioId, export: &mut SimExport) -> ScenarioResult {
        let result = self.run_inner(scenario, Some(&mut *export));
        export.finalize(result.passed, result.failure_reason.clone());
        result
    }

    fn run_inner(&self, scenario: ScenarioId, export: Option<&mut SimExport>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("{}", scenario.description());

        let context = SimContext::shared(self.seed);
        let mut rec = Recorder {
            export,
            metrics: ScenarioMetrics::default(),
            ticks: 0,
        };

        let outcome = match scenario {
            ScenarioId::GalleryWalk => self.run_gallery_walk(&context, &mut rec),
            ScenarioId::Resighting => self.run_resighting(&context, &mut rec),
            ScenarioId::StaleEvents => self.run_stale_events(&context, &mut rec),
            ScenarioId::FlowSequence => self.run_flow_sequence(&context, &mut rec),
            ScenarioId::PendulumSwing => self.run_pendulum_swing(&context, &mut rec),
            ScenarioId::SpiralSweep => self.run_spiral_sweep(&context, &mut rec),
            ScenarioId::RapidTaps => self.run_rapid_taps(&context, &mut rec),
        };

        let (final_anchor_count, failure_reason) = match outcome {
            Ok(anchors) => (anchors, None),
            Err(e) => {
                warn!("{} failed: {}", scenario.name(), e);
                (0, Some(e.to_string()))
            }
        };

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            total_ticks: rec.ticks,
            final_time_secs: context.now().as_secs_f64(),
            final_anchor_count,
            failure_reason,
            metrics: rec.metrics,
        }
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_duration_secs.max(1.0))
    }

    fn physics_seed(&self) -> u64 {
        self.seed.wrapping_mul(0x9e3779b97f4a7c15)
    }

    // ========================================================================
    // ANCHOR SCENARIOS
    // ========================================================================

    fn new_runtime(&self, context: &Arc<SimContext>) -> ExperienceRuntime<SimContext> {
        let mut runtime = ExperienceRuntime::new(Arc::clone(context), self.config.clone());
        runtime.register_default_panels();
        runtime
    }

    /// Feeds `feed` in order, checking the scene after every event.
    fn replay(
        &self,
        context: &SimContext,
        runtime: &mut ExperienceRuntime<SimContext>,
        feed: Vec<TimedEvent>,
        rec: &mut Recorder<'_>,
    ) -> Result<Vec<AnchorOutcome>, ScenarioError> {
        let mut outcomes = Vec::with_capacity(feed.len());
        for timed in feed {
            context.advance_to(timed.at);
            let outcome = runtime.apply_anchor_event(timed.event)?;
            outcomes.push(outcome);
            rec.ticks += 1;
            rec.metrics.anchor_events += 1;
            check_anchor_table(runtime)?;

            if rec.wants_frame() {
                let mut frame = SimFrame::new(context.now().as_secs_f64());
                frame.anchors = anchor_frames(runtime);
                frame.events.push(SimEvent::info(format!("{outcome:?}")));
                rec.push(frame);
            }
        }

        let stats = runtime.stats();
        rec.metrics.anchors_created = stats.created;
        rec.metrics.anchors_removed = stats.removed;
        rec.metrics.events_ignored = stats.ignored;
        Ok(outcomes)
    }

    /// WP-001: several posters seen with overlapping windows.
    ///
    /// **Assertion**: one entity per live anchor at every step; nothing but the
    /// free panels left once every poster is gone.
    fn run_gallery_walk(&self, context: &Arc<SimContext>, rec: &mut Recorder<'_>) -> Result<usize, ScenarioError> {
        info!("WP-001: GalleryWalk");
        let mut runtime = self.new_runtime(context);
        let mut oracle = PosterOracle::new(self.physics_seed());
        let d = self.duration().as_secs_f64();

        let mut feeds = Vec::new();
        for i in 0..3 {
            let id = oracle.spawn_poster(Vector3::new(i as f32 * 2.0, 1.5, -1.0));
            let start = Duration::from_secs_f64(d * i as f64 / 4.0);
            let end = Duration::from_secs_f64(d * (i as f64 / 4.0 + 0.5));
            feeds.push(oracle.sighting(&id, start, end));
        }
        let mut feed = merge(feeds);

        // show the flow exhibit as soon as the first poster appears
        let split = feed
            .iter()
            .position(|e| matches!(e.event, AnchorEvent::Added(_)))
            .map(|i| i + 1)
            .unwrap_or(0);
        let rest = feed.split_off(split);
        self.replay(context, &mut runtime, feed, rec)?;
        runtime.dispatch(RuntimeEvent::SelectExhibit(ExhibitKind::Flow))?;
        if let Some(slots) = runtime.anchors().latest_slots() {
            let flow = runtime.scene().get(slots.flow).map(|n| n.translation());
            ensure(flow == Some(runtime.selector().positions().home(ExhibitKind::Flow)), || {
                format!("flow slot not at home after selection: {flow:?}")
            })?;
        }
        self.replay(context, &mut runtime, rest, rec)?;

        ensure(runtime.anchors().is_empty(), || {
            format!("{} anchors left after every poster was removed", runtime.anchors().len())
        })?;
        ensure(rec.metrics.anchors_created == 3 && rec.metrics.anchors_removed == 3, || {
            format!(
                "created {} / removed {} (expected 3 / 3)",
                rec.metrics.anchors_created, rec.metrics.anchors_removed
            )
        })?;
        check_panels_free(&runtime)?;
        Ok(runtime.anchors().len())
    }

    /// WP-002: the same poster lost and found five times.
    ///
    /// **Assertion**: every sighting gets a brand-new entity; none survives its removal.
    fn run_resighting(&self, context: &Arc<SimContext>, rec: &mut Recorder<'_>) -> Result<usize, ScenarioError> {
        info!("WP-002: Resighting");
        let mut runtime = self.new_runtime(context);
        let mut oracle = PosterOracle::new(self.physics_seed());
        let id = oracle.spawn_poster(Vector3::new(0.0, 1.5, -1.5));

        let segment = self.duration().as_secs_f64() / 5.0;
        let feeds = (0..5)
            .map(|k| {
                let start = Duration::from_secs_f64(segment * k as f64);
                let end = Duration::from_secs_f64(segment * (k as f64 + 0.8));
                oracle.sighting(&id, start, end)
            })
            .collect();

        let outcomes = self.replay(context, &mut runtime, merge(feeds), rec)?;
        let created: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                AnchorOutcome::Created { entity } => Some(*entity),
                _ => None,
            })
            .collect();

        ensure(created.len() == 5, || format!("{} creations, expected 5", created.len()))?;
        let distinct: HashSet<_> = created.iter().collect();
        ensure(distinct.len() == created.len(), || "entity reused across sightings".to_string())?;
        ensure(created.iter().all(|e| !runtime.scene().contains(*e)), || {
            "entity outlived its anchor".to_string()
        })?;
        check_panels_free(&runtime)?;
        Ok(runtime.anchors().len())
    }

    /// WP-003: stale reports mixed into two live feeds.
    ///
    /// **Assertion**: every stale report is ignored and leaves no trace.
    fn run_stale_events(&self, context: &Arc<SimContext>, rec: &mut Recorder<'_>) -> Result<usize, ScenarioError> {
        info!("WP-003: StaleEvents");
        let mut runtime = self.new_runtime(context);
        let mut oracle = PosterOracle::new(self.physics_seed());
        let d = self.duration();

        let a = oracle.spawn_poster(Vector3::new(-1.0, 1.5, -1.0));
        let b = oracle.spawn_poster(Vector3::new(1.0, 1.5, -1.0));
        let feed_a = oracle.sighting(&a, Duration::ZERO, d.mul_f64(0.6));
        let feed_b = oracle.sighting(&b, d.mul_f64(0.3), d.mul_f64(0.9));

        let live = feed_a.len() + feed_b.len();
        let stale_count = (live as f64 * 0.3).ceil() as usize;
        let stale = oracle.stale_events(stale_count, Duration::ZERO, d);

        // a late duplicate removal of `a` and an early update of `b`
        let mut extra = Vec::new();
        if let (Some(removal), Some(update)) = (feed_a.last().cloned(), feed_b.get(1).cloned()) {
            extra.push(TimedEvent {
                at: removal.at + Duration::from_millis(5),
                event: removal.event,
            });
            extra.push(TimedEvent {
                at: Duration::ZERO,
                event: update.event,
            });
        }
        let expected_ignored = (stale_count + extra.len()) as u64;

        self.replay(context, &mut runtime, merge(vec![feed_a, feed_b, stale, extra]), rec)?;

        ensure(rec.metrics.events_ignored == expected_ignored, || {
            format!(
                "{} events ignored, expected {}",
                rec.metrics.events_ignored, expected_ignored
            )
        })?;
        ensure(runtime.anchors().is_empty(), || "anchors left behind".to_string())?;
        check_panels_free(&runtime)?;
        Ok(runtime.anchors().len())
    }

    // ========================================================================
    // BOARD SCENARIOS
    // ========================================================================

    /// WP-004: walk the eight flow waypoints to the end.
    ///
    /// **Assertion**: pointer and visited move in lockstep; the cursor hands
    /// over between boards; a tap past the last waypoint changes nothing.
    fn run_flow_sequence(&self, context: &Arc<SimContext>, rec: &mut Recorder<'_>) -> Result<usize, ScenarioError> {
        info!("WP-004: FlowSequence");
        let mut panel = ProgressionPanel::flow()?;
        panel.mount(Bounds::new(2720.0, 876.0), context.now());
        let mut clock = BoardClock::new(&panel, context.now(), &mut rec.metrics);
        let mut visitor = Visitor::new(context.rng_stream(1));
        let duration = self.duration();
        let move_secs = panel.views()[0].motion().config().duration_secs;
        let mut boundary_hit = false;

        while context.now() < duration {
            context.advance_time(STEP);
            let now = context.now();
            rec.ticks += 1;
            clock.advance(&mut panel, now, &mut rec.metrics)?;

            if !boundary_hit && visitor.ready(armed_view(&panel).is_some(), now) {
                let before: Vec<i32> = panel.sequence().visited().collect();
                let pointer = panel.sequence().pointer();
                let view = panel.view_for(pointer).unwrap_or(0);
                match panel.tap(view, pointer, now) {
                    Ok(step) => {
                        rec.metrics.taps_accepted += 1;
                        ensure(step.to == step.from + 1, || format!("non-monotonic step {step:?}"))?;
                        debug!("flow advanced to {}", step.to);
                    }
                    Err(ViewError::Sequence(SequenceError::AtBoundary { pointer: at })) => {
                        rec.metrics.taps_refused += 1;
                        ensure(panel.sequence().pointer() == at, || "boundary tap moved pointer".to_string())?;
                        ensure(!panel.is_animating(), || "boundary tap started a run".to_string())?;
                        boundary_hit = true;
                        info!("flow boundary reached at {at}");
                    }
                    Err(e) => {
                        rec.metrics.taps_refused += 1;
                        debug!("tap refused: {e}");
                    }
                }
                check_sequence(panel.sequence(), &before)?;

                let pointer = panel.sequence().pointer();
                let visible: Vec<bool> = panel.views().iter().map(|v| v.cursor_visible(panel.sequence())).collect();
                ensure(visible.iter().filter(|v| **v).count() == 1, || {
                    format!("cursor visible on {visible:?} for pointer {pointer}")
                })?;
            }

            if rec.wants_frame() {
                rec.push(board_frame(&panel, now));
            }
        }

        // entry move plus seven advances, each followed by a reaction delay
        let needed = 9.0 * (move_secs + visitor.max_reaction()) + 1.0;
        if self.max_duration_secs >= needed {
            ensure(boundary_hit, || {
                format!("never reached the end, pointer {}", panel.sequence().pointer())
            })?;
        }
        ensure(rec.metrics.taps_accepted >= 1, || "no tap ever accepted".to_string())?;
        Ok(0)
    }

    /// WP-005: swing the pendulum back and forth.
    ///
    /// **Assertion**: strict alternation, one movement per tap, cursor on the
    /// target waypoint after every swing.
    fn run_pendulum_swing(&self, context: &Arc<SimContext>, rec: &mut Recorder<'_>) -> Result<usize, ScenarioError> {
        info!("WP-005: PendulumSwing");
        let mut panel = ProgressionPanel::pendulum()?;
        panel.mount(Bounds::new(6800.0, 1776.0), context.now());
        let mut clock = BoardClock::new(&panel, context.now(), &mut rec.metrics);
        let mut visitor = Visitor::new(context.rng_stream(2));
        let duration = self.duration();
        let mut last_step: Option<Step> = None;

        while context.now() < duration {
            context.advance_time(STEP);
            let now = context.now();
            rec.ticks += 1;
            let was_animating = panel.is_animating();
            clock.advance(&mut panel, now, &mut rec.metrics)?;

            if was_animating && !panel.is_animating() {
                if let Some(step) = last_step {
                    let view = &panel.views()[0];
                    let target = view.position(step.to).unwrap_or_else(|| view.motion().cursor());
                    let miss = (view.motion().cursor() - target).norm();
                    ensure(miss < 1e-6, || format!("swing to {} ended {miss} away", step.to))?;
                }
            }

            if visitor.ready(armed_view(&panel).is_some(), now) {
                let before: Vec<i32> = panel.sequence().visited().collect();
                let pointer = panel.sequence().pointer();
                match panel.tap(0, pointer, now) {
                    Ok(step) => {
                        rec.metrics.taps_accepted += 1;
                        let count = panel.sequence().movement_count();
                        ensure(step.to == 1 - step.from, || format!("pendulum did not alternate: {step:?}"))?;
                        ensure(step.reversed == (step.to == 0), || format!("direction flag wrong: {step:?}"))?;
                        ensure(count == rec.metrics.taps_accepted, || {
                            format!("movement count {count} after {} swings", rec.metrics.taps_accepted)
                        })?;
                        let (left, right) = pendulum_prompts(count);
                        debug!("{} | {left:?} | {right:?}", movement_label(count));
                        last_step = Some(step);
                    }
                    Err(e) => {
                        rec.metrics.taps_refused += 1;
                        debug!("tap refused: {e}");
                    }
                }
                check_sequence(panel.sequence(), &before)?;
            }

            if rec.wants_frame() {
                rec.push(board_frame(&panel, now));
            }
        }

        ensure(rec.metrics.taps_accepted >= 2 || self.max_duration_secs < 10.0, || {
            format!("only {} swings", rec.metrics.taps_accepted)
        })?;
        Ok(0)
    }

    /// WP-006: sweep the spiral out to the rim and back.
    ///
    /// **Assertion**: pointer follows the bounce table; trail never exceeds
    /// its cap; each move ends on its waypoint.
    fn run_spiral_sweep(&self, context: &Arc<SimContext>, rec: &mut Recorder<'_>) -> Result<usize, ScenarioError> {
        info!("WP-006: SpiralSweep");
        let mut panel = ProgressionPanel::spiral()?;
        panel.mount(Bounds::new(2720.0, 2720.0), context.now());
        let mut clock = BoardClock::new(&panel, context.now(), &mut rec.metrics);
        let mut visitor = Visitor::new(context.rng_stream(3));
        let duration = self.duration();
        let (lo, hi) = panel.sequence().progression().range();

        // independent model of the bounce
        let mut expected = (panel.sequence().pointer(), false);
        let mut last_step: Option<Step> = None;
        let mut bounced = false;

        while context.now() < duration {
            context.advance_time(STEP);
            let now = context.now();
            rec.ticks += 1;
            let was_animating = panel.is_animating();
            clock.advance(&mut panel, now, &mut rec.metrics)?;

            if was_animating && !panel.is_animating() {
                if let Some(step) = last_step {
                    let view = &panel.views()[0];
                    let target = view.position(step.to).unwrap_or_else(|| view.motion().cursor());
                    let miss = (view.motion().cursor() - target).norm();
                    ensure(miss < 0.5, || format!("spiral move to {} ended {miss}px away", step.to))?;
                }
            }

            if visitor.ready(armed_view(&panel).is_some(), now) {
                let before: Vec<i32> = panel.sequence().visited().collect();
                let pointer = panel.sequence().pointer();
                match panel.tap(0, pointer, now) {
                    Ok(step) => {
                        rec.metrics.taps_accepted += 1;
                        let (p, reversed) = expected;
                        expected = match (reversed, p) {
                            (true, p) if p == lo => (p + 1, false),
                            (true, p) => (p - 1, true),
                            (false, p) if p == hi => (p - 1, true),
                            (false, p) => (p + 1, false),
                        };
                        bounced |= expected.1;
                        ensure((step.to, step.reversed) == expected, || {
                            format!("spiral step {step:?}, expected {expected:?}")
                        })?;
                        last_step = Some(step);
                    }
                    Err(e) => {
                        rec.metrics.taps_refused += 1;
                        debug!("tap refused: {e}");
                    }
                }
                check_sequence(panel.sequence(), &before)?;
            }

            if rec.wants_frame() {
                rec.push(board_frame(&panel, now));
            }
        }

        let move_secs = panel.views()[0].motion().config().duration_secs;
        if self.max_duration_secs >= 8.0 * (move_secs + visitor.max_reaction()) {
            ensure(bounced, || "never bounced at the rim".to_string())?;
        }
        Ok(0)
    }

    /// WP-007: random taps, many of them while the cursor is moving.
    ///
    /// **Assertion**: only armed taps on a resting cursor advance; every
    /// accepted tap starts exactly one run; state is never corrupted.
    fn run_rapid_taps(&self, context: &Arc<SimContext>, rec: &mut Recorder<'_>) -> Result<usize, ScenarioError> {
        info!("WP-007: RapidTaps");
        let mut panel = ProgressionPanel::flow()?;
        panel.mount(Bounds::new(2720.0, 876.0), context.now());
        let mut clock = BoardClock::new(&panel, context.now(), &mut rec.metrics);
        let mut rng = context.rng_stream(4);
        let duration = self.duration();
        let mut next_tap = Duration::from_millis(rng.gen_range(50..400));
        let (lo, hi) = panel.sequence().progression().range();

        while context.now() < duration {
            context.advance_time(STEP);
            let now = context.now();
            rec.ticks += 1;
            clock.advance(&mut panel, now, &mut rec.metrics)?;

            if now >= next_tap {
                next_tap = now + Duration::from_millis(rng.gen_range(50..400));

                // mostly aim at the armed waypoint, sometimes anywhere
                let pointer = panel.sequence().pointer();
                let id = if rng.gen_bool(0.6) { pointer } else { rng.gen_range(lo..=hi) };
                let view = if rng.gen_bool(0.05) { 2 } else { panel.view_for(id).unwrap_or(0) };

                let could_advance = !panel.is_animating()
                    && view < panel.views().len()
                    && panel.views()[view].armed(id, panel.sequence())
                    && pointer < hi;
                let before: Vec<i32> = panel.sequence().visited().collect();

                match panel.tap(view, id, now) {
                    Ok(_) => {
                        rec.metrics.taps_accepted += 1;
                        ensure(could_advance, || format!("tap on {id} accepted while not armed"))?;
                        ensure(panel.is_animating(), || "accepted tap started no run".to_string())?;
                    }
                    Err(e) => {
                        rec.metrics.taps_refused += 1;
                        ensure(!could_advance, || format!("armed tap on {id} refused: {e}"))?;
                        ensure(panel.sequence().pointer() == pointer, || "refused tap moved pointer".to_string())?;
                    }
                }
                check_sequence(panel.sequence(), &before)?;
            }

            if rec.wants_frame() {
                rec.push(board_frame(&panel, now));
            }
        }

        // count runs started by the last taps too
        clock.advance(&mut panel, context.now(), &mut rec.metrics)?;
        let expected_runs = 1 + rec.metrics.taps_accepted;
        ensure(rec.metrics.runs_started == expected_runs, || {
            format!("{} runs for {} accepted taps", rec.metrics.runs_started, rec.metrics.taps_accepted)
        })?;
        Ok(0)
    }
}

/// Every live anchor owns exactly one content quad under the root.
fn check_anchor_table(runtime: &ExperienceRuntime<SimContext>) -> Result<(), ScenarioError> {
    let scene = runtime.scene();
    for id in runtime.anchors().anchors() {
        let entity = runtime
            .anchors()
            .entity_for_anchor(id)
            .ok_or_else(|| ScenarioError::Invariant(format!("anchor {id} has no entity")))?;
        let parent = scene.get(entity).and_then(|n| n.parent());
        ensure(parent == Some(scene.root()), || {
            format!("entity of anchor {id} not under the root")
        })?;
    }

    let quads = scene
        .descendants(scene.root())
        .into_iter()
        .filter(|k| matches!(scene.get(*k).map(|n| &n.kind), Some(EntityKind::ContentQuad { .. })))
        .count();
    ensure(quads == runtime.anchors().len(), || {
        format!("{quads} quads for {} anchors", runtime.anchors().len())
    })
}

/// With no anchors left, every panel is alive and parentless.
fn check_panels_free(runtime: &ExperienceRuntime<SimContext>) -> Result<(), ScenarioError> {
    let scene = runtime.scene();
    for id in runtime.config.panel_ids() {
        let key = runtime
            .panels()
            .entity_for(&id)
            .ok_or_else(|| ScenarioError::Invariant(format!("panel {id} not registered")))?;
        let node = scene
            .get(key)
            .ok_or_else(|| ScenarioError::Invariant(format!("panel {id} was destroyed")))?;
        ensure(node.parent().is_none(), || format!("panel {id} still attached"))?;
    }
    let expected = 1 + runtime.panels().len();
    ensure(scene.len() == expected, || {
        format!("{} entities left, expected {expected}", scene.len())
    })
}

fn anchor_frames(runtime: &ExperienceRuntime<SimContext>) -> Vec<AnchorFrame> {
    runtime
        .anchors()
        .anchors()
        .filter_map(|id| {
            let entity = runtime.anchors().entity_for_anchor(id)?;
            let t = runtime.scene().get(entity)?.translation();
            Some(AnchorFrame {
                anchor_id: id.to_string(),
                x: t.x,
                y: t.y,
                z: t.z,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scenario: ScenarioId, seed: u64, secs: f64) -> ScenarioResult {
        ScenarioRunner::new(seed).with_duration(secs).run(scenario)
    }

    #[test]
    fn test_gallery_walk_scenario() {
        let result = run(ScenarioId::GalleryWalk, 42, 20.0);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.anchors_created, 3);
        assert_eq!(result.final_anchor_count, 0);
    }

    #[test]
    fn test_resighting_scenario() {
        let result = run(ScenarioId::Resighting, 7, 20.0);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.anchors_created, 5);
    }

    #[test]
    fn test_stale_events_scenario() {
        let result = run(ScenarioId::StaleEvents, 99, 10.0);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.events_ignored > 0);
    }

    #[test]
    fn test_flow_sequence_reaches_end() {
        let result = run(ScenarioId::FlowSequence, 42, 60.0);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.taps_accepted, 7);
        assert!(result.metrics.max_trail_len <= 120);
    }

    #[test]
    fn test_pendulum_and_spiral_scenarios() {
        for scenario in [ScenarioId::PendulumSwing, ScenarioId::SpiralSweep] {
            let result = run(scenario, 5, 60.0);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
        let spiral = run(ScenarioId::SpiralSweep, 5, 60.0);
        assert!(spiral.metrics.max_trail_len <= 60);
    }

    #[test]
    fn test_rapid_taps_deterministic() {
        let a = run(ScenarioId::RapidTaps, 1234, 30.0);
        let b = run(ScenarioId::RapidTaps, 1234, 30.0);
        assert!(a.passed, "{:?}", a.failure_reason);
        assert!(a.metrics.taps_refused > 0);
        assert_eq!(a.metrics.taps_accepted, b.metrics.taps_accepted);
        assert_eq!(a.metrics.runs_started, b.metrics.runs_started);
    }

    #[test]
    fn test_export_records_frames() {
        let mut export = SimExport::new("flow_sequence", 42);
        let result = ScenarioRunner::new(42)
            .with_duration(5.0)
            .run_with_export(ScenarioId::FlowSequence, &mut export);
        assert!(result.passed);
        assert!(!export.frames.is_empty());
        assert!(export.passed);
    }
}
