//! Waypoint boards: layout + motion + tap gating over a shared sequence.
//!
//! A [`WaypointView`] shows the ids `[start_id, end_id]` of a [`Sequence`].
//! Several views can cover one sequence (the flow exhibit splits eight
//! waypoints over two boards), so the sequence itself lives in the
//! [`ProgressionPanel`] that owns the views and fans every change out to
//! all of them.

use crate::animator::{AnimatorConfig, PathAnimator, PathMotion, PathStyle};
use crate::layout::{
    spiral_guide, Bounds, LayoutCache, LayoutStyle, Position, SpiralGeometry, SPIRAL_GUIDE_SAMPLES,
};
use crate::sequence::{Progression, Sequence, SequenceError, Step, WaypointId, SPIRAL_LAST_ID};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Board flavour; decides layout, motion path and cursor visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewVariant {
    Linear,
    Pendulum,
    Spiral,
}

/// How big a waypoint is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadiusRule {
    /// Fraction of the view width
    FractionOfWidth(f64),
    /// Fixed size in view units
    Fixed(f64),
}

impl RadiusRule {
    pub fn resolve(&self, bounds: Bounds) -> f64 {
        match *self {
            RadiusRule::FractionOfWidth(f) => bounds.width * f,
            RadiusRule::Fixed(r) => r,
        }
    }
}

/// Per-board parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub variant: ViewVariant,

    /// First id shown on this board
    pub start_id: WaypointId,

    /// Last id shown on this board (inclusive)
    pub end_id: WaypointId,

    /// Ids that are laid out but can never be armed
    #[serde(default)]
    pub invisible: Vec<WaypointId>,

    pub radius: RadiusRule,

    /// Cursor must be closer than this to arm a waypoint
    pub proximity: f64,

    pub animator: AnimatorConfig,
}

impl ViewConfig {
    pub fn linear(start_id: WaypointId, end_id: WaypointId) -> Self {
        Self {
            variant: ViewVariant::Linear,
            start_id,
            end_id,
            invisible: Vec::new(),
            radius: RadiusRule::FractionOfWidth(0.1),
            proximity: 10.0,
            animator: AnimatorConfig::linear(),
        }
    }

    pub fn pendulum() -> Self {
        Self {
            variant: ViewVariant::Pendulum,
            start_id: 0,
            end_id: 1,
            invisible: Vec::new(),
            radius: RadiusRule::Fixed(442.0),
            proximity: 10.0,
            animator: AnimatorConfig::pendulum(),
        }
    }

    pub fn spiral(last_id: WaypointId) -> Self {
        Self {
            variant: ViewVariant::Spiral,
            start_id: 0,
            end_id: last_id,
            invisible: Vec::new(),
            radius: RadiusRule::FractionOfWidth(0.1),
            proximity: 50.0,
            animator: AnimatorConfig::spiral(),
        }
    }

    pub fn with_invisible(mut self, ids: impl IntoIterator<Item = WaypointId>) -> Self {
        self.invisible = ids.into_iter().collect();
        self
    }

    pub fn waypoint_count(&self) -> usize {
        usize::try_from(self.end_id - self.start_id + 1).unwrap_or(0)
    }

    pub fn layout_style(&self) -> LayoutStyle {
        match self.variant {
            ViewVariant::Linear | ViewVariant::Pendulum => LayoutStyle::Linear,
            ViewVariant::Spiral => LayoutStyle::Spiral,
        }
    }

    pub fn contains(&self, id: WaypointId) -> bool {
        (self.start_id..=self.end_id).contains(&id)
    }
}

/// Why a tap was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("Cursor is still moving")]
    Animating,

    #[error("Waypoint {id} is not armed")]
    NotArmed { id: WaypointId },

    #[error("No board at index {0}")]
    NoSuchView(usize),

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

// ============================================================================
// WAYPOINT VIEW
// ============================================================================

/// One board of waypoints driving one cursor.
#[derive(Debug)]
pub struct WaypointView<M: PathMotion> {
    config: ViewConfig,
    layout: LayoutCache,
    motion: M,
}

impl WaypointView<PathAnimator> {
    /// Board driven by a hand-stepped [`PathAnimator`].
    pub fn with_animator(config: ViewConfig) -> Self {
        let animator = PathAnimator::new(config.animator.clone(), PathStyle::Straight);
        Self::new(config, animator)
    }
}

impl<M: PathMotion> WaypointView<M> {
    pub fn new(config: ViewConfig, motion: M) -> Self {
        let layout = LayoutCache::new(config.waypoint_count(), config.layout_style());
        Self {
            config,
            layout,
            motion,
        }
    }

    /// Lays the board out and places the cursor for the current sequence state.
    ///
    /// Returns the entry move if one was started.
    pub fn mount(&mut self, bounds: Bounds, sequence: &Sequence, now: Duration) -> Option<(Position, Position)> {
        self.relayout(bounds);

        match self.config.variant {
            ViewVariant::Linear => {
                let edge = bounds.left_edge();
                self.motion.park(edge);
                let target = self.position(sequence.pointer())?;
                debug!(pointer = sequence.pointer(), "entering board from the left edge");
                self.motion.begin(edge, target, now);
                Some((edge, target))
            }
            ViewVariant::Pendulum | ViewVariant::Spiral => {
                if let Some(home) = self.position(sequence.first_visited()) {
                    self.motion.park(home);
                }
                None
            }
        }
    }

    /// Recomputes the layout if the board changed size.
    pub fn resize(&mut self, bounds: Bounds) -> bool {
        self.relayout(bounds)
    }

    fn relayout(&mut self, bounds: Bounds) -> bool {
        let radius = self.config.radius.resolve(bounds);
        let changed = self.layout.ensure(bounds, radius);
        if changed && self.config.variant == ViewVariant::Spiral {
            self.motion
                .restyle(PathStyle::Spiral(SpiralGeometry::for_waypoints(bounds, radius)));
        }
        if changed {
            trace!(width = bounds.width, height = bounds.height, "layout recomputed");
        }
        changed
    }

    /// Laid-out position of `id`, if this board shows it and has been mounted.
    pub fn position(&self, id: WaypointId) -> Option<Position> {
        if !self.config.contains(id) {
            return None;
        }
        let index = usize::try_from(id - self.config.start_id).ok()?;
        self.layout.positions().get(index).copied()
    }

    /// True if tapping `id` would advance the sequence.
    pub fn armed(&self, id: WaypointId, sequence: &Sequence) -> bool {
        if id != sequence.pointer() || self.config.invisible.contains(&id) {
            return false;
        }
        self.position(id)
            .map(|p| (self.motion.cursor() - p).norm() < self.config.proximity)
            .unwrap_or(false)
    }

    /// Handles a tap on `id`, advancing the sequence when allowed.
    ///
    /// The caller must fan the change out with [`Self::on_pointer_changed`]
    /// (see [`ProgressionPanel::tap`]).
    pub fn tap(&self, id: WaypointId, sequence: &mut Sequence) -> Result<Step, ViewError> {
        if self.motion.is_animating() {
            return Err(ViewError::Animating);
        }
        if !self.armed(id, sequence) {
            return Err(ViewError::NotArmed { id });
        }
        Ok(sequence.advance()?)
    }

    /// Starts the cursor move for a new pointer, if this board shows it.
    pub fn on_pointer_changed(&mut self, sequence: &Sequence, now: Duration) -> Option<(Position, Position)> {
        let new_id = sequence.pointer();
        let previous_id = sequence.previous_id();

        let (from, to) = match self.config.variant {
            ViewVariant::Linear => {
                if !self.config.contains(new_id) {
                    return None;
                }
                if new_id == self.config.start_id && previous_id < self.config.start_id {
                    let edge = self.layout.bounds()?.left_edge();
                    (edge, self.position(new_id)?)
                } else {
                    (self.position(previous_id)?, self.position(new_id)?)
                }
            }
            ViewVariant::Pendulum | ViewVariant::Spiral => {
                (self.position(previous_id)?, self.position(new_id)?)
            }
        };

        debug!(from = previous_id, to = new_id, "cursor move started");
        self.motion.begin(from, to, now);
        Some((from, to))
    }

    /// Whether the cursor is drawn for the current pointer.
    pub fn cursor_visible(&self, sequence: &Sequence) -> bool {
        let pointer = sequence.pointer();
        match self.config.variant {
            ViewVariant::Linear => self.config.contains(pointer),
            ViewVariant::Pendulum | ViewVariant::Spiral => {
                self.config.contains(pointer) || self.config.contains(pointer - 1)
            }
        }
    }

    /// Stereo/spatial placement of a point, each axis mapped to `[-1, 1]`.
    pub fn sound_pan(&self, position: Position) -> Option<(f64, f64)> {
        let bounds = self.layout.bounds()?;
        if bounds.width <= 0.0 || bounds.height <= 0.0 {
            return None;
        }
        Some((
            position.x / bounds.width * 2.0 - 1.0,
            position.y / bounds.height * 2.0 - 1.0,
        ))
    }

    /// Background curve for spiral boards.
    pub fn guide(&self) -> Option<Vec<Position>> {
        if self.config.variant != ViewVariant::Spiral {
            return None;
        }
        let bounds = self.layout.bounds()?;
        Some(spiral_guide(bounds, self.layout.radius(), SPIRAL_GUIDE_SAMPLES))
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn positions(&self) -> &[Position] {
        self.layout.positions()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.layout.bounds()
    }

    pub fn radius(&self) -> f64 {
        self.layout.radius()
    }

    pub fn motion(&self) -> &M {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut M {
        &mut self.motion
    }
}

// ============================================================================
// PROGRESSION PANEL
// ============================================================================

/// A sequence plus every board that observes it.
#[derive(Debug)]
pub struct ProgressionPanel<M: PathMotion> {
    sequence: Sequence,
    views: Vec<WaypointView<M>>,
}

impl ProgressionPanel<PathAnimator> {
    /// Eight waypoints split over two line boards (0..=3 and 4..=7).
    pub fn flow() -> Result<Self, SequenceError> {
        Self::build(
            Progression::Linear { start: 0, end: 7 },
            vec![ViewConfig::linear(0, 3), ViewConfig::linear(4, 7)],
            |config| PathAnimator::new(config.animator.clone(), PathStyle::Straight),
        )
    }

    pub fn pendulum() -> Result<Self, SequenceError> {
        Self::build(Progression::Pendulum, vec![ViewConfig::pendulum()], |config| {
            PathAnimator::new(config.animator.clone(), PathStyle::Straight)
        })
    }

    pub fn spiral() -> Result<Self, SequenceError> {
        Self::build(Progression::spiral(), vec![ViewConfig::spiral(SPIRAL_LAST_ID)], |config| {
            PathAnimator::new(config.animator.clone(), PathStyle::Straight)
        })
    }
}

impl<M: PathMotion> ProgressionPanel<M> {
    /// Builds a panel, creating one motion source per board with `make_motion`.
    pub fn build<F>(progression: Progression, configs: Vec<ViewConfig>, mut make_motion: F) -> Result<Self, SequenceError>
    where
        F: FnMut(&ViewConfig) -> M,
    {
        let sequence = Sequence::new(progression)?;
        let views = configs
            .into_iter()
            .map(|config| {
                let motion = make_motion(&config);
                WaypointView::new(config, motion)
            })
            .collect();
        Ok(Self { sequence, views })
    }

    /// Mounts every board at the same size.
    pub fn mount(&mut self, bounds: Bounds, now: Duration) {
        for view in &mut self.views {
            view.mount(bounds, &self.sequence, now);
        }
    }

    pub fn resize(&mut self, bounds: Bounds) {
        for view in &mut self.views {
            view.resize(bounds);
        }
    }

    /// Taps waypoint `id` on board `view`, then notifies every board.
    pub fn tap(&mut self, view: usize, id: WaypointId, now: Duration) -> Result<Step, ViewError> {
        let board = self.views.get(view).ok_or(ViewError::NoSuchView(view))?;
        let step = board.tap(id, &mut self.sequence)?;
        for board in &mut self.views {
            board.on_pointer_changed(&self.sequence, now);
        }
        Ok(step)
    }

    /// Board showing `id`, if any.
    pub fn view_for(&self, id: WaypointId) -> Option<usize> {
        self.views.iter().position(|v| v.config().contains(id))
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn views(&self) -> &[WaypointView<M>] {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut [WaypointView<M>] {
        &mut self.views
    }

    pub fn is_animating(&self) -> bool {
        self.views.iter().any(|v| v.motion().is_animating())
    }
}

// ============================================================================
// TESTS
// ============================================================================
