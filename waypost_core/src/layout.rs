//! The "LAYOUT" Engine - waypoint placement for line and spiral boards
//!
//! Pure functions from a waypoint count and the view bounds to an ordered
//! list of 2-D positions. Spiral boards place waypoint `i` at the warped
//! parameter `sqrt(i / (n - 1))`, which crowds early waypoints near the
//! centre and spreads later ones outward.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A 2-D position in view coordinates (origin top-left, y down).
pub type Position = Point2<f64>;

/// Number of full rotations of the spiral.
pub const SPIRAL_TURNS: f64 = 2.0;

/// Extra inset between the outermost spiral waypoint and the view edge.
pub const SPIRAL_PADDING: f64 = 20.0;

/// Default sample count for the background spiral guide.
pub const SPIRAL_GUIDE_SAMPLES: usize = 200;

// ============================================================================
// BOUNDS
// ============================================================================

/// Size of the view that hosts a waypoint board.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Midpoint of the view.
    pub fn center(&self) -> Position {
        Position::new(self.width / 2.0, self.height / 2.0)
    }

    /// Left end of the horizontal midline.
    pub fn left_edge(&self) -> Position {
        Position::new(0.0, self.height / 2.0)
    }

    /// Right end of the horizontal midline.
    pub fn right_edge(&self) -> Position {
        Position::new(self.width, self.height / 2.0)
    }

    /// Shorter side of the view.
    pub fn min_side(&self) -> f64 {
        self.width.min(self.height)
    }
}

/// How waypoints are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStyle {
    /// Evenly spaced along the horizontal midline
    Linear,
    /// Along an Archimedean spiral around the view centre
    Spiral,
}

// ============================================================================
// SPIRAL GEOMETRY
// ============================================================================

/// Parametric spiral `r(s) = max_radius * s`, `θ(s) = 2π * turns * s`.
///
/// `s` here is the already-warped parameter: layout feeds it `sqrt(t)`,
/// animation feeds it a value recovered from radial distance. Both agree on
/// the waypoint positions themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpiralGeometry {
    pub center: Position,
    pub max_radius: f64,
    pub turns: f64,
}

impl SpiralGeometry {
    /// Geometry used for waypoint placement and cursor motion.
    ///
    /// `max_radius = min(width, height) / 2 - radius - SPIRAL_PADDING`, floored at 0.
    pub fn for_waypoints(bounds: Bounds, radius: f64) -> Self {
        Self::with_inset(bounds, radius + SPIRAL_PADDING)
    }

    /// Geometry with an arbitrary inset from the shorter half-side.
    pub fn with_inset(bounds: Bounds, inset: f64) -> Self {
        Self {
            center: bounds.center(),
            max_radius: (bounds.min_side() / 2.0 - inset).max(0.0),
            turns: SPIRAL_TURNS,
        }
    }

    /// Point on the spiral at parameter `s` in `[0, 1]`.
    pub fn point_at(&self, s: f64) -> Position {
        let r = self.max_radius * s;
        let theta = self.turns * 2.0 * PI * s;
        self.center + Vector2::new(r * theta.cos(), r * theta.sin())
    }

    /// Recovers the spiral parameter of a point from its distance to the centre.
    ///
    /// Exact for points that lie on the spiral; clamped to 1.
    pub fn progress_of(&self, p: Position) -> f64 {
        if self.max_radius <= f64::EPSILON {
            return 0.0;
        }
        ((p - self.center).norm() / self.max_radius).min(1.0)
    }

    /// Warped parameter of waypoint `index` out of `count`.
    pub fn waypoint_param(index: usize, count: usize) -> f64 {
        let denom = count.saturating_sub(1).max(1) as f64;
        (index as f64 / denom).sqrt()
    }
}

// ============================================================================
// LAYOUT
// ============================================================================

/// Computes the ordered waypoint positions for a board.
///
/// # Arguments
/// * `count` - number of waypoints
/// * `bounds` - size of the hosting view
/// * `radius` - waypoint radius; linear boards are inset by it on both sides
/// * `style` - line or spiral
pub fn compute_layout(count: usize, bounds: Bounds, radius: f64, style: LayoutStyle) -> Vec<Position> {
    match style {
        LayoutStyle::Linear => linear_layout(count, bounds, radius),
        LayoutStyle::Spiral => spiral_layout(count, bounds, radius),
    }
}

fn linear_layout(count: usize, bounds: Bounds, radius: f64) -> Vec<Position> {
    let mid_y = bounds.height / 2.0;
    let padded_width = bounds.width - 2.0 * radius;

    if count == 1 || padded_width <= 0.0 {
        return vec![Position::new(bounds.width / 2.0, mid_y); count];
    }

    let step = padded_width / (count - 1) as f64;
    (0..count)
        .map(|i| Position::new(radius + step * i as f64, mid_y))
        .collect()
}

fn spiral_layout(count: usize, bounds: Bounds, radius: f64) -> Vec<Position> {
    let geometry = SpiralGeometry::for_waypoints(bounds, radius);
    (0..count)
        .map(|i| geometry.point_at(SpiralGeometry::waypoint_param(i, count)))
        .collect()
}

/// Samples the un-warped spiral for drawing the background guide.
///
/// Returns `samples + 1` points from the centre outward.
pub fn spiral_guide(bounds: Bounds, padding: f64, samples: usize) -> Vec<Position> {
    let geometry = SpiralGeometry::with_inset(bounds, padding);
    let samples = samples.max(1);
    (0..=samples)
        .map(|i| geometry.point_at(i as f64 / samples as f64))
        .collect()
}

/// Waypoint positions cached per view size.
#[derive(Debug, Clone)]
pub struct LayoutCache {
    count: usize,
    style: LayoutStyle,
    bounds: Option<Bounds>,
    radius: f64,
    positions: Vec<Position>,
}

impl LayoutCache {
    pub fn new(count: usize, style: LayoutStyle) -> Self {
        Self {
            count,
            style,
            bounds: None,
            radius: 0.0,
            positions: Vec::new(),
        }
    }

    /// Recomputes positions if `bounds` or `radius` differ from the cached ones.
    ///
    /// Returns `true` when a recomputation happened.
    pub fn ensure(&mut self, bounds: Bounds, radius: f64) -> bool {
        if self.bounds == Some(bounds) && self.radius == radius {
            return false;
        }
        self.positions = compute_layout(self.count, bounds, radius, self.style);
        self.bounds = Some(bounds);
        self.radius = radius;
        true
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn style(&self) -> LayoutStyle {
        self.style
    }
}
