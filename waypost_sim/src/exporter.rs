//! JSON exporter for offline inspection of a run.
//!
//! Exports per-frame anchor poses and board state (pointer, cursor, trail)
//! so a run can be replayed or plotted outside the harness.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use waypost_core::{AnimatorPhase, PathAnimator, Position, Sequence, WaypointView};

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Live anchors and where their entities sit
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub anchors: Vec<AnchorFrame>,

    /// Waypoint boards
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub boards: Vec<BoardFrame>,

    /// Notable events (taps, refusals, removals...)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

impl SimFrame {
    pub fn new(time_sec: f64) -> Self {
        Self {
            time_sec,
            anchors: Vec::new(),
            boards: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// Entity position of one anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorFrame {
    pub anchor_id: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// State of one waypoint board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardFrame {
    pub board: usize,
    pub pointer: i32,
    pub cursor: [f64; 2],
    pub cursor_visible: bool,
    pub trail: Vec<[f64; 2]>,
    pub phase: AnimatorPhase,
}

impl BoardFrame {
    pub fn capture(board: usize, view: &WaypointView<PathAnimator>, sequence: &Sequence) -> Self {
        let point = |p: &Position| [p.x, p.y];
        let animator = view.motion();
        Self {
            board,
            pointer: sequence.pointer(),
            cursor: point(&animator.cursor()),
            cursor_visible: view.cursor_visible(sequence),
            trail: animator.trail().map(point).collect(),
            phase: animator.phase(),
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_tracks_duration_and_skips_empty() {
        let mut export = SimExport::new("spiral_sweep", 42);
        let mut frame = SimFrame::new(0.5);
        frame.events.push(SimEvent::info("tap 0"));
        export.add_frame(frame);
        export.add_frame(SimFrame::new(1.25));
        export.finalize(true, None);

        assert_eq!(export.duration_sec, 1.25);
        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("\"tap 0\""));
        assert!(!json.contains("failure_reason"));
        assert!(!json.contains("\"boards\""));
    }
}
