//! Waypost Deterministic Simulation Harness
//!
//! A controlled environment where the anchor lifecycle and the waypoint
//! boards run against scripted inputs, reproducibly from one seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock that moves only when the runner advances it
//! - **Provider**: an oracle that scripts recognition feeds with noise and dropouts
//! - **Visitors**: taps scheduled from seeded RNG streams
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                       │
//! │  ┌──────────────┐   feed    ┌──────────────────────────┐ │
//! │  │ PosterOracle │──────────►│ ExperienceRuntime        │ │
//! │  └──────────────┘           │  (scene, anchors, panels)│ │
//! │                             └──────────────────────────┘ │
//! │  ┌──────────────┐   taps    ┌──────────────────────────┐ │
//! │  │   Visitor    │──────────►│ ProgressionPanel         │ │
//! │  └──────────────┘           │  (sequence, animators)   │ │
//! │                             └──────────────────────────┘ │
//! │              SimContext (virtual clock, seed)            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use waypost_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(30.0)
//!     .run(ScenarioId::SpiralSweep);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{AnchorFrame, BoardFrame, SimEvent, SimExport, SimFrame};
pub use oracle::{merge, GroundTruthPoster, PosterOracle, TimedEvent};
pub use runner::{ScenarioError, ScenarioMetrics, ScenarioResult, ScenarioRunner};
