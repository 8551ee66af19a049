//! Waypost Core - image-anchored waypoint experiences
//!
//! This library provides the two engines behind a poster-anchored exhibit:
//! 1. **Anchor lifecycle**: recognised images mapped 1:1 to scene subtrees that host UI panels
//! 2. **Waypoint progression**: linear, pendulum and spiral sequences with an animated cursor and fading trail
//!
//! Around them sit the layout calculator, a small scene arena, session/error
//! state, the exhibit selector and the [`runtime::ExperienceRuntime`] that
//! feeds everything from one ordered event stream.

pub mod anchors;
pub mod animator;
pub mod driver;
pub mod exhibits;
pub mod layout;
pub mod prompts;
pub mod runtime;
pub mod scene;
pub mod sequence;
pub mod session;
pub mod view;

// Re-export key types for convenience
pub use anchors::{AnchorConfig, AnchorEvent, AnchorLifecycleManager, AnchorOutcome, AttachmentSource, ImageAnchor, PanelRegistry};
pub use animator::{AnimatorConfig, AnimatorPhase, PathAnimator, PathMotion, PathStyle};
pub use driver::AnimationDriver;
pub use exhibits::{ExhibitKind, ExhibitSelector};
pub use layout::{compute_layout, Bounds, LayoutStyle, Position};
pub use runtime::{ExperienceRuntime, RuntimeConfig, RuntimeEvent};
pub use scene::{EntityKey, SceneGraph};
pub use sequence::{Progression, Sequence, SequenceError, Step, WaypointId};
pub use session::{ErrorState, RecognitionProvider, SessionEvent, SessionState};
pub use view::{ProgressionPanel, ViewConfig, WaypointView};
