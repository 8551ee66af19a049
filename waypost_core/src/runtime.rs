//! Experience Runtime - the coordinating context for one immersive session.
//!
//! Owns the scene, the anchor table, the session/error state and the exhibit
//! selector, and feeds them from a single ordered event stream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ExperienceRuntime                        │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Context: WaypostContext                 │   │
//! │  │  • now() → event timestamps                          │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                              │
//! │  ┌──────────┐ ┌─────────────────┐ ┌─────────┐ ┌──────────┐  │
//! │  │  SCENE   │ │     ANCHOR      │ │ SESSION │ │ EXHIBIT  │  │
//! │  │  arena   │ │    lifecycle    │ │  state  │ │ selector │  │
//! │  └──────────┘ └─────────────────┘ └─────────┘ └──────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use waypost_core::runtime::{ExperienceRuntime, RuntimeConfig, RuntimeEvent};
//! use waypost_env::{event_channel, TokioContext};
//!
//! let (sink, stream) = event_channel::<RuntimeEvent>();
//! let mut runtime = ExperienceRuntime::new(TokioContext::shared(), RuntimeConfig::default());
//! runtime.register_default_panels();
//! runtime.run(&stream).await?;
//! ```

use crate::anchors::{AnchorConfig, AnchorError, AnchorEvent, AnchorLifecycleManager, AnchorOutcome, PanelRegistry};
use crate::exhibits::{ExhibitKind, ExhibitPositions, ExhibitSelector};
use crate::scene::{EntityKey, EntityKind, SceneError, SceneGraph};
use crate::session::{RecognitionProvider, SessionEvent, SessionState};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use waypost_env::{EventStream, WaypostContext};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for one experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Logical name (for logging)
    pub name: String,

    pub anchors: AnchorConfig,

    pub exhibits: ExhibitPositions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "waypost".to_string(),
            anchors: AnchorConfig::default(),
            exhibits: ExhibitPositions::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Every panel id the anchors will look up.
    pub fn panel_ids(&self) -> Vec<String> {
        self.anchors
            .placements
            .iter()
            .map(|p| p.panel_id.clone())
            .chain(std::iter::once(self.anchors.start_button.clone()))
            .collect()
    }
}

/// Errors loading a [`RuntimeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// EVENTS
// ============================================================================

/// Everything the runtime consumes, merged into one ordered stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeEvent {
    Anchor(AnchorEvent),
    Session(SessionEvent),
    /// Control panel button press
    SelectExhibit(ExhibitKind),
    /// Start button under a poster
    StartPressed,
}

/// Counters over the events handled so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStats {
    pub events: u64,
    pub created: u64,
    pub moved: u64,
    pub untracked: u64,
    pub removed: u64,
    pub ignored: u64,
}

/// Failures that stop the runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

// ============================================================================
// RUNTIME
// ============================================================================

/// The coordinating context of one session.
pub struct ExperienceRuntime<Ctx: WaypostContext> {
    pub context: Arc<Ctx>,
    pub config: RuntimeConfig,
    scene: SceneGraph,
    panels: PanelRegistry,
    anchors: AnchorLifecycleManager,
    session: SessionState,
    selector: ExhibitSelector,
    stats: RuntimeStats,
    last_event_at: Option<Duration>,
}

impl<Ctx: WaypostContext> ExperienceRuntime<Ctx> {
    pub fn new(context: Arc<Ctx>, config: RuntimeConfig) -> Self {
        let anchors = AnchorLifecycleManager::new(config.anchors.clone());
        let selector = ExhibitSelector::new(config.exhibits.clone());
        Self {
            context,
            config,
            scene: SceneGraph::new(),
            panels: PanelRegistry::new(),
            anchors,
            session: SessionState::new(),
            selector,
            stats: RuntimeStats::default(),
            last_event_at: None,
        }
    }

    /// Creates a detached panel entity and makes it available to new anchors.
    pub fn register_panel(&mut self, panel_id: &str) -> EntityKey {
        let key = self.scene.spawn(
            panel_id,
            EntityKind::Panel {
                panel_id: panel_id.to_string(),
            },
        );
        self.panels.register(panel_id, key);
        key
    }

    /// Registers every panel named in the configuration.
    pub fn register_default_panels(&mut self) {
        for id in self.config.panel_ids() {
            self.register_panel(&id);
        }
        debug!(panels = self.panels.len(), "panels registered");
    }

    /// Checks the provider and starts recognition.
    pub async fn start_session<P>(&mut self, provider: &P) -> bool
    where
        P: RecognitionProvider + ?Sized,
    {
        info!(name = %self.config.name, seed = self.context.seed(), "starting session");
        self.session.start(provider).await
    }

    pub fn apply_anchor_event(&mut self, event: AnchorEvent) -> Result<AnchorOutcome, AnchorError> {
        debug!(kind = event.kind(), anchor = %event.anchor().id, "anchor event");
        let outcome = self.anchors.handle(&mut self.scene, &self.panels, event)?;
        match outcome {
            AnchorOutcome::Created { .. } => self.stats.created += 1,
            AnchorOutcome::Moved { .. } => self.stats.moved += 1,
            AnchorOutcome::Untracked => self.stats.untracked += 1,
            AnchorOutcome::Removed { .. } => self.stats.removed += 1,
            AnchorOutcome::Ignored => self.stats.ignored += 1,
        }
        Ok(outcome)
    }

    pub fn apply_session_event(&mut self, event: SessionEvent) {
        self.session.apply(event);
    }

    /// Shows one exhibit on the most recent poster.
    pub fn select_exhibit(&mut self, kind: ExhibitKind) -> Result<bool, SceneError> {
        let slots = self.anchors.latest_slots();
        self.selector.select(&mut self.scene, slots.as_ref(), kind)
    }

    /// Handles one event of any kind.
    pub fn dispatch(&mut self, event: RuntimeEvent) -> Result<(), RuntimeError> {
        self.stats.events += 1;
        self.last_event_at = Some(self.context.now());
        match event {
            RuntimeEvent::Anchor(event) => {
                self.apply_anchor_event(event)?;
            }
            RuntimeEvent::Session(event) => self.apply_session_event(event),
            RuntimeEvent::SelectExhibit(kind) => {
                self.select_exhibit(kind)?;
            }
            RuntimeEvent::StartPressed => self.session.request_start(),
        }
        Ok(())
    }

    /// Consumes `events` in order until the stream closes.
    ///
    /// Returns the number of events handled.
    pub async fn run<S>(&mut self, events: &S) -> Result<u64, RuntimeError>
    where
        S: EventStream<RuntimeEvent> + ?Sized,
    {
        let mut handled = 0;
        while let Some(event) = events.recv().await {
            self.dispatch(event)?;
            handled += 1;
        }
        info!(handled, "event stream closed");
        Ok(handled)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn now_secs(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn anchors(&self) -> &AnchorLifecycleManager {
        &self.anchors
    }

    pub fn panels(&self) -> &PanelRegistry {
        &self.panels
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn selector(&self) -> &ExhibitSelector {
        &self.selector
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    pub fn last_event_at(&self) -> Option<Duration> {
        self.last_event_at
    }
}
