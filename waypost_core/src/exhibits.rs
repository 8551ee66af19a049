//! Exhibit slots under an anchor and the control-panel selector that shows one at a time.

use crate::scene::{EntityKey, SceneError, SceneGraph};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// The three exhibits mounted on every recognised poster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhibitKind {
    Pendulum,
    Flow,
    Spiral,
}

impl ExhibitKind {
    pub const ALL: [ExhibitKind; 3] = [ExhibitKind::Pendulum, ExhibitKind::Flow, ExhibitKind::Spiral];

    pub fn name(&self) -> &'static str {
        match self {
            ExhibitKind::Pendulum => "pendulum",
            ExhibitKind::Flow => "flow",
            ExhibitKind::Spiral => "spiral",
        }
    }
}

impl fmt::Display for ExhibitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Slot entities created for one anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExhibitSlots {
    pub pendulum: EntityKey,
    pub flow: EntityKey,
    pub spiral: EntityKey,
}

impl ExhibitSlots {
    pub fn get(&self, kind: ExhibitKind) -> EntityKey {
        match kind {
            ExhibitKind::Pendulum => self.pendulum,
            ExhibitKind::Flow => self.flow,
            ExhibitKind::Spiral => self.spiral,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExhibitKind, EntityKey)> + '_ {
        ExhibitKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }
}

/// Where each slot sits when shown, and where hidden slots are parked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhibitPositions {
    pub pendulum: [f32; 3],
    pub flow: [f32; 3],
    pub spiral: [f32; 3],
    pub hidden: [f32; 3],
}

impl Default for ExhibitPositions {
    fn default() -> Self {
        Self {
            pendulum: [0.0, 0.0, 0.0],
            flow: [-1.5, -0.2, 0.0],
            spiral: [0.0, 0.0, 0.0],
            hidden: [0.0, 0.0, 1000.0],
        }
    }
}

impl ExhibitPositions {
    pub fn home(&self, kind: ExhibitKind) -> Vector3<f32> {
        let p = match kind {
            ExhibitKind::Pendulum => self.pendulum,
            ExhibitKind::Flow => self.flow,
            ExhibitKind::Spiral => self.spiral,
        };
        Vector3::from(p)
    }

    pub fn hidden(&self) -> Vector3<f32> {
        Vector3::from(self.hidden)
    }
}

/// Control panel state: which exhibit is showing.
#[derive(Debug, Clone, Default)]
pub struct ExhibitSelector {
    positions: ExhibitPositions,
    selected: Option<ExhibitKind>,
}

impl ExhibitSelector {
    pub fn new(positions: ExhibitPositions) -> Self {
        Self {
            positions,
            selected: None,
        }
    }

    /// Shows `kind` and hides the other slots of `slots`.
    ///
    /// Pressing the exhibit that is already showing does nothing. With no
    /// anchor yet the choice is only remembered. Returns `true` if the
    /// selection changed.
    pub fn select(
        &mut self,
        scene: &mut SceneGraph,
        slots: Option<&ExhibitSlots>,
        kind: ExhibitKind,
    ) -> Result<bool, SceneError> {
        if self.selected == Some(kind) {
            return Ok(false);
        }

        if let Some(slots) = slots {
            for (_, key) in slots.iter() {
                scene.node_mut(key)?.set_translation(self.positions.hidden());
            }
            scene
                .node_mut(slots.get(kind))?
                .set_translation(self.positions.home(kind));
        }

        info!(exhibit = %kind, "exhibit selected");
        self.selected = Some(kind);
        Ok(true)
    }

    pub fn selected(&self) -> Option<ExhibitKind> {
        self.selected
    }

    pub fn positions(&self) -> &ExhibitPositions {
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::EntityKind;
    use approx::assert_relative_eq;

    fn slots(scene: &mut SceneGraph) -> ExhibitSlots {
        ExhibitSlots {
            pendulum: scene.spawn("pendulum", EntityKind::Slot),
            flow: scene.spawn("flow", EntityKind::Slot),
            spiral: scene.spawn("spiral", EntityKind::Slot),
        }
    }

    #[test]
    fn test_select_hides_others() {
        let mut scene = SceneGraph::new();
        let slots = slots(&mut scene);
        let mut selector = ExhibitSelector::default();

        assert!(selector.select(&mut scene, Some(&slots), ExhibitKind::Flow).unwrap());

        let flow = scene.get(slots.flow).unwrap().translation();
        assert_relative_eq!(flow, Vector3::new(-1.5, -0.2, 0.0));
        for kind in [ExhibitKind::Pendulum, ExhibitKind::Spiral] {
            let t = scene.get(slots.get(kind)).unwrap().translation();
            assert_relative_eq!(t, Vector3::new(0.0, 0.0, 1000.0));
        }
    }

    #[test]
    fn test_reselect_is_noop() {
        let mut scene = SceneGraph::new();
        let slots = slots(&mut scene);
        let mut selector = ExhibitSelector::default();
        selector.select(&mut scene, Some(&slots), ExhibitKind::Spiral).unwrap();

        // move it by hand; a second press must not touch it
        scene
            .get_mut(slots.spiral)
            .unwrap()
            .set_translation(Vector3::new(5.0, 5.0, 5.0));
        assert!(!selector.select(&mut scene, Some(&slots), ExhibitKind::Spiral).unwrap());
        assert_relative_eq!(
            scene.get(slots.spiral).unwrap().translation(),
            Vector3::new(5.0, 5.0, 5.0)
        );
    }

    #[test]
    fn test_select_without_anchor_is_remembered() {
        let mut scene = SceneGraph::new();
        let mut selector = ExhibitSelector::default();
        assert!(selector.select(&mut scene, None, ExhibitKind::Pendulum).unwrap());
        assert_eq!(selector.selected(), Some(ExhibitKind::Pendulum));
    }
}
