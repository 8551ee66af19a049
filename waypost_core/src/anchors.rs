//! The "ANCHOR" Engine - recognised images to scene entities
//!
//! [`AnchorLifecycleManager`] owns the table `AnchorId -> entity subtree`.
//! Events are applied one at a time in arrival order; each anchor goes
//!
//! ```text
//!   added            updated (tracked)        removed
//! ───────▶ Tracked ◀────────────────────┐ ───────────▶ gone
//!             └─────────────────────────┘
//! ```
//!
//! Updates and removals for ids with no entry are stale and ignored. A later
//! `added` for a removed id builds a fresh subtree.

use crate::exhibits::{ExhibitKind, ExhibitSlots};
use crate::scene::{EntityKey, EntityKind, SceneError, SceneGraph};
use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, PI};
use tracing::{debug, info, warn};
use waypost_env::AnchorId;

// ============================================================================
// PROVIDER INPUT
// ============================================================================

/// A recognised printed image as reported by the tracking provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnchor {
    pub id: AnchorId,

    /// False while the provider has lost sight of the image
    pub is_tracked: bool,

    /// World-from-anchor rigid transform
    pub transform: Isometry3<f32>,

    /// Reference image size in metres [width, height]
    pub physical_size: Vector2<f32>,

    /// Provider's estimate of printed size / reference size
    pub estimated_scale_factor: f32,
}

impl ImageAnchor {
    /// Tracked anchor at the world origin with scale factor 1.
    pub fn new(id: AnchorId, physical_size: Vector2<f32>) -> Self {
        Self {
            id,
            is_tracked: true,
            transform: Isometry3::identity(),
            physical_size,
            estimated_scale_factor: 1.0,
        }
    }

    pub fn with_transform(mut self, transform: Isometry3<f32>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.estimated_scale_factor = scale;
        self
    }

    pub fn untracked(mut self) -> Self {
        self.is_tracked = false;
        self
    }

    /// Printed size in metres.
    pub fn footprint(&self) -> Vector2<f32> {
        self.physical_size * self.estimated_scale_factor
    }
}

/// One provider notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnchorEvent {
    Added(ImageAnchor),
    Updated(ImageAnchor),
    Removed(ImageAnchor),
}

impl AnchorEvent {
    pub fn anchor(&self) -> &ImageAnchor {
        match self {
            AnchorEvent::Added(a) | AnchorEvent::Updated(a) | AnchorEvent::Removed(a) => a,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnchorEvent::Added(_) => "added",
            AnchorEvent::Updated(_) => "updated",
            AnchorEvent::Removed(_) => "removed",
        }
    }
}

// ============================================================================
// ATTACHMENTS
// ============================================================================

/// Supplier of externally built UI panels, looked up by id.
pub trait AttachmentSource {
    fn entity_for(&self, panel_id: &str) -> Option<EntityKey>;
}

/// Simple id -> entity table of panels.
#[derive(Debug, Clone, Default)]
pub struct PanelRegistry {
    panels: HashMap<String, EntityKey>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, panel_id: impl Into<String>, entity: EntityKey) {
        self.panels.insert(panel_id.into(), entity);
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}

impl AttachmentSource for PanelRegistry {
    fn entity_for(&self, panel_id: &str) -> Option<EntityKey> {
        self.panels.get(panel_id).copied()
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Rotation of `angle` radians about `axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAngle {
    pub axis: [f32; 3],
    pub angle: f32,
}

impl AxisAngle {
    pub fn new(axis: [f32; 3], angle: f32) -> Self {
        Self { axis, angle }
    }

    /// A zero axis gives the identity.
    pub fn to_rotation(&self) -> UnitQuaternion<f32> {
        match Unit::try_new(Vector3::from(self.axis), 1.0e-6) {
            Some(axis) => UnitQuaternion::from_axis_angle(&axis, self.angle),
            None => UnitQuaternion::identity(),
        }
    }
}

/// Change applied to the hosting slot when a panel is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotAdjustment {
    /// Added to the slot's translation
    Translate([f32; 3]),
    /// Replaces the slot's rotation
    Rotate(AxisAngle),
}

/// Where one panel goes under a new anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelPlacement {
    pub panel_id: String,
    pub slot: ExhibitKind,
    pub translation: [f32; 3],

    /// Composed left to right
    #[serde(default)]
    pub rotation: Vec<AxisAngle>,

    #[serde(default)]
    pub slot_adjustment: Option<SlotAdjustment>,
}

impl PanelPlacement {
    pub fn rotation(&self) -> UnitQuaternion<f32> {
        self.rotation
            .iter()
            .fold(UnitQuaternion::identity(), |acc, r| acc * r.to_rotation())
    }

    pub fn transform(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(Vector3::from(self.translation)), self.rotation())
    }
}

/// The poster layout used by the gallery.
pub fn default_placements() -> Vec<PanelPlacement> {
    vec![
        PanelPlacement {
            panel_id: "GlassCubeLabelSecond".to_string(),
            slot: ExhibitKind::Flow,
            translation: [0.0, 0.0, 0.0],
            rotation: vec![AxisAngle::new([0.0, 0.0, 1.0], -FRAC_PI_2)],
            slot_adjustment: None,
        },
        PanelPlacement {
            panel_id: "GlassCubeLabel".to_string(),
            slot: ExhibitKind::Flow,
            translation: [0.0, -1.0, 1.0],
            rotation: vec![
                AxisAngle::new([0.0, 1.0, 0.0], -FRAC_PI_2),
                AxisAngle::new([1.0, 0.0, 0.0], FRAC_PI_2),
            ],
            slot_adjustment: Some(SlotAdjustment::Translate([0.0, 0.0, -8.0])),
        },
        PanelPlacement {
            panel_id: "GlassCubeLabelPendulum".to_string(),
            slot: ExhibitKind::Pendulum,
            translation: [0.0, 1.0, 0.0],
            rotation: vec![AxisAngle::new([0.0, 1.0, 0.0], PI)],
            slot_adjustment: Some(SlotAdjustment::Rotate(AxisAngle::new([0.0, 1.0, 0.0], PI))),
        },
        PanelPlacement {
            panel_id: "SpiralView".to_string(),
            slot: ExhibitKind::Spiral,
            translation: [0.0, 0.9, -2.0],
            rotation: vec![AxisAngle::new([0.0, 1.0, 0.0], PI)],
            slot_adjustment: None,
        },
    ]
}

/// How the anchor's reported rotation is applied to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationPolicy {
    /// Keep the entity upright; only the translation follows the poster
    #[default]
    ZeroRotation,
    /// Follow the poster, tilted -90° about X so content lies on it
    AlignToPoster,
}

/// Configuration for the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub placements: Vec<PanelPlacement>,

    /// Panel id of the session start button
    pub start_button: String,

    /// Gap between the poster's bottom edge and the button (default: 0.1 m)
    pub start_button_gap: f32,

    /// Button offset towards the viewer (default: 0.05 m)
    pub start_button_depth: f32,

    #[serde(default)]
    pub orientation: OrientationPolicy,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            placements: default_placements(),
            start_button: "ImageAnchorButton".to_string(),
            start_button_gap: 0.1,
            start_button_depth: 0.05,
            orientation: OrientationPolicy::ZeroRotation,
        }
    }
}

// ============================================================================
// LIFECYCLE MANAGER
// ============================================================================

/// Everything known about one live anchor.
#[derive(Debug, Clone)]
pub struct AnchorRecord {
    /// Last tracked report
    pub anchor: ImageAnchor,
    pub entity: EntityKey,
    pub slots: ExhibitSlots,
    /// Panels and the start button mounted by this anchor's add
    pub attachments: Vec<EntityKey>,
    created_seq: u64,
}

/// An attachment re-parented during an add, with where it was before.
#[derive(Debug, Clone, Copy)]
struct Mounted {
    key: EntityKey,
    parent: Option<EntityKey>,
    transform: Isometry3<f32>,
}

/// Scene changes made so far by an add that has not finished.
#[derive(Debug, Default)]
struct PartialBuild {
    spawned: Vec<EntityKey>,
    mounted: Vec<Mounted>,
}

impl PartialBuild {
    fn mount(
        &mut self,
        scene: &mut SceneGraph,
        parent: EntityKey,
        key: EntityKey,
        transform: Isometry3<f32>,
    ) -> Result<(), SceneError> {
        let node = scene.node_mut(key)?;
        let previous = Mounted {
            key,
            parent: node.parent(),
            transform: node.transform,
        };
        scene.add_child(parent, key)?;
        self.mounted.push(previous);
        scene.node_mut(key)?.transform = transform;
        Ok(())
    }

    /// Puts mounted attachments back where they were, then despawns what was spawned.
    fn roll_back(self, scene: &mut SceneGraph) {
        for m in self.mounted.iter().rev() {
            let restored = match m.parent {
                Some(parent) if scene.contains(parent) => scene.add_child(parent, m.key),
                _ => scene.detach(m.key),
            };
            match restored {
                Ok(()) => {
                    if let Some(node) = scene.get_mut(m.key) {
                        node.transform = m.transform;
                    }
                }
                Err(e) => warn!(error = %e, "attachment could not be restored"),
            }
        }

        for key in self.spawned {
            if !scene.contains(key) {
                continue;
            }
            if let Err(e) = scene.despawn_recursive(key) {
                warn!(error = %e, "partial subtree could not be despawned");
            }
        }
    }
}

/// What an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorOutcome {
    Created { entity: EntityKey },
    Moved { entity: EntityKey },
    /// Update for a known anchor the provider has lost sight of
    Untracked,
    Removed { entity: EntityKey, despawned: usize },
    /// Duplicate add, or update/remove for an unknown id
    Ignored,
}

/// Owns the anchor table and keeps the scene in step with it.
#[derive(Debug, Default)]
pub struct AnchorLifecycleManager {
    config: AnchorConfig,
    records: HashMap<AnchorId, AnchorRecord>,
    created: u64,
}

impl AnchorLifecycleManager {
    pub fn new(config: AnchorConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
            created: 0,
        }
    }

    /// Applies one provider event.
    pub fn handle<A>(
        &mut self,
        scene: &mut SceneGraph,
        attachments: &A,
        event: AnchorEvent,
    ) -> Result<AnchorOutcome, AnchorError>
    where
        A: AttachmentSource + ?Sized,
    {
        match event {
            AnchorEvent::Added(anchor) => self.on_added(scene, attachments, anchor),
            AnchorEvent::Updated(anchor) => self.on_updated(scene, anchor),
            AnchorEvent::Removed(anchor) => self.on_removed(scene, &anchor.id),
        }
    }

    fn on_added<A>(
        &mut self,
        scene: &mut SceneGraph,
        attachments: &A,
        anchor: ImageAnchor,
    ) -> Result<AnchorOutcome, AnchorError>
    where
        A: AttachmentSource + ?Sized,
    {
        if self.records.contains_key(&anchor.id) {
            debug!(anchor = %anchor.id, "duplicate add ignored");
            return Ok(AnchorOutcome::Ignored);
        }

        let mut build = PartialBuild::default();
        let (entity, slots) = match self.build_subtree(scene, attachments, &anchor, &mut build) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(anchor = %anchor.id, error = %e, "anchor add failed, rolling back");
                build.roll_back(scene);
                return Err(e);
            }
        };

        let footprint = anchor.footprint();
        info!(
            anchor = %anchor.id,
            width = footprint.x,
            height = footprint.y,
            attachments = build.mounted.len(),
            "anchor added"
        );

        self.created += 1;
        self.records.insert(
            anchor.id,
            AnchorRecord {
                anchor,
                entity,
                slots,
                attachments: build.mounted.iter().map(|m| m.key).collect(),
                created_seq: self.created,
            },
        );
        Ok(AnchorOutcome::Created { entity })
    }

    /// Spawns the quad and its slots, then mounts every available attachment.
    ///
    /// Each scene change is recorded in `build` as it happens so a failure
    /// part way through can be undone.
    fn build_subtree<A>(
        &self,
        scene: &mut SceneGraph,
        attachments: &A,
        anchor: &ImageAnchor,
        build: &mut PartialBuild,
    ) -> Result<(EntityKey, ExhibitSlots), AnchorError>
    where
        A: AttachmentSource + ?Sized,
    {
        let footprint = anchor.footprint();
        let entity = scene.spawn(
            format!("imageEntity_{}", anchor.id.as_uuid()),
            EntityKind::ContentQuad {
                width: footprint.x,
                height: footprint.y,
            },
        );
        build.spawned.push(entity);

        let slots = ExhibitSlots {
            pendulum: scene.spawn("slot_pendulum", EntityKind::Slot),
            flow: scene.spawn("slot_flow", EntityKind::Slot),
            spiral: scene.spawn("slot_spiral", EntityKind::Slot),
        };
        build.spawned.extend(slots.iter().map(|(_, slot)| slot));
        for (_, slot) in slots.iter() {
            scene.add_child(entity, slot)?;
        }

        for placement in &self.config.placements {
            let Some(panel) = attachments.entity_for(&placement.panel_id) else {
                continue;
            };
            if !scene.contains(panel) {
                warn!(panel = %placement.panel_id, "attachment no longer in scene, skipping");
                continue;
            }

            let slot = slots.get(placement.slot);
            build.mount(scene, slot, panel, placement.transform())?;

            match placement.slot_adjustment {
                Some(SlotAdjustment::Translate(offset)) => {
                    let node = scene.node_mut(slot)?;
                    let moved = node.translation() + Vector3::from(offset);
                    node.set_translation(moved);
                }
                Some(SlotAdjustment::Rotate(rotation)) => {
                    scene.node_mut(slot)?.set_rotation(rotation.to_rotation());
                }
                None => {}
            }
        }

        let root = scene.root();
        scene.add_child(root, entity)?;

        if let Some(button) = attachments.entity_for(&self.config.start_button) {
            let free = scene.get(button).map(|n| n.parent().is_none()).unwrap_or(false);
            if free {
                let offset = Isometry3::translation(
                    0.0,
                    -footprint.y / 2.0 - self.config.start_button_gap,
                    self.config.start_button_depth,
                );
                build.mount(scene, entity, button, offset)?;
                debug!(anchor = %anchor.id, "start button placed");
            }
        }

        if anchor.is_tracked {
            self.apply_pose(scene, entity, anchor)?;
        }
        Ok((entity, slots))
    }

    fn on_updated(&mut self, scene: &mut SceneGraph, anchor: ImageAnchor) -> Result<AnchorOutcome, AnchorError> {
        let Some(entity) = self.records.get(&anchor.id).map(|r| r.entity) else {
            debug!(anchor = %anchor.id, "stale update ignored");
            return Ok(AnchorOutcome::Ignored);
        };

        if !anchor.is_tracked {
            debug!(anchor = %anchor.id, "anchor not tracked, pose kept");
            return Ok(AnchorOutcome::Untracked);
        }

        self.apply_pose(scene, entity, &anchor)?;
        if let Some(record) = self.records.get_mut(&anchor.id) {
            record.anchor = anchor;
        }
        Ok(AnchorOutcome::Moved { entity })
    }

    fn on_removed(&mut self, scene: &mut SceneGraph, id: &AnchorId) -> Result<AnchorOutcome, AnchorError> {
        let Some(record) = self.records.remove(id) else {
            debug!(anchor = %id, "stale removal ignored");
            return Ok(AnchorOutcome::Ignored);
        };

        // attachments outlive the anchor so the next one can adopt them;
        // ones a later anchor already took are left where they are
        let released: Vec<EntityKey> = record
            .attachments
            .iter()
            .copied()
            .filter(|&k| scene.contains(k) && scene.is_ancestor(record.entity, k))
            .collect();
        for key in &released {
            scene.detach(*key)?;
        }

        let despawned = scene.despawn_recursive(record.entity)?;
        info!(anchor = %id, despawned, released = released.len(), "anchor removed");
        Ok(AnchorOutcome::Removed {
            entity: record.entity,
            despawned,
        })
    }

    fn apply_pose(&self, scene: &mut SceneGraph, entity: EntityKey, anchor: &ImageAnchor) -> Result<(), AnchorError> {
        let rotation = match self.config.orientation {
            OrientationPolicy::ZeroRotation => UnitQuaternion::identity(),
            OrientationPolicy::AlignToPoster => {
                anchor.transform.rotation * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2)
            }
        };
        let node = scene
            .get_mut(entity)
            .ok_or(AnchorError::MissingEntity(anchor.id))?;
        node.transform = Isometry3::from_parts(anchor.transform.translation, rotation);
        Ok(())
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn record(&self, id: &AnchorId) -> Option<&AnchorRecord> {
        self.records.get(id)
    }

    pub fn entity_for_anchor(&self, id: &AnchorId) -> Option<EntityKey> {
        self.records.get(id).map(|r| r.entity)
    }

    /// Slots of the most recently created live anchor.
    pub fn latest_slots(&self) -> Option<ExhibitSlots> {
        self.records
            .values()
            .max_by_key(|r| r.created_seq)
            .map(|r| r.slots)
    }

    pub fn anchors(&self) -> impl Iterator<Item = &AnchorId> + '_ {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Broken invariants between the anchor table and the scene.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnchorError {
    #[error("Entity for anchor {0} is missing from the scene")]
    MissingEntity(AnchorId),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

// ============================================================================
// TESTS
// ============================================================================
