//! Minimal entity arena standing in for the renderer's scene graph.
//!
//! Only the structure the anchor lifecycle needs is modelled: named nodes,
//! a local rigid transform, and parent/child links. Keys are generational
//! (slotmap), so a key held after despawn never aliases a newer entity.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to an entity in a [`SceneGraph`].
    pub struct EntityKey;
}

/// What an entity represents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Scene root
    Root,
    /// Transparent quad covering a recognised image, sized in metres
    ContentQuad { width: f32, height: f32 },
    /// Mount point for one exhibit under an anchor
    Slot,
    /// Externally supplied UI panel
    Panel { panel_id: String },
}

/// One node of the arena.
#[derive(Debug, Clone)]
pub struct EntityNode {
    pub name: String,
    pub kind: EntityKind,
    /// Transform relative to the parent
    pub transform: Isometry3<f32>,
    parent: Option<EntityKey>,
    children: Vec<EntityKey>,
}

impl EntityNode {
    pub fn parent(&self) -> Option<EntityKey> {
        self.parent
    }

    pub fn children(&self) -> &[EntityKey] {
        &self.children
    }

    pub fn translation(&self) -> Vector3<f32> {
        self.transform.translation.vector
    }

    pub fn rotation(&self) -> UnitQuaternion<f32> {
        self.transform.rotation
    }

    pub fn set_translation(&mut self, t: Vector3<f32>) {
        self.transform.translation = Translation3::from(t);
    }

    pub fn set_rotation(&mut self, r: UnitQuaternion<f32>) {
        self.transform.rotation = r;
    }
}

/// Arena of entities with a single root.
#[derive(Debug)]
pub struct SceneGraph {
    nodes: SlotMap<EntityKey, EntityNode>,
    root: EntityKey,
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(EntityNode {
            name: "root".to_string(),
            kind: EntityKind::Root,
            transform: Isometry3::identity(),
            parent: None,
            children: Vec::new(),
        });
        Self { nodes, root }
    }

    pub fn root(&self) -> EntityKey {
        self.root
    }

    /// Creates a detached entity at the identity transform.
    pub fn spawn(&mut self, name: impl Into<String>, kind: EntityKind) -> EntityKey {
        self.nodes.insert(EntityNode {
            name: name.into(),
            kind,
            transform: Isometry3::identity(),
            parent: None,
            children: Vec::new(),
        })
    }

    pub fn get(&self, key: EntityKey) -> Option<&EntityNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut EntityNode> {
        self.nodes.get_mut(key)
    }

    pub fn node_mut(&mut self, key: EntityKey) -> Result<&mut EntityNode, SceneError> {
        self.nodes.get_mut(key).ok_or(SceneError::MissingEntity(key))
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Number of live entities, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // the root always exists
        false
    }

    /// Re-parents `child` under `parent`, detaching it from any previous parent.
    pub fn add_child(&mut self, parent: EntityKey, child: EntityKey) -> Result<(), SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::MissingEntity(parent));
        }
        if !self.contains(child) {
            return Err(SceneError::MissingEntity(child));
        }
        if child == self.root || self.is_ancestor(child, parent) {
            return Err(SceneError::Cycle { parent, child });
        }

        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Removes `key` from its parent's children. The entity stays alive.
    pub fn detach(&mut self, key: EntityKey) -> Result<(), SceneError> {
        let parent = self.node_mut(key)?.parent.take();
        if let Some(parent) = parent {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children.retain(|&c| c != key);
            }
        }
        Ok(())
    }

    /// Detaches and destroys `key` and its whole subtree.
    ///
    /// Returns the number of entities destroyed.
    pub fn despawn_recursive(&mut self, key: EntityKey) -> Result<usize, SceneError> {
        if key == self.root {
            return Err(SceneError::RootDespawn);
        }
        self.detach(key)?;

        let mut stack = vec![key];
        let mut removed = 0;
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                stack.extend(node.children);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// All entities below `key`, depth first. `key` itself is not included.
    pub fn descendants(&self, key: EntityKey) -> Vec<EntityKey> {
        let mut out = Vec::new();
        let mut stack: Vec<EntityKey> = match self.nodes.get(key) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.nodes.get(next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// True if `ancestor` is `key` or lies on the path from `key` to the root.
    pub fn is_ancestor(&self, ancestor: EntityKey, key: EntityKey) -> bool {
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            if k == ancestor {
                return true;
            }
            cursor = self.nodes.get(k).and_then(|n| n.parent);
        }
        false
    }

    /// Composes local transforms from the root down to `key`.
    pub fn world_transform(&self, key: EntityKey) -> Option<Isometry3<f32>> {
        let mut transform = self.nodes.get(key)?.transform;
        let mut parent = self.nodes.get(key)?.parent;
        while let Some(p) = parent {
            let node = self.nodes.get(p)?;
            transform = node.transform * transform;
            parent = node.parent;
        }
        Some(transform)
    }

    /// First entity with the given name, for tests and debugging.
    pub fn find_by_name(&self, name: &str) -> Option<EntityKey> {
        self.nodes.iter().find(|(_, n)| n.name == name).map(|(k, _)| k)
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from arena operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("Entity not found: {0:?}")]
    MissingEntity(EntityKey),

    #[error("Parenting {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: EntityKey, child: EntityKey },

    #[error("The scene root cannot be despawned")]
    RootDespawn,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_child_reparents() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn("a", EntityKind::Slot);
        let b = scene.spawn("b", EntityKind::Slot);
        let panel = scene.spawn("panel", EntityKind::Panel { panel_id: "p".into() });

        scene.add_child(a, panel).unwrap();
        scene.add_child(b, panel).unwrap();

        assert!(scene.get(a).unwrap().children().is_empty());
        assert_eq!(scene.get(b).unwrap().children(), &[panel]);
        assert_eq!(scene.get(panel).unwrap().parent(), Some(b));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn("a", EntityKind::Slot);
        let b = scene.spawn("b", EntityKind::Slot);
        scene.add_child(a, b).unwrap();
        assert!(matches!(scene.add_child(b, a), Err(SceneError::Cycle { .. })));
    }

    #[test]
    fn test_despawn_recursive_removes_subtree() {
        let mut scene = SceneGraph::new();
        let root = scene.root();
        let a = scene.spawn("a", EntityKind::Slot);
        let b = scene.spawn("b", EntityKind::Slot);
        let c = scene.spawn("c", EntityKind::Slot);
        scene.add_child(root, a).unwrap();
        scene.add_child(a, b).unwrap();
        scene.add_child(b, c).unwrap();

        assert_eq!(scene.despawn_recursive(a).unwrap(), 3);
        assert!(!scene.contains(c));
        assert!(scene.get(root).unwrap().children().is_empty());
        assert_eq!(scene.len(), 1);
        assert_eq!(scene.despawn_recursive(root), Err(SceneError::RootDespawn));
    }

    #[test]
    fn test_world_transform_composes() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn("a", EntityKind::Slot);
        let b = scene.spawn("b", EntityKind::Slot);
        scene.add_child(scene.root(), a).unwrap();
        scene.add_child(a, b).unwrap();
        scene.get_mut(a).unwrap().set_translation(Vector3::new(1.0, 0.0, 0.0));
        scene.get_mut(b).unwrap().set_translation(Vector3::new(0.0, 2.0, 0.0));

        let world = scene.world_transform(b).unwrap();
        assert_relative_eq!(world.translation.vector, Vector3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_stale_key_after_despawn() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn("a", EntityKind::Slot);
        scene.despawn_recursive(a).unwrap();
        let b = scene.spawn("b", EntityKind::Slot);
        assert!(scene.get(a).is_none());
        assert!(scene.contains(b));
    }
}
