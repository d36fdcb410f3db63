//! Detached entity subtrees (§3), grounded on `scene.cpp`'s
//! `LoadModelAsPrefab`/`CreateEntity(scene*, prefab*, entity*)`.
//!
//! A prefab owns a standalone tree of entity templates that is not part
//! of the live scene graph until instantiated. Templates reference the
//! same material/mesh/texture arenas as live entities (those are created
//! directly in the scene's owning collections regardless of whether the
//! referencing entity is live or templated).

use super::entity::EntityKind;
use super::transform::Transform;

/// One node of a prefab's template tree.
#[derive(Debug, Clone)]
pub struct PrefabNode {
    pub name: String,
    pub transform: Transform,
    pub kind: EntityKind,
    pub children: Vec<PrefabNode>,
}

impl PrefabNode {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            transform: Transform::new(),
            kind,
            children: Vec::new(),
        }
    }
}

/// A scene-owned prefab: a detached entity subtree that can be
/// instantiated into the live tree any number of times.
#[derive(Debug, Clone)]
pub struct Prefab {
    pub root: PrefabNode,
}

impl Prefab {
    #[must_use]
    pub fn new(root: PrefabNode) -> Self {
        Self { root }
    }
}
