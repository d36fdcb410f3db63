//! Scene graph entities: a tagged-variant tree node (§3, §9 "Entity
//! polymorphism" — re-architects the original's class-hierarchy/downcast
//! pattern as an enum with an exhaustive match).

use slotmap::new_key_type;

use super::material::MaterialKey;
use super::mesh::MeshKey;
use super::texture::TextureKey;
use super::transform::Transform;
use crate::packed::ShapeType;

new_key_type! {
    /// Stable handle into [`Scene::entities`](super::scene::Scene::entities).
    pub struct EntityKey;
}

/// Variant-specific payload, keyed by entity type (§3).
#[derive(Debug, Clone)]
pub enum EntityKind {
    /// The single scene root; carries skybox/scatter globals in addition
    /// to the common entity fields.
    Root {
        skybox_texture: Option<TextureKey>,
        skybox_brightness: f32,
        scatter_rate: f32,
    },
    /// A grouping node with no rendering payload of its own.
    Container,
    /// A camera. The core does not consume camera parameters beyond
    /// carrying them through the tree (rendering is out of scope per §1).
    Camera,
    MeshInstance { mesh: Option<MeshKey>, material: Option<MaterialKey> },
    Plane { material: Option<MaterialKey> },
    Sphere { material: Option<MaterialKey> },
    Cube { material: Option<MaterialKey> },
}

impl EntityKind {
    /// The packed shape type for leaf shape entities, or `None` for
    /// entities that never become a packed shape (§4.D: "Mesh instances
    /// with null mesh pointer are skipped silently").
    #[must_use]
    pub fn shape_type(&self) -> Option<ShapeType> {
        match self {
            EntityKind::MeshInstance { .. } => Some(ShapeType::MeshInstance),
            EntityKind::Plane { .. } => Some(ShapeType::Plane),
            EntityKind::Sphere { .. } => Some(ShapeType::Sphere),
            EntityKind::Cube { .. } => Some(ShapeType::Cube),
            EntityKind::Root { .. } | EntityKind::Container | EntityKind::Camera => None,
        }
    }

    /// The material slot this variant references, if any.
    #[must_use]
    pub fn material(&self) -> Option<MaterialKey> {
        match self {
            EntityKind::MeshInstance { material, .. }
            | EntityKind::Plane { material }
            | EntityKind::Sphere { material }
            | EntityKind::Cube { material } => *material,
            EntityKind::Root { .. } | EntityKind::Container | EntityKind::Camera => None,
        }
    }

    /// Clears any material reference equal to `key`. Returns whether a
    /// reference was cleared.
    pub(crate) fn clear_material_ref(&mut self, key: MaterialKey) -> bool {
        let slot = match self {
            EntityKind::MeshInstance { material, .. }
            | EntityKind::Plane { material }
            | EntityKind::Sphere { material }
            | EntityKind::Cube { material } => material,
            EntityKind::Root { .. } | EntityKind::Container | EntityKind::Camera => return false,
        };
        if *slot == Some(key) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Clears a mesh reference equal to `key` (only `MeshInstance` holds one).
    pub(crate) fn clear_mesh_ref(&mut self, key: MeshKey) -> bool {
        if let EntityKind::MeshInstance { mesh, .. } = self {
            if *mesh == Some(key) {
                *mesh = None;
                return true;
            }
        }
        false
    }
}

/// A scene graph node: hierarchy + transform + variant payload.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub active: bool,
    pub transform: Transform,
    pub kind: EntityKind,

    pub(crate) parent: Option<EntityKey>,
    pub(crate) children: Vec<EntityKey>,
    pub(crate) packed_shape_index: Option<u32>,
}

impl Entity {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            active: true,
            transform: Transform::new(),
            kind,
            parent: None,
            children: Vec::new(),
            packed_shape_index: None,
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<EntityKey> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[EntityKey] {
        &self.children
    }

    #[must_use]
    pub fn packed_shape_index(&self) -> Option<u32> {
        self.packed_shape_index
    }
}
