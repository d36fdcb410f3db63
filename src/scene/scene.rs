//! The scene graph and its owning collections (§3), grounded on
//! `scene.cpp`'s `scene`/`CreateEntity`/`DestroyEntity`/`DestroyTexture`/
//! `DestroyMaterial`/`DestroyMesh`/`CreateScene` and the teacher's
//! `SlotMap`-based `Scene`.

use bitflags::bitflags;
use slotmap::SlotMap;

use super::entity::{Entity, EntityKey, EntityKind};
use super::material::{Material, MaterialKey};
use super::mesh::{Mesh, MeshKey};
use super::prefab::{Prefab, PrefabNode};
use super::texture::{Texture, TextureKey, TextureType};

bitflags! {
    /// Which packed tiers require rebuilding (§3 "Dirty flags").
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        const TEXTURES  = 1 << 0;
        const MATERIALS = 1 << 1;
        const MESHES    = 1 << 2;
        const SHAPES    = 1 << 3;
        const GLOBALS   = 1 << 4;
        const CAMERAS   = 1 << 5;
        const ALL = Self::TEXTURES.bits()
            | Self::MATERIALS.bits()
            | Self::MESHES.bits()
            | Self::SHAPES.bits()
            | Self::GLOBALS.bits()
            | Self::CAMERAS.bits();
    }
}

/// The scene graph plus every owning collection it references into
/// (§3 "Scene-owned collections"). Packed shadow collections
/// (`texture_pack`, `shape_pack`, ...) live alongside this in
/// [`crate::pack::PackedScene`], produced by [`crate::pack::pack_scene_data`].
pub struct Scene {
    pub entities: SlotMap<EntityKey, Entity>,
    pub root: EntityKey,

    pub textures: SlotMap<TextureKey, Texture>,
    pub materials: SlotMap<MaterialKey, Material>,
    pub meshes: SlotMap<MeshKey, Mesh>,
    pub prefabs: Vec<Prefab>,

    pub dirty_flags: DirtyFlags,
}

impl Scene {
    /// An empty scene: just a root container, no default content.
    #[must_use]
    pub fn empty() -> Self {
        let mut entities = SlotMap::with_key();
        let root = entities.insert(Entity::new(
            "Scene",
            EntityKind::Root { skybox_texture: None, skybox_brightness: 1.0, scatter_rate: 0.0 },
        ));

        Self {
            entities,
            root,
            textures: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            prefabs: Vec::new(),
            dirty_flags: DirtyFlags::ALL,
        }
    }

    /// Builds the default scene: a ground plane with a checkerboard
    /// material and a camera at `(0, 0, 1)` (§8 scenario 1, grounded on
    /// `CreateScene`).
    #[must_use]
    pub fn new() -> Self {
        let mut scene = Self::empty();

        let material_key = scene.create_material("Plane Material");
        let checker_texture = scene.create_checker_texture(
            "Plane Texture",
            TextureType::ReflectanceWithAlpha,
            [1.0, 1.0, 1.0, 1.0],
            [0.5, 0.5, 0.5, 1.0],
        );
        scene.textures[checker_texture].nearest_filter = true;
        scene.materials[material_key].base_color_texture = Some(checker_texture);

        let plane = scene.create_entity(
            "Plane",
            EntityKind::Plane { material: Some(material_key) },
            None,
        );
        let _ = plane;

        let camera = scene.create_entity("Camera", EntityKind::Camera, None);
        scene.entities[camera].transform.set_position(glam::Vec3::new(0.0, 0.0, 1.0));

        scene.dirty_flags = DirtyFlags::ALL;
        scene
    }

    // === Entity lifecycle ===================================================

    /// Creates a new entity and attaches it under `parent` (defaulting to
    /// the scene root).
    pub fn create_entity(&mut self, name: impl Into<String>, kind: EntityKind, parent: Option<EntityKey>) -> EntityKey {
        let parent = parent.unwrap_or(self.root);
        let mut entity = Entity::new(name, kind);
        entity.parent = Some(parent);
        let key = self.entities.insert(entity);
        self.entities[parent].children.push(key);

        self.dirty_flags |= DirtyFlags::SHAPES;
        key
    }

    /// Destroys an entity and its entire subtree, detaching it from its
    /// parent first (grounded on `DestroyEntity`'s recursive child walk).
    pub fn destroy_entity(&mut self, key: EntityKey) {
        if let Some(parent) = self.entities[key].parent {
            self.entities[parent].children.retain(|&child| child != key);
        }
        self.destroy_entity_subtree(key);
        self.dirty_flags |= DirtyFlags::SHAPES;
    }

    fn destroy_entity_subtree(&mut self, key: EntityKey) {
        let children = self.entities[key].children.clone();
        for child in children {
            self.destroy_entity_subtree(child);
        }
        self.entities.remove(key);
    }

    /// Applies `visitor` to every active entity in the tree, depth-first,
    /// skipping inactive subtrees. Mirrors `ForEachEntity`/the packer's
    /// own traversal discipline.
    pub fn for_each_active_entity(&self, mut visitor: impl FnMut(EntityKey, &Entity)) {
        self.for_each_active_entity_from(self.root, &mut visitor);
    }

    fn for_each_active_entity_from(&self, key: EntityKey, visitor: &mut impl FnMut(EntityKey, &Entity)) {
        let entity = &self.entities[key];
        if !entity.active {
            return;
        }
        visitor(key, entity);
        for &child in &entity.children {
            self.for_each_active_entity_from(child, visitor);
        }
    }

    fn for_each_entity_mut(&mut self, key: EntityKey, visitor: &mut impl FnMut(&mut Entity)) {
        let children = self.entities[key].children.clone();
        visitor(&mut self.entities[key]);
        for child in children {
            self.for_each_entity_mut(child, visitor);
        }
    }

    // === Texture lifecycle ===================================================

    pub fn create_texture(&mut self, texture: Texture) -> TextureKey {
        let key = self.textures.insert(texture);
        self.dirty_flags |= DirtyFlags::TEXTURES;
        key
    }

    /// Grounded on `CreateCheckerTexture`.
    pub fn create_checker_texture(
        &mut self,
        name: impl Into<String>,
        ty: TextureType,
        color_a: [f32; 4],
        color_b: [f32; 4],
    ) -> TextureKey {
        self.create_texture(Texture::checkerboard(name, ty, color_a, color_b))
    }

    /// Destroys a texture, scrubbing every material reference to it
    /// across the whole entity tree and all prefabs (grounded on
    /// `DestroyTexture`: this needs a full scan because materials hold
    /// texture references as plain `Option<TextureKey>` fields rather
    /// than through a reverse index).
    pub fn destroy_texture(&mut self, key: TextureKey) {
        let mut materials_dirty = false;
        for (_, material) in self.materials.iter_mut() {
            for slot in material.texture_refs_mut() {
                if *slot == Some(key) {
                    *slot = None;
                    materials_dirty = true;
                }
            }
        }

        self.textures.remove(key);

        self.dirty_flags |= DirtyFlags::TEXTURES;
        if materials_dirty {
            self.dirty_flags |= DirtyFlags::MATERIALS;
        }
    }

    // === Material lifecycle ==================================================

    pub fn create_material(&mut self, name: impl Into<String>) -> MaterialKey {
        let key = self.materials.insert(Material::new(name));
        self.dirty_flags |= DirtyFlags::MATERIALS;
        key
    }

    /// Destroys a material, scrubbing references from every shape entity
    /// (live tree and prefabs) and raising `SHAPES` if any were cleared.
    pub fn destroy_material(&mut self, key: MaterialKey) {
        let mut shapes_dirty = false;

        let root = self.root;
        self.for_each_entity_mut(root, &mut |entity| {
            if entity.kind.clear_material_ref(key) {
                shapes_dirty = true;
            }
        });

        for prefab in &mut self.prefabs {
            clear_material_ref_in_prefab(&mut prefab.root, key);
        }

        self.materials.remove(key);

        self.dirty_flags |= DirtyFlags::MATERIALS;
        if shapes_dirty {
            self.dirty_flags |= DirtyFlags::SHAPES;
        }
    }

    // === Mesh lifecycle =======================================================

    pub fn create_mesh(&mut self, mesh: Mesh) -> MeshKey {
        let key = self.meshes.insert(mesh);
        self.dirty_flags |= DirtyFlags::MESHES;
        key
    }

    /// Destroys a mesh, scrubbing `MeshInstance` references across the
    /// live tree and prefabs (grounded on `DestroyMesh`).
    pub fn destroy_mesh(&mut self, key: MeshKey) {
        let mut shapes_dirty = false;

        let root = self.root;
        self.for_each_entity_mut(root, &mut |entity| {
            if entity.kind.clear_mesh_ref(key) {
                shapes_dirty = true;
            }
        });

        for prefab in &mut self.prefabs {
            clear_mesh_ref_in_prefab(&mut prefab.root, key);
        }

        self.meshes.remove(key);

        self.dirty_flags |= DirtyFlags::MESHES;
        if shapes_dirty {
            self.dirty_flags |= DirtyFlags::SHAPES;
        }
    }

    // === Prefab lifecycle =====================================================

    pub fn create_prefab(&mut self, root: PrefabNode) -> usize {
        self.prefabs.push(Prefab::new(root));
        self.prefabs.len() - 1
    }

    pub fn destroy_prefab(&mut self, index: usize) {
        self.prefabs.remove(index);
    }

    /// Instantiates a prefab's template tree into the live scene under
    /// `parent` (grounded on `CreateEntity(scene*, prefab*, entity*)`).
    pub fn instantiate_prefab(&mut self, prefab_index: usize, parent: Option<EntityKey>) -> EntityKey {
        let parent = parent.unwrap_or(self.root);
        let template = self.prefabs[prefab_index].root.clone();
        self.instantiate_node(&template, parent)
    }

    fn instantiate_node(&mut self, template: &PrefabNode, parent: EntityKey) -> EntityKey {
        let key = self.create_entity(template.name.clone(), template.kind.clone(), Some(parent));
        self.entities[key].transform = template.transform;
        for child_template in &template.children {
            self.instantiate_node(child_template, key);
        }
        key
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

fn clear_material_ref_in_prefab(node: &mut PrefabNode, key: MaterialKey) {
    node.kind.clear_material_ref(key);
    for child in &mut node.children {
        clear_material_ref_in_prefab(child, key);
    }
}

fn clear_mesh_ref_in_prefab(node: &mut PrefabNode, key: MeshKey) {
    node.kind.clear_mesh_ref(key);
    for child in &mut node.children {
        clear_mesh_ref_in_prefab(child, key);
    }
}
