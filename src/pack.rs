//! Scene packing (§4.D/§4.E/§4.F glue): the dirty-flag cascade that turns a
//! [`Scene`] into the flat GPU-layout arrays an [`crate::uploader::Uploader`]
//! consumes, grounded on `scene.cpp`'s `pack_scene_data`/`PackShape`.
//!
//! Packing is incremental: each call only rebuilds the tiers whose dirty
//! bit (or a tier that cascades into it) is set, reusing everything else
//! from the previous call. The cascade mirrors the original's dependency
//! order — textures feed materials, both meshes and materials feed shapes,
//! and shapes feed the scene-wide globals (`shape_count`).

use glam::{Affine3A, Mat4, Vec3};

use crate::atlas;
use crate::error::Result;
use crate::limits::SceneLimits;
use crate::packed::{
    Mat3Std430, PackedMaterial, PackedMeshFace, PackedMeshFaceExtra, PackedMeshNode, PackedMeshVertex,
    PackedShape, PackedShapeNode, PackedTexture, PackedTextureType, PackedTransform, SceneGlobals,
    FALLBACK_MATERIAL_INDEX, TEXTURE_INDEX_NONE,
};
use crate::scene::material::Material;
use crate::scene::mesh_bvh;
use crate::scene::{DirtyFlags, EntityKey, EntityKind, Scene, TextureKey};
use crate::spectrum::{self, SpectrumTable};
use crate::toplevel_bvh;

/// Every flat array an uploader needs, plus the rasterized atlas pages.
/// Persists across frames; [`pack_scene_data`] updates it in place.
#[derive(Debug, Clone, Default)]
pub struct PackedScene {
    pub textures: Vec<PackedTexture>,
    pub materials: Vec<PackedMaterial>,
    pub shapes: Vec<PackedShape>,
    pub shape_nodes: Vec<PackedShapeNode>,
    pub mesh_faces: Vec<PackedMeshFace>,
    pub mesh_face_extras: Vec<PackedMeshFaceExtra>,
    pub mesh_nodes: Vec<PackedMeshNode>,
    pub globals: SceneGlobals,
    pub atlas_images: Vec<atlas::AtlasPage>,
}

/// Repacks whichever tiers of `scene` are dirty (after cascading) into
/// `packed`, clears `scene.dirty_flags`, and returns the set of tiers that
/// were actually rebuilt this call.
pub fn pack_scene_data(
    scene: &mut Scene,
    packed: &mut PackedScene,
    table: &SpectrumTable,
    limits: &SceneLimits,
) -> Result<DirtyFlags> {
    let mut dirty = scene.dirty_flags;
    if dirty.contains(DirtyFlags::TEXTURES) {
        dirty |= DirtyFlags::MATERIALS;
    }
    if dirty.intersects(DirtyFlags::MATERIALS | DirtyFlags::MESHES) {
        dirty |= DirtyFlags::SHAPES;
    }
    if dirty.intersects(DirtyFlags::SHAPES | DirtyFlags::CAMERAS) {
        dirty |= DirtyFlags::GLOBALS;
    }

    if dirty.contains(DirtyFlags::TEXTURES) {
        repack_textures(scene, packed, table, limits)?;
    }
    if dirty.contains(DirtyFlags::MATERIALS) {
        repack_materials(scene, packed, table);
    }
    if dirty.contains(DirtyFlags::MESHES) {
        repack_meshes(scene, packed, limits);
    }
    if dirty.contains(DirtyFlags::SHAPES) {
        repack_shapes(scene, packed);
    }
    if dirty.contains(DirtyFlags::GLOBALS) {
        repack_globals(scene, packed);
    }

    scene.dirty_flags = DirtyFlags::empty();
    Ok(dirty)
}

fn repack_textures(scene: &mut Scene, packed: &mut PackedScene, table: &SpectrumTable, limits: &SceneLimits) -> Result<()> {
    let keys: Vec<TextureKey> = scene.textures.keys().collect();
    let (pages, placements) =
        atlas::pack_textures(keys.iter().map(|&key| &scene.textures[key]), table, limits)?;

    packed.textures = keys
        .iter()
        .zip(&placements)
        .map(|(&key, (placement, flags))| {
            let ty = match scene.textures[key].ty {
                crate::scene::TextureType::Raw => PackedTextureType::Raw,
                crate::scene::TextureType::ReflectanceWithAlpha => PackedTextureType::ReflectanceWithAlpha,
                crate::scene::TextureType::Radiance => PackedTextureType::Radiance,
            };
            PackedTexture {
                atlas_min: placement.uv_min,
                atlas_max: placement.uv_max,
                atlas_image_index: placement.page_index,
                ty: ty as u32,
                flags: *flags,
                pad: 0,
            }
        })
        .collect();
    packed.atlas_images = pages;

    for (index, &key) in keys.iter().enumerate() {
        scene.textures[key].packed_texture_index = Some(index as u32);
    }

    Ok(())
}

fn texture_index(scene: &Scene, key: Option<TextureKey>) -> u32 {
    key.and_then(|k| scene.textures.get(k))
        .and_then(|t| t.packed_texture_index)
        .unwrap_or(TEXTURE_INDEX_NONE)
}

fn pack_material(material: &Material, scene: &Scene, table: &SpectrumTable) -> PackedMaterial {
    let dispersion_ratio = if material.transmission_dispersion_scale == 0.0 {
        0.0
    } else {
        material.transmission_dispersion_abbe_number / material.transmission_dispersion_scale
    };

    PackedMaterial {
        base_color: spectrum::coefficients(table, material.base_color),
        base_color_texture_index: texture_index(scene, material.base_color_texture),

        base_weight: material.base_weight,
        base_metalness: material.base_metalness,
        base_diffuse_roughness: material.base_diffuse_roughness,
        opacity: material.opacity,

        specular_color: spectrum::coefficients(table, material.specular_color),
        specular_roughness_texture_index: texture_index(scene, material.specular_roughness_texture),

        specular_weight: material.specular_weight,
        specular_roughness: material.specular_roughness,
        specular_roughness_anisotropy: material.specular_roughness_anisotropy,
        specular_ior: material.specular_ior,

        transmission_color: spectrum::coefficients(table, material.transmission_color),
        layer_bounce_limit: material.layer_bounce_limit,

        transmission_weight: material.transmission_weight,
        transmission_depth: material.transmission_depth,
        transmission_scatter_anisotropy: material.transmission_scatter_anisotropy,
        transmission_dispersion_abbe_number: material.transmission_dispersion_abbe_number,

        transmission_scatter: spectrum::coefficients(table, material.transmission_scatter),
        transmission_dispersion_ratio: dispersion_ratio,

        coat_color: spectrum::coefficients(table, material.coat_color),
        pad0: 0,

        coat_weight: material.coat_weight,
        coat_roughness: material.coat_roughness,
        coat_roughness_anisotropy: material.coat_roughness_anisotropy,
        coat_ior: material.coat_ior,

        coat_darkening: material.coat_darkening,
        emission_luminance: material.emission_luminance,
        emission_color_texture_index: texture_index(scene, material.emission_color_texture),
        pad1: 0.0,

        emission_color: spectrum::coefficients(table, material.emission_color),
        pad2: 0,
    }
}

fn repack_materials(scene: &mut Scene, packed: &mut PackedScene, table: &SpectrumTable) {
    let keys: Vec<_> = scene.materials.keys().collect();
    packed.materials = std::iter::once(PackedMaterial::fallback())
        .chain(keys.iter().map(|&key| pack_material(&scene.materials[key], scene, table)))
        .collect();
    for (index, &key) in keys.iter().enumerate() {
        scene.materials[key].packed_material_index = Some(index as u32 + 1);
    }
}

fn repack_meshes(scene: &mut Scene, packed: &mut PackedScene, limits: &SceneLimits) {
    packed.mesh_faces.clear();
    packed.mesh_face_extras.clear();
    packed.mesh_nodes.clear();

    let keys: Vec<_> = scene.meshes.keys().collect();
    for key in keys {
        let mesh = &mut scene.meshes[key];
        mesh_bvh::build_mesh_bvh(mesh, limits);

        let face_offset = packed.mesh_faces.len() as u32;
        let node_offset = packed.mesh_nodes.len() as u32;

        for face in &mesh.faces {
            let face_index = packed.mesh_faces.len() as u32;
            packed.mesh_faces.push(PackedMeshFace {
                position0: face.positions[0],
                vertex_index0: face_index,
                position1: face.positions[1],
                vertex_index1: face_index,
                position2: face.positions[2],
                vertex_index2: face_index,
            });
            packed.mesh_face_extras.push(PackedMeshFaceExtra {
                vertices: [
                    PackedMeshVertex {
                        packed_normal: crate::packed::pack_unit_vector(face.normals[0]),
                        packed_uv: crate::packed::pack_uv(face.uvs[0]),
                    },
                    PackedMeshVertex {
                        packed_normal: crate::packed::pack_unit_vector(face.normals[1]),
                        packed_uv: crate::packed::pack_uv(face.uvs[1]),
                    },
                    PackedMeshVertex {
                        packed_normal: crate::packed::pack_unit_vector(face.normals[2]),
                        packed_uv: crate::packed::pack_uv(face.uvs[2]),
                    },
                ],
            });
        }

        for node in &mesh.nodes {
            let (face_begin_or_node_index, face_end_index) = if node.is_leaf() {
                (face_offset + node.face_begin_index, face_offset + node.face_end_index)
            } else {
                (node_offset + node.child_node_index, 0)
            };
            packed.mesh_nodes.push(PackedMeshNode {
                min: node.bounds_min,
                face_begin_or_node_index,
                max: node.bounds_max,
                face_end_index,
            });
        }

        scene.meshes[key].packed_root_node_index = Some(node_offset);
    }
}

/// Matches `path-tracer.h`'s `EPSILON`, used below as the plane's z-thickness.
const EPSILON: f32 = 1e-9;

fn local_bounds(kind: &EntityKind, scene: &Scene) -> Option<(Vec3, Vec3)> {
    match kind {
        EntityKind::Sphere { .. } | EntityKind::Cube { .. } => Some((Vec3::splat(-1.0), Vec3::splat(1.0))),
        // An infinite plane has no true bounding box; a large finite slab
        // keeps it inside the top-level BVH's bounds arithmetic without
        // needing an "unbounded" leaf variant (§9 Open Questions).
        EntityKind::Plane { .. } => {
            Some((Vec3::new(-1.0e9, -1.0e9, -EPSILON), Vec3::new(1.0e9, 1.0e9, EPSILON)))
        }
        EntityKind::MeshInstance { mesh: Some(mesh_key), .. } => {
            let mesh = scene.meshes.get(*mesh_key)?;
            let root = mesh.nodes.first()?;
            Some((root.bounds_min, root.bounds_max))
        }
        EntityKind::MeshInstance { mesh: None, .. } | EntityKind::Root { .. } | EntityKind::Container | EntityKind::Camera => None,
    }
}

fn transform_aabb(matrix: Mat4, min: Vec3, max: Vec3) -> (Vec3, Vec3) {
    let mut out_min = Vec3::splat(f32::INFINITY);
    let mut out_max = Vec3::splat(f32::NEG_INFINITY);
    for i in 0..8u32 {
        let corner = Vec3::new(
            if i & 1 == 0 { min.x } else { max.x },
            if i & 2 == 0 { min.y } else { max.y },
            if i & 4 == 0 { min.z } else { max.z },
        );
        let p = matrix.transform_point3(corner);
        out_min = out_min.min(p);
        out_max = out_max.max(p);
    }
    (out_min, out_max)
}

fn repack_shapes(scene: &mut Scene, packed: &mut PackedScene) {
    packed.shapes.clear();
    packed.shape_nodes.clear();
    let root = scene.root;
    pack_entity_subtree(scene, root, Affine3A::IDENTITY, packed);
    toplevel_bvh::build_top_level_bvh(&mut packed.shape_nodes, packed.shapes.len());
}

fn pack_entity_subtree(scene: &mut Scene, key: EntityKey, parent_world: Affine3A, packed: &mut PackedScene) {
    let (active, mut transform, kind, children) = {
        let entity = &scene.entities[key];
        (entity.active, entity.transform, entity.kind.clone(), entity.children.clone())
    };
    if !active {
        return;
    }

    transform.update_local_matrix();
    let world = parent_world * transform.local_matrix();

    let is_null_mesh_instance = matches!(&kind, EntityKind::MeshInstance { mesh: None, .. });
    if let (Some(shape_type), false) = (kind.shape_type(), is_null_mesh_instance) {
        if let Some((local_min, local_max)) = local_bounds(&kind, scene) {
            let world_mat4 = Mat4::from(world);
            let (world_min, world_max) = transform_aabb(world_mat4, local_min, local_max);

            let material_index = kind
                .material()
                .and_then(|m| scene.materials.get(m))
                .and_then(|m| m.packed_material_index)
                .unwrap_or(FALLBACK_MATERIAL_INDEX);

            let mesh_root_node_index = match &kind {
                EntityKind::MeshInstance { mesh: Some(mesh_key), .. } => {
                    scene.meshes.get(*mesh_key).and_then(|m| m.packed_root_node_index).unwrap_or(0)
                }
                _ => 0,
            };

            let shape_index = packed.shapes.len() as u32;
            packed.shapes.push(PackedShape {
                ty: shape_type as u32,
                material_index,
                mesh_root_node_index,
                pad: 0,
                transform: PackedTransform { to: world_mat4, from: world_mat4.inverse() },
            });
            packed.shape_nodes.push(PackedShapeNode {
                min: world_min,
                child_node_indices: 0,
                max: world_max,
                shape_index,
            });

            scene.entities[key].packed_shape_index = Some(shape_index);
        }
    }

    for child in children {
        pack_entity_subtree(scene, child, world, packed);
    }
}

fn repack_globals(scene: &Scene, packed: &mut PackedScene) {
    let EntityKind::Root { skybox_texture, skybox_brightness, scatter_rate } = &scene.entities[scene.root].kind else {
        debug_assert!(false, "scene root must be EntityKind::Root");
        return;
    };

    packed.globals = SceneGlobals {
        skybox_frame: Mat3Std430::IDENTITY,
        skybox_concentration: 1.0,
        skybox_brightness: *skybox_brightness,
        skybox_texture_index: texture_index(scene, *skybox_texture),
        shape_count: packed.shapes.len() as u32,
        scene_scatter_rate: *scatter_rate,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{EntityKind, Mesh, RawMeshData};

    fn table() -> SpectrumTable {
        SpectrumTable::build_for_srgb(3)
    }

    #[test]
    fn default_scene_packs_one_shape_and_one_material() {
        let mut scene = Scene::new();
        let mut packed = PackedScene::default();
        let limits = SceneLimits::default();
        pack_scene_data(&mut scene, &mut packed, &table(), &limits).unwrap();

        assert_eq!(packed.shapes.len(), 1);
        assert_eq!(packed.materials.len(), 2, "fallback material at slot 0 plus the plane's material");
        assert_eq!(packed.textures.len(), 1);
        assert_eq!(packed.globals.shape_count, 1);
        assert_eq!(packed.shapes[0].ty, crate::packed::ShapeType::Plane as u32);
        assert_eq!(packed.shapes[0].material_index, 1);
    }

    #[test]
    fn repacking_a_clean_scene_rebuilds_nothing() {
        let mut scene = Scene::new();
        let mut packed = PackedScene::default();
        let limits = SceneLimits::default();
        pack_scene_data(&mut scene, &mut packed, &table(), &limits).unwrap();

        let rebuilt = pack_scene_data(&mut scene, &mut packed, &table(), &limits).unwrap();
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn scaled_sphere_world_bounds_reflect_its_transform() {
        let mut scene = Scene::empty();
        let material = scene.create_material("m");
        let sphere = scene.create_entity("sphere", EntityKind::Sphere { material: Some(material) }, None);
        scene.entities[sphere].transform.set_position(Vec3::new(0.0, 0.0, 1.0));
        scene.entities[sphere].transform.set_scale(Vec3::splat(0.5));

        let mut packed = PackedScene::default();
        pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

        assert_eq!(packed.shapes.len(), 1);
        let node = packed.shape_nodes[0];
        assert!((node.min.z - 0.5).abs() < 1e-4);
        assert!((node.max.z - 1.5).abs() < 1e-4);
    }

    #[test]
    fn shape_with_no_material_falls_back_to_the_reserved_slot_zero() {
        let mut scene = Scene::empty();
        scene.create_entity("bare sphere", EntityKind::Sphere { material: None }, None);

        let mut packed = PackedScene::default();
        pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

        assert_eq!(packed.shapes.len(), 1);
        assert_eq!(packed.shapes[0].material_index, FALLBACK_MATERIAL_INDEX);
        assert_eq!(packed.materials.len(), 1, "no user materials were created, just the fallback");
        assert!((packed.materials[0].specular_ior - 1.5).abs() < 1e-6);
        assert_eq!(packed.materials[0].layer_bounce_limit, 8);
        assert!((packed.materials[0].base_weight - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mesh_instance_with_null_mesh_is_skipped() {
        let mut scene = Scene::empty();
        scene.create_entity("floating", EntityKind::MeshInstance { mesh: None, material: None }, None);

        let mut packed = PackedScene::default();
        pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();
        assert!(packed.shapes.is_empty());
    }

    #[test]
    fn mesh_instance_packs_faces_and_is_reachable_from_the_shape() {
        let mut scene = Scene::empty();
        let mesh = scene.create_mesh(Mesh::from_raw(
            "tri",
            RawMeshData { positions: vec![[Vec3::ZERO, Vec3::X, Vec3::Y]], normals: None, uvs: None },
        ));
        let material = scene.create_material("m");
        scene.create_entity(
            "instance",
            EntityKind::MeshInstance { mesh: Some(mesh), material: Some(material) },
            None,
        );

        let mut packed = PackedScene::default();
        pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

        assert_eq!(packed.shapes.len(), 1);
        assert_eq!(packed.mesh_faces.len(), 1);
        let root_index = packed.shapes[0].mesh_root_node_index;
        let root_node = packed.mesh_nodes[root_index as usize];
        assert!(root_node.is_leaf());
    }
}
