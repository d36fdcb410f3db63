//! Scene Packing Scenario Tests
//!
//! Exercises the six concrete scenarios and the dirty-flag propagation
//! invariants named for the packing pipeline: default scene, a scaled
//! sphere, a 12-face cube mesh, atlas page overflow, shared-texture
//! destruction, and a straight-down plane hit.

use glam::Vec3;
use pathtracer_scene::{pack_scene_data, DirtyFlags, EntityKind, PackedScene, Scene, SpectrumTable};
use pathtracer_scene::limits::SceneLimits;
use pathtracer_scene::scene::{Mesh, RawMeshData};
use pathtracer_scene::tracer::{trace, Ray, TraceScene};

fn table() -> SpectrumTable {
    SpectrumTable::build_for_srgb(3)
}

fn cube_raw() -> RawMeshData {
    let corners = [
        Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, -1.0), Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0), Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0), Vec3::new(-1.0, 1.0, 1.0),
    ];
    let quads: [[usize; 4]; 6] = [
        [0, 1, 2, 3], [5, 4, 7, 6], [4, 0, 3, 7],
        [1, 5, 6, 2], [3, 2, 6, 7], [4, 5, 1, 0],
    ];
    let mut positions = Vec::with_capacity(12);
    for quad in quads {
        positions.push([corners[quad[0]], corners[quad[1]], corners[quad[2]]]);
        positions.push([corners[quad[0]], corners[quad[2]], corners[quad[3]]]);
    }
    RawMeshData { positions, normals: None, uvs: None }
}

#[test]
fn scenario_1_default_scene_packs_a_single_leaf_shape() {
    let mut scene = Scene::new();
    let mut packed = PackedScene::default();
    pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

    assert_eq!(packed.shapes.len(), 1);
    assert_eq!(packed.shape_nodes.len(), 1);
    assert!(packed.shape_nodes[0].is_leaf());
    assert_eq!(packed.globals.shape_count, 1);
}

#[test]
fn scenario_2_sphere_at_origin_offset_hits_at_expected_time() {
    let mut scene = Scene::new();
    let material = scene.create_material("sphere material");
    let sphere = scene.create_entity("sphere", EntityKind::Sphere { material: Some(material) }, None);
    scene.entities[sphere].transform.set_position(Vec3::new(0.0, 0.0, 1.0));
    scene.entities[sphere].transform.set_scale(Vec3::splat(0.5));

    let mut packed = PackedScene::default();
    pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

    assert_eq!(packed.shapes.len(), 2);
    assert!(!packed.shape_nodes[0].is_leaf(), "two shapes should merge into an internal root");

    let trace_scene = TraceScene { shapes: &packed.shapes, mesh_nodes: &packed.mesh_nodes, mesh_faces: &packed.mesh_faces };
    let ray = Ray::new(Vec3::new(0.0, -5.0, 1.0), Vec3::new(0.0, 1.0, 0.0));
    let hit = trace(&trace_scene, ray, &SceneLimits::default()).unwrap();
    assert!((hit.time - 4.5).abs() < 1e-3, "expected time near 4.5, got {}", hit.time);
    assert_eq!(hit.shape_type, pathtracer_scene::packed::ShapeType::Sphere);
}

#[test]
fn scenario_3_cube_mesh_bvh_is_shallow_and_ray_hits_with_valid_barycentrics() {
    let mut scene = Scene::empty();
    let mesh_key = scene.create_mesh(Mesh::from_raw("cube", cube_raw()));
    let material = scene.create_material("cube material");
    scene.create_entity(
        "cube instance",
        EntityKind::MeshInstance { mesh: Some(mesh_key), material: Some(material) },
        None,
    );

    let mut packed = PackedScene::default();
    pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

    assert_eq!(packed.mesh_faces.len(), 12);
    assert!(packed.mesh_nodes.len() <= 5, "expected <=5 BVH nodes, got {}", packed.mesh_nodes.len());
    assert!(scene.meshes[mesh_key].depth <= 3, "expected depth <=3, got {}", scene.meshes[mesh_key].depth);

    let trace_scene = TraceScene { shapes: &packed.shapes, mesh_nodes: &packed.mesh_nodes, mesh_faces: &packed.mesh_faces };
    let ray = Ray::new(Vec3::new(-5.0, 0.3, 0.2), Vec3::new(1.0, 0.0, 0.0));
    let hit = trace(&trace_scene, ray, &SceneLimits::default()).unwrap();
    assert_eq!(hit.shape_type, pathtracer_scene::packed::ShapeType::MeshInstance);
    let sum = hit.primitive_coordinates.x + hit.primitive_coordinates.y + hit.primitive_coordinates.z;
    assert!((sum - 1.0).abs() < 1e-5, "barycentric coordinates should sum to 1, got {sum}");
}

#[test]
fn scenario_4_two_oversized_plus_one_medium_texture_need_two_atlas_pages() {
    use pathtracer_scene::scene::TextureType;

    let mut scene = Scene::empty();
    for i in 0..2 {
        scene.create_texture(pathtracer_scene::Texture::new(
            format!("big{i}"),
            TextureType::Raw,
            3000,
            3000,
            vec![1.0; 3000 * 3000 * 4],
        ));
    }
    scene.create_texture(pathtracer_scene::Texture::new(
        "medium",
        TextureType::Raw,
        2000,
        2000,
        vec![0.5; 2000 * 2000 * 4],
    ));

    let mut packed = PackedScene::default();
    pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

    assert_eq!(packed.atlas_images.len(), 2);
    assert_eq!(packed.textures.len(), 3);
    assert!(packed.textures.iter().all(|t| t.atlas_min.x > 0.0));

    let unique: std::collections::HashSet<_> = packed
        .textures
        .iter()
        .map(|t| (t.atlas_image_index, t.atlas_min.x.to_bits(), t.atlas_min.y.to_bits()))
        .collect();
    assert_eq!(unique.len(), 3);
}

#[test]
fn scenario_5_destroying_a_shared_texture_scrubs_three_materials_and_sets_dirty_mask() {
    use pathtracer_scene::scene::TextureType;

    let mut scene = Scene::empty();
    let texture = scene.create_checker_texture(
        "shared",
        TextureType::Raw,
        [1.0, 1.0, 1.0, 1.0],
        [0.0, 0.0, 0.0, 1.0],
    );
    let materials: Vec<_> = (0..3)
        .map(|i| {
            let m = scene.create_material(format!("m{i}"));
            scene.materials[m].base_color_texture = Some(texture);
            m
        })
        .collect();

    let mut packed = PackedScene::default();
    pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

    scene.destroy_texture(texture);
    let rebuilt = pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

    for m in materials {
        assert_eq!(scene.materials[m].base_color_texture, None);
    }
    assert!(rebuilt.contains(DirtyFlags::TEXTURES | DirtyFlags::MATERIALS));
}

#[test]
fn scenario_6_straight_down_ray_hits_the_default_planes_origin() {
    let mut scene = Scene::new();
    let mut packed = PackedScene::default();
    pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

    let trace_scene = TraceScene { shapes: &packed.shapes, mesh_nodes: &packed.mesh_nodes, mesh_faces: &packed.mesh_faces };
    let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
    let hit = trace(&trace_scene, ray, &SceneLimits::default()).unwrap();

    assert!((hit.time - 10.0).abs() < 1e-4);
    let fx = hit.primitive_coordinates.x.fract();
    let fy = hit.primitive_coordinates.y.fract();
    assert!(fx.abs() < 1e-4 || (1.0 - fx).abs() < 1e-4);
    assert!(fy.abs() < 1e-4 || (1.0 - fy).abs() < 1e-4);
}

#[test]
fn dirty_flag_propagation_cascades_through_the_documented_chain() {
    let mut scene = Scene::new();
    let mut packed = PackedScene::default();
    pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();

    scene.dirty_flags = DirtyFlags::TEXTURES;
    let rebuilt = pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();
    assert!(rebuilt.contains(DirtyFlags::TEXTURES | DirtyFlags::MATERIALS | DirtyFlags::SHAPES | DirtyFlags::GLOBALS));

    scene.dirty_flags = DirtyFlags::MESHES;
    let rebuilt = pack_scene_data(&mut scene, &mut packed, &table(), &SceneLimits::default()).unwrap();
    assert!(rebuilt.contains(DirtyFlags::MESHES | DirtyFlags::SHAPES | DirtyFlags::GLOBALS));
    assert!(!rebuilt.contains(DirtyFlags::TEXTURES));
}
