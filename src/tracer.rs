//! Ray/scene intersection (§4.F), grounded verbatim on `trace.cpp`'s
//! `Trace`/`Intersect`/`IntersectShape`/`IntersectMesh`/`IntersectMeshFace`.
//!
//! The CPU tracer deliberately scans `shape_pack` linearly rather than
//! descending the packed top-level BVH (§9 Open Questions): that BVH is
//! built for the GPU uploader, and the CPU path is only used for
//! mouse-rate picking where a flat scan is cheap enough.

use glam::Vec3;

use crate::limits::SceneLimits;
use crate::packed::{PackedMeshFace, PackedMeshNode, PackedShape, ShapeType, SHAPE_INDEX_NONE};

/// A world-space ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub vector: Vec3,
}

impl Ray {
    #[must_use]
    pub fn new(origin: Vec3, vector: Vec3) -> Self {
        Self { origin, vector }
    }

    fn transform(&self, matrix: glam::Mat4) -> Self {
        Self {
            origin: matrix.transform_point3(self.origin),
            vector: matrix.transform_vector3(self.vector),
        }
    }
}

/// A ray/scene intersection result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub time: f32,
    pub shape_type: ShapeType,
    pub shape_index: u32,
    pub primitive_index: u32,
    pub primitive_coordinates: Vec3,
}

impl Hit {
    fn none() -> Self {
        Self {
            time: f32::INFINITY,
            shape_type: ShapeType::Plane,
            shape_index: SHAPE_INDEX_NONE,
            primitive_index: 0,
            primitive_coordinates: Vec3::ZERO,
        }
    }
}

/// The packed arrays the tracer reads; a minimal read-only view over
/// [`crate::pack::PackedScene`] (decoupled here so the tracer can be
/// exercised without the rest of the packing pipeline).
pub struct TraceScene<'a> {
    pub shapes: &'a [PackedShape],
    pub mesh_nodes: &'a [PackedMeshNode],
    pub mesh_faces: &'a [PackedMeshFace],
}

/// Traces `ray` against every shape in `scene`, returning the closest hit
/// (if any). Total and pure: always returns a result, `Some` iff a finite
/// hit time was found.
#[must_use]
pub fn trace(scene: &TraceScene<'_>, ray: Ray, limits: &SceneLimits) -> Option<Hit> {
    let mut hit = Hit::none();

    for shape_index in 0..scene.shapes.len() {
        intersect_shape(scene, ray, shape_index as u32, &mut hit, limits);
    }

    if hit.time.is_finite() {
        Some(hit)
    } else {
        None
    }
}

fn intersect_shape(scene: &TraceScene<'_>, world_ray: Ray, shape_index: u32, hit: &mut Hit, limits: &SceneLimits) {
    let shape = &scene.shapes[shape_index as usize];
    let local_ray = world_ray.transform(shape.transform.from);

    match shape.shape_type() {
        ShapeType::MeshInstance => {
            intersect_mesh(scene, local_ray, shape.mesh_root_node_index, hit, limits);
            if hit.shape_index == SHAPE_INDEX_NONE && hit.time.is_finite() {
                hit.shape_index = shape_index;
            }
        }
        ShapeType::Plane => {
            let t = -local_ray.origin.z / local_ray.vector.z;
            if t < 0.0 || t >= hit.time {
                return;
            }
            let uv = local_ray.origin.truncate() + local_ray.vector.truncate() * t;
            hit.time = t;
            hit.shape_type = ShapeType::Plane;
            hit.shape_index = shape_index;
            hit.primitive_index = 0;
            hit.primitive_coordinates = Vec3::new(uv.x.fract(), uv.y.fract(), 0.0);
        }
        ShapeType::Sphere => {
            let v = local_ray.vector.dot(local_ray.vector);
            let p = local_ray.origin.dot(local_ray.vector);
            let q = local_ray.origin.dot(local_ray.origin) - 1.0;
            let d2 = p * p - q * v;
            if d2 < 0.0 {
                return;
            }
            let d = d2.sqrt();
            if d < p {
                return;
            }
            let s0 = -p - d;
            let s1 = -p + d;
            let s = if s0 < 0.0 { s1 } else { s0 };
            if s < 0.0 || s > v * hit.time {
                return;
            }
            hit.time = s / v;
            hit.shape_type = ShapeType::Sphere;
            hit.shape_index = shape_index;
            hit.primitive_index = 0;
            hit.primitive_coordinates = local_ray.origin + local_ray.vector * hit.time;
        }
        ShapeType::Cube => {
            let minimum = (Vec3::splat(-1.0) - local_ray.origin) / local_ray.vector;
            let maximum = (Vec3::splat(1.0) - local_ray.origin) / local_ray.vector;
            let earlier = minimum.min(maximum);
            let later = minimum.max(maximum);
            let t0 = earlier.x.max(earlier.y).max(earlier.z);
            let t1 = later.x.min(later.y).min(later.z);
            if t1 < t0 || t1 <= 0.0 || t0 >= hit.time {
                return;
            }
            let t = if t0 < 0.0 { t1 } else { t0 };
            hit.time = t;
            hit.shape_type = ShapeType::Cube;
            hit.shape_index = shape_index;
            hit.primitive_index = 0;
            hit.primitive_coordinates = local_ray.origin + local_ray.vector * t;
        }
    }
}

fn intersect_mesh_node_bounds(ray: Ray, reach: f32, node: &PackedMeshNode) -> f32 {
    let minimum = (node.min - ray.origin) / ray.vector;
    let maximum = (node.max - ray.origin) / ray.vector;

    let earlier = minimum.min(maximum);
    let later = minimum.max(maximum);

    let entry = earlier.x.max(earlier.y).max(earlier.z);
    let exit = later.x.min(later.y).min(later.z);

    if exit < entry || exit <= 0.0 || entry >= reach {
        f32::INFINITY
    } else {
        entry
    }
}

fn intersect_mesh(scene: &TraceScene<'_>, ray: Ray, root_node_index: u32, hit: &mut Hit, limits: &SceneLimits) {
    let mut stack = vec![0u32; limits.mesh_traversal_stack_depth];
    let mut depth = 0usize;

    let mut node = scene.mesh_nodes[root_node_index as usize];

    loop {
        if node.is_leaf() {
            for face_index in node.face_begin_or_node_index..node.face_end_index {
                intersect_mesh_face(scene, ray, face_index, hit);
            }
        } else {
            let index = node.face_begin_or_node_index;
            let mut candidate = scene.mesh_nodes[index as usize];
            let time = intersect_mesh_node_bounds(ray, hit.time, &candidate);

            let index_b = index + 1;
            let candidate_b = scene.mesh_nodes[index_b as usize];
            let time_b = intersect_mesh_node_bounds(ray, hit.time, &candidate_b);

            if time > time_b {
                if time.is_finite() {
                    debug_assert!(depth < stack.len(), "mesh BVH traversal stack overflow");
                    stack[depth] = index;
                    depth += 1;
                }
                node = candidate_b;
                continue;
            }

            if time_b.is_finite() {
                debug_assert!(depth < stack.len(), "mesh BVH traversal stack overflow");
                stack[depth] = index_b;
                depth += 1;
                continue;
            }

            if time.is_finite() {
                candidate = scene.mesh_nodes[index as usize];
                node = candidate;
                continue;
            }
        }

        if depth == 0 {
            break;
        }
        depth -= 1;
        node = scene.mesh_nodes[stack[depth] as usize];
    }
}

fn intersect_mesh_face(scene: &TraceScene<'_>, ray: Ray, face_index: u32, hit: &mut Hit) {
    const EPSILON: f32 = 1e-7;

    let face = scene.mesh_faces[face_index as usize];

    let edge1 = face.position1 - face.position0;
    let edge2 = face.position2 - face.position0;

    let ray_cross_edge2 = ray.vector.cross(edge2);
    let det = edge1.dot(ray_cross_edge2);
    if det.abs() < EPSILON {
        return;
    }

    let inv_det = 1.0 / det;

    let s = ray.origin - face.position0;
    let u = inv_det * s.dot(ray_cross_edge2);
    if !(0.0..=1.0).contains(&u) {
        return;
    }

    let s_cross_edge1 = s.cross(edge1);
    let v = inv_det * ray.vector.dot(s_cross_edge1);
    if v < 0.0 || u + v > 1.0 {
        return;
    }

    let t = inv_det * edge2.dot(s_cross_edge1);
    if t < 0.0 || t > hit.time {
        return;
    }

    hit.time = t;
    hit.shape_type = ShapeType::MeshInstance;
    hit.shape_index = SHAPE_INDEX_NONE;
    hit.primitive_index = face_index;
    hit.primitive_coordinates = Vec3::new(1.0 - u - v, u, v);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::PackedTransform;

    fn plane_shape() -> PackedShape {
        PackedShape {
            ty: ShapeType::Plane as u32,
            material_index: 0,
            mesh_root_node_index: 0,
            pad: 0,
            transform: PackedTransform::default(),
        }
    }

    fn sphere_shape_at(z: f32, scale: f32) -> PackedShape {
        let to = glam::Mat4::from_scale_rotation_translation(
            Vec3::splat(scale),
            glam::Quat::IDENTITY,
            Vec3::new(0.0, 0.0, z),
        );
        PackedShape {
            ty: ShapeType::Sphere as u32,
            material_index: 0,
            mesh_root_node_index: 0,
            pad: 0,
            transform: crate::packed::PackedTransform { to, from: to.inverse() },
        }
    }

    #[test]
    fn ray_straight_down_hits_default_plane_at_origin() {
        let shapes = vec![plane_shape()];
        let scene = TraceScene { shapes: &shapes, mesh_nodes: &[], mesh_faces: &[] };
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = trace(&scene, ray, &SceneLimits::default()).unwrap();
        assert!((hit.time - 10.0).abs() < 1e-4);
        assert_eq!(hit.shape_type, ShapeType::Plane);
    }

    #[test]
    fn ray_misses_plane_when_parallel() {
        let shapes = vec![plane_shape()];
        let scene = TraceScene { shapes: &shapes, mesh_nodes: &[], mesh_faces: &[] };
        let ray = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(trace(&scene, ray, &SceneLimits::default()).is_none());
    }

    #[test]
    fn ray_hits_scaled_sphere_at_expected_time() {
        let shapes = vec![sphere_shape_at(1.0, 0.5)];
        let scene = TraceScene { shapes: &shapes, mesh_nodes: &[], mesh_faces: &[] };
        let ray = Ray::new(Vec3::new(0.0, -5.0, 1.0), Vec3::new(0.0, 1.0, 0.0));
        let hit = trace(&scene, ray, &SceneLimits::default()).unwrap();
        assert!((hit.time - 4.5).abs() < 1e-3, "{}", hit.time);
        assert_eq!(hit.shape_type, ShapeType::Sphere);
    }

    #[test]
    fn sphere_and_plane_report_the_closer_hit() {
        let shapes = vec![plane_shape(), sphere_shape_at(5.0, 1.0)];
        let scene = TraceScene { shapes: &shapes, mesh_nodes: &[], mesh_faces: &[] };
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = trace(&scene, ray, &SceneLimits::default()).unwrap();
        assert_eq!(hit.shape_type, ShapeType::Sphere);
        assert!((hit.time - 4.0).abs() < 1e-3);
    }
}
