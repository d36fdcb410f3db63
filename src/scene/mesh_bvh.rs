//! Binned SAH mesh BVH builder (§4.C), grounded on `scene.cpp`'s
//! `BuildMeshNode`.

use glam::Vec3;

use super::mesh::{Mesh, MeshNode};
use crate::limits::SceneLimits;

#[derive(Clone, Copy, Default)]
struct Bin {
    min: Vec3,
    max: Vec3,
    count: u32,
}

impl Bin {
    fn empty() -> Self {
        Self { min: Vec3::splat(f32::INFINITY), max: Vec3::splat(f32::NEG_INFINITY), count: 0 }
    }

    fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    fn grow_bin(&mut self, other: &Bin) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

fn half_area(min: Vec3, max: Vec3) -> f32 {
    let e = max - min;
    e.x * e.y + e.y * e.z + e.z * e.x
}

/// Builds (or rebuilds) the full BVH node array for `mesh`, reordering
/// `mesh.faces` in place. Clears any existing node array.
pub fn build_mesh_bvh(mesh: &mut Mesh, limits: &SceneLimits) {
    mesh.nodes.clear();
    mesh.depth = 0;

    if mesh.faces.is_empty() {
        return;
    }

    mesh.nodes.push(MeshNode {
        bounds_min: Vec3::splat(f32::INFINITY),
        bounds_max: Vec3::splat(f32::NEG_INFINITY),
        face_begin_index: 0,
        face_end_index: mesh.faces.len() as u32,
        child_node_index: 0,
    });

    build_node(mesh, 0, 0, limits);
}

fn build_node(mesh: &mut Mesh, node_index: usize, depth: u32, limits: &SceneLimits) {
    let (face_begin, face_end) = {
        let node = &mesh.nodes[node_index];
        (node.face_begin_index as usize, node.face_end_index as usize)
    };
    let face_count = face_end - face_begin;

    let mut bounds_min = Vec3::splat(f32::INFINITY);
    let mut bounds_max = Vec3::splat(f32::NEG_INFINITY);
    for face in &mesh.faces[face_begin..face_end] {
        for p in face.positions {
            bounds_min = bounds_min.min(p);
            bounds_max = bounds_max.max(p);
        }
    }
    mesh.nodes[node_index].bounds_min = bounds_min;
    mesh.nodes[node_index].bounds_max = bounds_max;

    let bin_count = limits.sah_bin_count as usize;
    let mut best_axis = 0usize;
    let mut best_position = 0.0f32;
    let mut best_cost = f32::INFINITY;

    for axis in 0..3 {
        let mut centroid_min = f32::INFINITY;
        let mut centroid_max = f32::NEG_INFINITY;
        for face in &mesh.faces[face_begin..face_end] {
            let c = face.centroid[axis];
            centroid_min = centroid_min.min(c);
            centroid_max = centroid_max.max(c);
        }
        if centroid_min == centroid_max {
            log::trace!("mesh bvh: axis {axis} degenerate at depth {depth}, skipped");
            continue;
        }

        let mut bins = vec![Bin::empty(); bin_count];
        let bin_index_per_unit = bin_count as f32 / (centroid_max - centroid_min);
        for face in &mesh.faces[face_begin..face_end] {
            let centroid = face.centroid[axis];
            let unclamped = (bin_index_per_unit * (centroid - centroid_min)) as i64;
            let bin_index = unclamped.clamp(0, bin_count as i64 - 1) as usize;
            let bin = &mut bins[bin_index];
            for p in face.positions {
                bin.grow(p);
            }
            bin.count += 1;
        }

        let mut left_area = vec![0.0f32; bin_count - 1];
        let mut left_count = vec![0u32; bin_count - 1];
        let mut right_area = vec![0.0f32; bin_count - 1];
        let mut right_count = vec![0u32; bin_count - 1];

        let mut left_bounds = Bin::empty();
        let mut right_bounds = Bin::empty();
        let mut left_sum = 0u32;
        let mut right_sum = 0u32;

        for i in 0..bin_count - 1 {
            let j = bin_count - 2 - i;

            if bins[i].count > 0 {
                left_sum += bins[i].count;
                left_bounds.grow_bin(&bins[i]);
            }
            left_count[i] = left_sum;
            left_area[i] = half_area(left_bounds.min, left_bounds.max);

            if bins[j + 1].count > 0 {
                right_sum += bins[j + 1].count;
                right_bounds.grow_bin(&bins[j + 1]);
            }
            right_count[j] = right_sum;
            right_area[j] = half_area(right_bounds.min, right_bounds.max);
        }

        let interval = (centroid_max - centroid_min) / bin_count as f32;
        let mut position = centroid_min + interval;
        for i in 0..bin_count - 1 {
            let cost = left_count[i] as f32 * left_area[i] + right_count[i] as f32 * right_area[i];
            if cost < best_cost {
                best_cost = cost;
                best_axis = axis;
                best_position = position;
            }
            position += interval;
        }
    }

    let no_split_cost = face_count as f32 * half_area(bounds_min, bounds_max);
    if best_cost >= no_split_cost {
        return;
    }

    let mut split_index = face_begin;
    let mut swap_index = face_end - 1;
    while split_index < swap_index {
        if mesh.faces[split_index].centroid[best_axis] < best_position {
            split_index += 1;
        } else {
            mesh.faces.swap(split_index, swap_index);
            swap_index -= 1;
        }
    }

    if split_index == face_begin || split_index == face_end {
        return;
    }

    let left_node_index = mesh.nodes.len();
    let right_node_index = left_node_index + 1;

    mesh.nodes[node_index].child_node_index = left_node_index as u32;

    mesh.nodes.push(MeshNode {
        bounds_min: Vec3::splat(f32::INFINITY),
        bounds_max: Vec3::splat(f32::NEG_INFINITY),
        face_begin_index: face_begin as u32,
        face_end_index: split_index as u32,
        child_node_index: 0,
    });
    mesh.nodes.push(MeshNode {
        bounds_min: Vec3::splat(f32::INFINITY),
        bounds_max: Vec3::splat(f32::NEG_INFINITY),
        face_begin_index: split_index as u32,
        face_end_index: face_end as u32,
        child_node_index: 0,
    });

    mesh.depth = mesh.depth.max(depth + 1);

    build_node(mesh, left_node_index, depth + 1, limits);
    build_node(mesh, right_node_index, depth + 1, limits);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::mesh::RawMeshData;

    fn cube_raw() -> RawMeshData {
        // 12 triangles forming a unit cube, centered at the origin.
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
    fn leaf_bounds_contain_their_faces() {
        let mut mesh = Mesh::from_raw("cube", cube_raw());
        build_mesh_bvh(&mut mesh, &SceneLimits::default());
        assert_eq!(mesh.faces.len(), 12);

        for node in &mesh.nodes {
            if !node.is_leaf() {
                continue;
            }
            let begin = node.face_begin_index as usize;
            let end = node.face_end_index as usize;
            assert!(begin < end, "leaf must cover >=1 face");
            for face in &mesh.faces[begin..end] {
                for p in face.positions {
                    assert!((p.cmpge(node.bounds_min) & p.cmple(node.bounds_max)).all());
                }
            }
        }
    }

    #[test]
    fn internal_node_right_child_is_left_plus_one() {
        let mut mesh = Mesh::from_raw("cube", cube_raw());
        build_mesh_bvh(&mut mesh, &SceneLimits::default());
        for node in &mesh.nodes {
            if node.is_leaf() {
                continue;
            }
            let left = node.child_node_index as usize;
            assert!(left + 1 < mesh.nodes.len());
        }
    }

    #[test]
    fn single_triangle_mesh_stays_a_single_leaf() {
        let raw = RawMeshData {
            positions: vec![[Vec3::ZERO, Vec3::X, Vec3::Y]],
            normals: None,
            uvs: None,
        };
        let mut mesh = Mesh::from_raw("tri", raw);
        build_mesh_bvh(&mut mesh, &SceneLimits::default());
        assert_eq!(mesh.nodes.len(), 1);
        assert!(mesh.nodes[0].is_leaf());
    }
}
