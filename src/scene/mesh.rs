//! Scene-owned triangle meshes: face soup, centroid, and BVH node array
//! (§3, §4.C, grounded on `scene.cpp`'s `mesh`/`mesh_face`/`mesh_node` and
//! `LoadModelAsPrefab`'s normal-accumulation fallback).

use glam::{Vec2, Vec3};
use slotmap::new_key_type;

new_key_type! {
    /// Stable handle into [`Scene::meshes`](super::scene::Scene::meshes).
    pub struct MeshKey;
}

/// A single triangle, storing its own per-vertex attributes rather than
/// indexing into a shared vertex buffer (faces are duplicated instead of
/// shared, matching the packed GPU layout).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshFace {
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
    pub uvs: [Vec2; 3],
    pub centroid: Vec3,
}

impl MeshFace {
    #[must_use]
    pub fn new(positions: [Vec3; 3], normals: [Vec3; 3], uvs: [Vec2; 3]) -> Self {
        let centroid = (positions[0] + positions[1] + positions[2]) / 3.0;
        Self { positions, normals, uvs, centroid }
    }
}

/// A node of a mesh's BVH (§4.C). Leaves have `face_end_index > 0`;
/// internal nodes set `face_end_index = 0` and use
/// `face_begin_or_node_index` as the left child's index (right = left+1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshNode {
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    pub face_begin_index: u32,
    pub face_end_index: u32,
    pub child_node_index: u32,
}

impl MeshNode {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.child_node_index == 0
    }
}

/// Unprocessed mesh data handed in by an external importer (OBJ/glTF
/// parsing itself is out of scope per §1; this is the seam).
///
/// Mirrors the original's face-soup convention: one triangle per entry,
/// normals/uvs optional per-face (absent normals are reconstructed by
/// [`Mesh::from_raw`]).
#[derive(Debug, Clone, Default)]
pub struct RawMeshData {
    pub positions: Vec<[Vec3; 3]>,
    pub normals: Option<Vec<[Vec3; 3]>>,
    pub uvs: Option<Vec<[Vec2; 3]>>,
}

/// A scene-owned mesh: its face array (subject to in-place reordering by
/// the BVH builder) and its BVH node array.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub faces: Vec<MeshFace>,
    pub nodes: Vec<MeshNode>,
    pub depth: u32,
    pub(crate) packed_root_node_index: Option<u32>,
}

impl Mesh {
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            faces: Vec::new(),
            nodes: Vec::new(),
            depth: 0,
            packed_root_node_index: None,
        }
    }

    /// Builds a mesh from raw imported data, generating area-weighted
    /// vertex normals when the importer didn't supply any (grounded on
    /// `LoadModelAsPrefab`'s normal-accumulation fallback: per-face normals
    /// are accumulated onto each vertex position and renormalized, falling
    /// back to `+Z` for degenerate zero-length accumulations).
    #[must_use]
    pub fn from_raw(name: impl Into<String>, raw: RawMeshData) -> Self {
        let normals = raw.normals.unwrap_or_else(|| Self::generate_normals(&raw.positions));
        let uvs = raw.uvs.unwrap_or_else(|| vec![[Vec2::ZERO; 3]; raw.positions.len()]);

        let mut faces = Vec::with_capacity(raw.positions.len());
        for ((positions, normals), uvs) in raw.positions.into_iter().zip(normals).zip(uvs) {
            faces.push(MeshFace::new(positions, normals, uvs));
        }

        let mut mesh = Self::empty(name);
        mesh.faces = faces;
        mesh
    }

    fn generate_normals(positions: &[[Vec3; 3]]) -> Vec<[Vec3; 3]> {
        // Accumulate each face's flat normal onto its three vertex
        // *positions* (not a shared index space, since faces don't share
        // vertices here), then renormalize per-face.
        let mut accumulated = vec![Vec3::ZERO; positions.len() * 3];
        for (face_index, tri) in positions.iter().enumerate() {
            let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
            let normal = if normal.length_squared() > 1e-12 {
                normal.normalize()
            } else {
                Vec3::Z
            };
            for vertex in 0..3 {
                accumulated[face_index * 3 + vertex] += normal;
            }
        }

        let mut normals = Vec::with_capacity(positions.len());
        for face_index in 0..positions.len() {
            let mut face_normals = [Vec3::Z; 3];
            for (vertex, normal) in face_normals.iter_mut().enumerate() {
                let accum = accumulated[face_index * 3 + vertex];
                let length = accum.length();
                *normal = if length > 1e-5 { accum / length } else { Vec3::Z };
            }
            normals.push(face_normals);
        }
        normals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_vec3(a: Vec3, b: Vec3, eps: f32) -> bool {
        (a - b).length() < eps
    }

    #[test]
    fn from_raw_generates_flat_normal_for_single_triangle() {
        let raw = RawMeshData {
            positions: vec![[Vec3::ZERO, Vec3::X, Vec3::Y]],
            normals: None,
            uvs: None,
        };
        let mesh = Mesh::from_raw("tri", raw);
        assert_eq!(mesh.faces.len(), 1);
        for normal in mesh.faces[0].normals {
            assert!(approx_vec3(normal, Vec3::Z, 1e-5), "{normal:?}");
        }
    }

    #[test]
    fn from_raw_preserves_supplied_normals() {
        let raw = RawMeshData {
            positions: vec![[Vec3::ZERO, Vec3::X, Vec3::Y]],
            normals: Some(vec![[Vec3::Y, Vec3::Y, Vec3::Y]]),
            uvs: None,
        };
        let mesh = Mesh::from_raw("tri", raw);
        assert_eq!(mesh.faces[0].normals[0], Vec3::Y);
    }

    #[test]
    fn degenerate_triangle_falls_back_to_plus_z() {
        let raw = RawMeshData {
            positions: vec![[Vec3::ZERO, Vec3::ZERO, Vec3::ZERO]],
            normals: None,
            uvs: None,
        };
        let mesh = Mesh::from_raw("degenerate", raw);
        for normal in mesh.faces[0].normals {
            assert_eq!(normal, Vec3::Z);
        }
    }

    #[test]
    fn centroid_is_average_of_vertices() {
        let face = MeshFace::new(
            [Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.0, 3.0, 0.0)],
            [Vec3::Z; 3],
            [Vec2::ZERO; 3],
        );
        assert!(approx_vec3(face.centroid, Vec3::new(1.0, 1.0, 0.0), 1e-5));
    }
}
