//! GPU-layout ("packed") structs and the bit-packing helpers used to fill
//! them.
//!
//! Every struct here is `#[repr(C)]` + `bytemuck::{Pod, Zeroable}` and
//! follows std430 layout rules, matching the byte offsets in the external
//! interface contract. A static-assertion suite below pins `size_of`/
//! `align_of` for each struct so a layout regression fails to compile
//! instead of silently corrupting the GPU upload, the way
//! `myth_engine::resources::uniforms` hand-checks its own GPU structs.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// A `mat3x3<f32>` padded to std430 layout (48 bytes: three 16-byte-aligned
/// columns). `glam::Mat3` is only 36 bytes, so it cannot be uploaded
/// directly; this type is the upload-safe stand-in, following the same
/// pattern as the teacher engine's `Mat3Padded`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3Std430 {
    pub col0: Vec4,
    pub col1: Vec4,
    pub col2: Vec4,
}

unsafe impl Zeroable for Mat3Std430 {}
unsafe impl Pod for Mat3Std430 {}

impl Mat3Std430 {
    pub const IDENTITY: Self = Self {
        col0: Vec4::new(1.0, 0.0, 0.0, 0.0),
        col1: Vec4::new(0.0, 1.0, 0.0, 0.0),
        col2: Vec4::new(0.0, 0.0, 1.0, 0.0),
    };

    #[must_use]
    pub fn from_cols(col0: Vec3, col1: Vec3, col2: Vec3) -> Self {
        Self {
            col0: col0.extend(0.0),
            col1: col1.extend(0.0),
            col2: col2.extend(0.0),
        }
    }
}

impl Default for Mat3Std430 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Sentinel for an absent packed texture reference.
pub const TEXTURE_INDEX_NONE: u32 = 0xFFFF_FFFF;
/// Sentinel for an absent packed shape reference in a top-level BVH leaf.
pub const SHAPE_INDEX_NONE: u32 = 0xFFFF_FFFF;
/// The fallback material is always packed into slot 0.
pub const FALLBACK_MATERIAL_INDEX: u32 = 0;

/// Bit set on [`PackedTexture::flags`] when the texture should be sampled
/// with nearest-neighbor filtering instead of bilinear.
pub const TEXTURE_FLAG_FILTER_NEAREST: u32 = 1 << 0;

/// Discriminant for [`PackedTexture::ty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PackedTextureType {
    Raw = 0,
    ReflectanceWithAlpha = 1,
    Radiance = 2,
}

/// Discriminant for [`PackedShape::ty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ShapeType {
    MeshInstance = 0,
    Plane = 1,
    Sphere = 2,
    Cube = 3,
}

/// `to`/`from` world transform pair for a packed shape.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedTransform {
    pub to: Mat4,
    pub from: Mat4,
}

unsafe impl Zeroable for PackedTransform {}
unsafe impl Pod for PackedTransform {}

impl Default for PackedTransform {
    fn default() -> Self {
        Self {
            to: Mat4::IDENTITY,
            from: Mat4::IDENTITY,
        }
    }
}

/// An atlas placement entry: which page, and the half-pixel-inset UV box.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedTexture {
    pub atlas_min: Vec2,
    pub atlas_max: Vec2,
    pub atlas_image_index: u32,
    pub ty: u32,
    pub flags: u32,
    pub pad: u32,
}

unsafe impl Zeroable for PackedTexture {}
unsafe impl Pod for PackedTexture {}

/// A packed shape instance (one leaf of the scene, consumed by both the
/// top-level BVH and the CPU tracer's linear scan).
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedShape {
    pub ty: u32,
    pub material_index: u32,
    pub mesh_root_node_index: u32,
    pub pad: u32,
    pub transform: PackedTransform,
}

unsafe impl Zeroable for PackedShape {}
unsafe impl Pod for PackedShape {}

impl PackedShape {
    /// Decodes `ty` back into a [`ShapeType`]. Panics on an out-of-range
    /// value, which can only mean a packing bug: every writer goes through
    /// `ShapeType as u32`.
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self.ty {
            0 => ShapeType::MeshInstance,
            1 => ShapeType::Plane,
            2 => ShapeType::Sphere,
            3 => ShapeType::Cube,
            other => panic!("invalid packed shape type discriminant: {other}"),
        }
    }
}

/// A top-level BVH node: leaves encode `shape_index`, internal nodes encode
/// two 16-bit child indices packed into `child_node_indices`.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedShapeNode {
    pub min: Vec3,
    pub child_node_indices: u32,
    pub max: Vec3,
    pub shape_index: u32,
}

unsafe impl Zeroable for PackedShapeNode {}
unsafe impl Pod for PackedShapeNode {}

impl PackedShapeNode {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.child_node_indices == 0
    }

    #[must_use]
    pub fn left_child(&self) -> u16 {
        (self.child_node_indices & 0xFFFF) as u16
    }

    #[must_use]
    pub fn right_child(&self) -> u16 {
        (self.child_node_indices >> 16) as u16
    }
}

/// Three vertex positions of a mesh triangle, plus their original (unpacked)
/// mesh-local vertex indices.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedMeshFace {
    pub position0: Vec3,
    pub vertex_index0: u32,
    pub position1: Vec3,
    pub vertex_index1: u32,
    pub position2: Vec3,
    pub vertex_index2: u32,
}

unsafe impl Zeroable for PackedMeshFace {}
unsafe impl Pod for PackedMeshFace {}

/// Oct-encoded normal + half-float UV for a single mesh vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedMeshVertex {
    pub packed_normal: u32,
    pub packed_uv: u32,
}

unsafe impl Zeroable for PackedMeshVertex {}
unsafe impl Pod for PackedMeshVertex {}

/// The three packed vertices (normal + UV) belonging to one [`PackedMeshFace`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedMeshFaceExtra {
    pub vertices: [PackedMeshVertex; 3],
}

unsafe impl Zeroable for PackedMeshFaceExtra {}
unsafe impl Pod for PackedMeshFaceExtra {}

/// A mesh BVH node: leaves set `face_end_index > 0` and store the face
/// range's begin index in `face_begin_or_node_index`; internal nodes set
/// `face_end_index = 0` and store the left child's index there (the right
/// child is always `left + 1`).
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedMeshNode {
    pub min: Vec3,
    pub face_begin_or_node_index: u32,
    pub max: Vec3,
    pub face_end_index: u32,
}

unsafe impl Zeroable for PackedMeshNode {}
unsafe impl Pod for PackedMeshNode {}

impl PackedMeshNode {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.face_end_index > 0
    }
}

/// A packed OpenPBR material (§4.D), grounded on `openpbr.h`'s
/// `OpenPBRPackMaterial`. Every surface color is stored pre-converted into
/// three parametric spectrum coefficients rather than RGB — the GPU path
/// tracer never touches RGB after packing.
///
/// Laid out as sixteen-byte groups (`Vec3` coefficients paired with one
/// scalar/index each) so no manual std430 padding is needed, the same
/// convention [`PackedShapeNode`] uses.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedMaterial {
    pub base_color: Vec3,
    pub base_color_texture_index: u32,

    pub base_weight: f32,
    pub base_metalness: f32,
    pub base_diffuse_roughness: f32,
    pub opacity: f32,

    pub specular_color: Vec3,
    pub specular_roughness_texture_index: u32,

    pub specular_weight: f32,
    pub specular_roughness: f32,
    pub specular_roughness_anisotropy: f32,
    pub specular_ior: f32,

    pub transmission_color: Vec3,
    pub layer_bounce_limit: u32,

    pub transmission_weight: f32,
    pub transmission_depth: f32,
    pub transmission_scatter_anisotropy: f32,
    pub transmission_dispersion_abbe_number: f32,

    pub transmission_scatter: Vec3,
    /// `transmission_dispersion_abbe_number / transmission_dispersion_scale`,
    /// or `0.0` when the scale is `0.0` (§9 Open Questions: the source
    /// divides by `dispersion_scale` unconditionally, which is undefined
    /// at zero; zero scale means "no dispersion", so it packs to zero
    /// rather than propagating a NaN/inf into the shader).
    pub transmission_dispersion_ratio: f32,

    pub coat_color: Vec3,
    pub pad0: u32,

    pub coat_weight: f32,
    pub coat_roughness: f32,
    pub coat_roughness_anisotropy: f32,
    pub coat_ior: f32,

    pub coat_darkening: f32,
    pub emission_luminance: f32,
    pub emission_color_texture_index: u32,
    pub pad1: f32,

    pub emission_color: Vec3,
    pub pad2: u32,
}

unsafe impl Zeroable for PackedMaterial {}
unsafe impl Pod for PackedMaterial {}

impl PackedMaterial {
    /// The reserved fallback material pushed to slot 0 of every pack pass
    /// (`FALLBACK_MATERIAL_INDEX`), grounded on `scene.cpp`'s `PackSceneData`,
    /// which unconditionally pushes this exact literal before the
    /// user-material loop: base weight 1, specular IOR 1.5, layer bounce
    /// limit 8, everything else neutral/zeroed.
    #[must_use]
    pub fn fallback() -> Self {
        let mut material = Self::zeroed();
        material.base_color = Vec3::splat(0.8);
        material.base_weight = 1.0;
        material.base_color_texture_index = TEXTURE_INDEX_NONE;
        material.opacity = 1.0;
        material.specular_roughness_texture_index = TEXTURE_INDEX_NONE;
        material.specular_weight = 1.0;
        material.specular_roughness = 1.0;
        material.specular_ior = 1.5;
        material.layer_bounce_limit = 8;
        material.coat_ior = 1.5;
        material.emission_color_texture_index = TEXTURE_INDEX_NONE;
        material
    }
}

/// Scene-wide uniform data, uploaded once per pack pass.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneGlobals {
    pub skybox_frame: Mat3Std430,
    pub skybox_concentration: f32,
    pub skybox_brightness: f32,
    pub skybox_texture_index: u32,
    pub shape_count: u32,
    pub scene_scatter_rate: f32,
}

unsafe impl Zeroable for SceneGlobals {}
unsafe impl Pod for SceneGlobals {}

impl Default for SceneGlobals {
    fn default() -> Self {
        Self {
            skybox_frame: Mat3Std430::IDENTITY,
            skybox_concentration: 1.0,
            skybox_brightness: 1.0,
            skybox_texture_index: TEXTURE_INDEX_NONE,
            shape_count: 0,
            scene_scatter_rate: 0.0,
        }
    }
}

// ============================================================================
// Unit-vector oct-encoding and half-float UV packing
// ============================================================================

fn sign_not_zero(v: Vec2) -> Vec2 {
    Vec2::new(
        if v.x >= 0.0 { 1.0 } else { -1.0 },
        if v.y >= 0.0 { 1.0 } else { -1.0 },
    )
}

fn pack_snorm2x16(v: Vec2) -> u32 {
    let x = (v.x.clamp(-1.0, 1.0) * 32767.0).round() as i16;
    let y = (v.y.clamp(-1.0, 1.0) * 32767.0).round() as i16;
    (x as u16 as u32) | ((y as u16 as u32) << 16)
}

fn unpack_snorm2x16(packed: u32) -> Vec2 {
    let x = (packed & 0xFFFF) as u16 as i16;
    let y = (packed >> 16) as u16 as i16;
    Vec2::new(f32::from(x) / 32767.0, f32::from(y) / 32767.0)
}

/// Oct-encodes a unit vector into a single 32-bit value (two 16-bit snorm
/// components), folding the lower hemisphere into the unit square's
/// corners. Mirrors `PackUnitVector` in the original renderer's common
/// header.
#[must_use]
pub fn pack_unit_vector(v: Vec3) -> u32 {
    let inv_l1 = 1.0 / (v.x.abs() + v.y.abs() + v.z.abs());
    let mut p = Vec2::new(v.x, v.y) * inv_l1;
    if v.z <= 0.0 {
        p = (Vec2::ONE - Vec2::new(p.y.abs(), p.x.abs())) * sign_not_zero(p);
    }
    pack_snorm2x16(p)
}

/// Inverse of [`pack_unit_vector`]; the result is re-normalized so tiny
/// quantization error doesn't leave the unit sphere.
#[must_use]
pub fn unpack_unit_vector(packed: u32) -> Vec3 {
    let mut p = unpack_snorm2x16(packed);
    let z = 1.0 - p.x.abs() - p.y.abs();
    if z < 0.0 {
        p = (Vec2::ONE - Vec2::new(p.y.abs(), p.x.abs())) * sign_not_zero(p);
    }
    Vec3::new(p.x, p.y, z).normalize()
}

/// Packs a UV coordinate pair as two IEEE-754 binary16 halves.
#[must_use]
pub fn pack_uv(uv: Vec2) -> u32 {
    let x = half::f16::from_f32(uv.x).to_bits();
    let y = half::f16::from_f32(uv.y).to_bits();
    u32::from(x) | (u32::from(y) << 16)
}

// ============================================================================
// Layout assertions
// ============================================================================

const _: () = assert!(std::mem::size_of::<PackedTransform>() == 128);
const _: () = assert!(std::mem::align_of::<PackedTransform>() == 16);
const _: () = assert!(std::mem::size_of::<PackedTexture>() == 32);
const _: () = assert!(std::mem::size_of::<PackedMaterial>() == 176);
const _: () = assert!(std::mem::align_of::<PackedMaterial>() == 16);
const _: () = assert!(std::mem::size_of::<PackedShape>() == 144);
const _: () = assert!(std::mem::size_of::<PackedShapeNode>() == 32);
const _: () = assert!(std::mem::size_of::<PackedMeshFace>() == 48);
const _: () = assert!(std::mem::size_of::<PackedMeshVertex>() == 8);
const _: () = assert!(std::mem::size_of::<PackedMeshFaceExtra>() == 24);
const _: () = assert!(std::mem::size_of::<PackedMeshNode>() == 32);
const _: () = assert!(std::mem::size_of::<Mat3Std430>() == 48);
const _: () = assert!(std::mem::size_of::<SceneGlobals>() == 80);

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_1_SQRT_2;

    fn approx_vec3(a: Vec3, b: Vec3, eps: f32) -> bool {
        (a - b).length() < eps
    }

    #[test]
    fn unit_vector_round_trip_axes() {
        for v in [
            Vec3::X,
            Vec3::Y,
            Vec3::Z,
            -Vec3::X,
            -Vec3::Y,
            -Vec3::Z,
            Vec3::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.0),
            Vec3::new(0.5, 0.5, 0.5).normalize(),
            Vec3::new(-0.3, 0.8, -0.51).normalize(),
        ] {
            let packed = pack_unit_vector(v);
            let unpacked = unpack_unit_vector(packed);
            assert!(
                v.dot(unpacked) >= 0.9999,
                "round trip failed for {v:?} -> {unpacked:?} (dot {})",
                v.dot(unpacked)
            );
        }
    }

    #[test]
    fn unit_vector_round_trip_is_approximately_identity() {
        let v = Vec3::new(0.2, -0.6, 0.75).normalize();
        let unpacked = unpack_unit_vector(pack_unit_vector(v));
        assert!(approx_vec3(v, unpacked, 1e-3));
    }

    #[test]
    fn packed_shape_node_child_index_round_trip() {
        let mut node = PackedShapeNode {
            min: Vec3::ZERO,
            child_node_indices: 0,
            max: Vec3::ZERO,
            shape_index: SHAPE_INDEX_NONE,
        };
        node.child_node_indices = 5u32 | (9u32 << 16);
        assert!(!node.is_leaf());
        assert_eq!(node.left_child(), 5);
        assert_eq!(node.right_child(), 9);
    }
}
