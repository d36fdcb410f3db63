//! OpenPBR-style material attribute bundle (§3, §4.D, grounded on
//! `openpbr.h`'s `material_openpbr`).

use glam::Vec3;
use slotmap::new_key_type;

use super::texture::TextureKey;

new_key_type! {
    /// Stable handle into [`Scene::materials`](super::scene::Scene::materials).
    pub struct MaterialKey;
}

/// A material's full attribute set. Colors are stored as linear RGB and
/// converted to parametric spectrum coefficients at pack time.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,

    pub opacity: f32,
    pub layer_bounce_limit: u32,

    pub base_weight: f32,
    pub base_color: Vec3,
    pub base_color_texture: Option<TextureKey>,
    pub base_metalness: f32,
    pub base_diffuse_roughness: f32,

    pub specular_weight: f32,
    pub specular_color: Vec3,
    pub specular_roughness: f32,
    pub specular_roughness_texture: Option<TextureKey>,
    pub specular_roughness_anisotropy: f32,
    pub specular_ior: f32,

    pub transmission_weight: f32,
    pub transmission_color: Vec3,
    pub transmission_depth: f32,
    pub transmission_scatter: Vec3,
    pub transmission_scatter_anisotropy: f32,
    pub transmission_dispersion_scale: f32,
    pub transmission_dispersion_abbe_number: f32,

    pub coat_weight: f32,
    pub coat_color: Vec3,
    pub coat_roughness: f32,
    pub coat_roughness_anisotropy: f32,
    pub coat_ior: f32,
    pub coat_darkening: f32,

    pub emission_luminance: f32,
    pub emission_color: Vec3,
    pub emission_color_texture: Option<TextureKey>,

    /// Position in `material_pack` as of the most recent pack pass.
    pub(crate) packed_material_index: Option<u32>,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),

            opacity: 1.0,
            layer_bounce_limit: 16,

            base_weight: 1.0,
            base_color: Vec3::ONE,
            base_color_texture: None,
            base_metalness: 0.0,
            base_diffuse_roughness: 0.0,

            specular_weight: 1.0,
            specular_color: Vec3::ONE,
            specular_roughness: 0.3,
            specular_roughness_texture: None,
            specular_roughness_anisotropy: 0.0,
            specular_ior: 1.5,

            transmission_weight: 0.0,
            transmission_color: Vec3::ONE,
            transmission_depth: 0.0,
            transmission_scatter: Vec3::ZERO,
            transmission_scatter_anisotropy: 0.0,
            transmission_dispersion_scale: 0.0,
            transmission_dispersion_abbe_number: 20.0,

            coat_weight: 0.0,
            coat_color: Vec3::ONE,
            coat_roughness: 0.0,
            coat_roughness_anisotropy: 0.0,
            coat_ior: 1.6,
            coat_darkening: 1.0,

            emission_luminance: 0.0,
            emission_color: Vec3::ZERO,
            emission_color_texture: None,

            packed_material_index: None,
        }
    }

    /// References this material holds into the texture arena, used by the
    /// texture-destroy reference scrub (§3 Lifecycle).
    pub(crate) fn texture_refs_mut(&mut self) -> [&mut Option<TextureKey>; 3] {
        [
            &mut self.base_color_texture,
            &mut self.specular_roughness_texture,
            &mut self.emission_color_texture,
        ]
    }
}
