//! Scene-owned texture resources (§3, §4.B).

use slotmap::new_key_type;

new_key_type! {
    /// Stable handle into [`Scene::textures`](super::scene::Scene::textures).
    pub struct TextureKey;
}

/// How a texture's pixels are interpreted when packed into an atlas page,
/// per §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    /// Copied verbatim (e.g. roughness/normal maps already in linear form).
    Raw,
    /// RGB reinterpreted as a reflectance color (upsampled to a spectrum);
    /// alpha preserved.
    ReflectanceWithAlpha,
    /// RGB reinterpreted as an HDR radiance value, split into a
    /// chromaticity spectrum and a scalar intensity.
    Radiance,
}

/// A scene-owned texture: an RGBA-float pixel buffer plus packing metadata.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    pub ty: TextureType,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA-float pixels, length `width * height * 4`.
    pub pixels: Vec<f32>,
    pub nearest_filter: bool,
    /// Position in `texture_pack` as of the most recent pack pass;
    /// `None` before the first pack.
    pub(crate) packed_texture_index: Option<u32>,
}

impl Texture {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TextureType, width: u32, height: u32, pixels: Vec<f32>) -> Self {
        debug_assert_eq!(pixels.len(), (width as usize) * (height as usize) * 4);
        Self {
            name: name.into(),
            ty,
            width,
            height,
            pixels,
            nearest_filter: false,
            packed_texture_index: None,
        }
    }

    /// Builds a 2x2 checkerboard texture, as used for the default scene's
    /// ground plane.
    #[must_use]
    pub fn checkerboard(name: impl Into<String>, ty: TextureType, color_a: [f32; 4], color_b: [f32; 4]) -> Self {
        let mut pixels = Vec::with_capacity(16);
        for row in [[color_a, color_b], [color_b, color_a]] {
            for pixel in row {
                pixels.extend_from_slice(&pixel);
            }
        }
        Self::new(name, ty, 2, 2, pixels)
    }
}
