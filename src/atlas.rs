//! Texture atlas packing (§4.B): skyline bottom-left bin packing into
//! fixed-size pages, with per-texture-type pixel transforms.

use glam::Vec2;

use crate::error::{PathTracerError, Result};
use crate::limits::SceneLimits;
use crate::scene::{Texture, TextureType};
use crate::spectrum::{self, SpectrumTable};

/// Where a packed texture landed: which page, and its UV placement with a
/// half-pixel inset so bilinear sampling never bleeds across neighbors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasPlacement {
    pub page_index: u32,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

/// A single atlas page: a square RGBA-float pixel buffer.
#[derive(Debug, Clone)]
pub struct AtlasPage {
    pub size: u32,
    pub pixels: Vec<f32>,
}

impl AtlasPage {
    fn blank(size: u32) -> Self {
        Self { size, pixels: vec![0.0; size as usize * size as usize * 4] }
    }

    fn blit(&mut self, x: u32, y: u32, w: u32, h: u32, src: &[f32]) {
        let page_size = self.size as usize;
        for row in 0..h as usize {
            let dst_start = ((y as usize + row) * page_size + x as usize) * 4;
            let src_start = row * w as usize * 4;
            self.pixels[dst_start..dst_start + w as usize * 4]
                .copy_from_slice(&src[src_start..src_start + w as usize * 4]);
        }
    }
}

/// A single skyline segment: `x` start, current `height`, and `width`.
struct SkylineNode {
    x: u32,
    y: u32,
    width: u32,
}

struct Skyline {
    page_size: u32,
    nodes: Vec<SkylineNode>,
}

impl Skyline {
    fn new(page_size: u32) -> Self {
        Self { page_size, nodes: vec![SkylineNode { x: 0, y: 0, width: page_size }] }
    }

    /// Finds the bottom-left placement for a `w x h` rectangle, if one fits.
    fn find_position(&self, w: u32, h: u32) -> Option<(u32, u32, usize)> {
        let mut best: Option<(u32, u32, usize)> = None;

        for start in 0..self.nodes.len() {
            let mut width_left = w;
            let mut index = start;
            let mut y = 0u32;
            let x = self.nodes[start].x;
            if x + w > self.page_size {
                continue;
            }

            loop {
                y = y.max(self.nodes[index].y);
                if y + h > self.page_size {
                    break;
                }
                if self.nodes[index].width >= width_left {
                    let better = match best {
                        None => true,
                        Some((_, best_y, _)) => y < best_y,
                    };
                    if better {
                        best = Some((x, y, start));
                    }
                    break;
                }
                width_left -= self.nodes[index].width;
                index += 1;
                if index >= self.nodes.len() {
                    break;
                }
            }
        }

        best
    }

    fn place(&mut self, x: u32, y: u32, w: u32, h: u32, start: usize) {
        let new_node = SkylineNode { x, y: y + h, width: w };

        let mut end = start;
        let mut consumed = 0u32;
        while end < self.nodes.len() && consumed < w {
            consumed += self.nodes[end].width;
            end += 1;
        }

        let remainder = consumed.saturating_sub(w);
        self.nodes.splice(start..end, std::iter::once(new_node));
        if remainder > 0 {
            self.nodes.insert(start + 1, SkylineNode { x: x + w, y, width: remainder });
        }
    }
}

fn transform_pixel(ty: TextureType, table: &SpectrumTable, pixel: [f32; 4]) -> [f32; 4] {
    match ty {
        TextureType::Raw => pixel,
        TextureType::ReflectanceWithAlpha => {
            let rgb = glam::Vec3::new(pixel[0], pixel[1], pixel[2]);
            let c = spectrum::coefficients(table, rgb);
            [c.x, c.y, c.z, pixel[3]]
        }
        TextureType::Radiance => {
            let intensity = 2.0 * pixel[0].max(pixel[1]).max(pixel[2]);
            if intensity <= 1e-6 {
                [0.0, 0.0, 0.0, 0.0]
            } else {
                let rgb = glam::Vec3::new(pixel[0], pixel[1], pixel[2]) / intensity;
                let c = spectrum::coefficients(table, rgb);
                [c.x, c.y, c.z, intensity]
            }
        }
    }
}

const TEXTURE_FLAG_FILTER_NEAREST: u32 = crate::packed::TEXTURE_FLAG_FILTER_NEAREST;

/// Packs every texture in `textures` into fixed-size atlas pages,
/// returning the generated pages and each texture's placement (in
/// insertion order, matching the caller's iteration order).
///
/// Errors with [`PathTracerError::OversizedTexture`] if any texture
/// exceeds the page size on either axis.
pub fn pack_textures<'a>(
    textures: impl Iterator<Item = &'a Texture>,
    table: &SpectrumTable,
    limits: &SceneLimits,
) -> Result<(Vec<AtlasPage>, Vec<(AtlasPlacement, u32)>)> {
    let page_size = limits.atlas_page_size;

    struct Pending<'a> {
        index: usize,
        texture: &'a Texture,
    }

    let mut pending: Vec<Pending<'a>> = Vec::new();
    for (index, texture) in textures.enumerate() {
        if texture.width > page_size || texture.height > page_size {
            return Err(PathTracerError::OversizedTexture { width: texture.width, height: texture.height });
        }
        pending.push(Pending { index, texture });
    }

    let total = pending.len();
    let mut placements: Vec<Option<(AtlasPlacement, u32)>> = (0..total).map(|_| None).collect();
    let mut pages = Vec::new();

    while !pending.is_empty() {
        let mut page = AtlasPage::blank(page_size);
        let mut skyline = Skyline::new(page_size);
        let mut remaining = Vec::new();
        let pending_count = pending.len();

        for item in pending {
            match skyline.find_position(item.texture.width, item.texture.height) {
                Some((x, y, start)) => {
                    skyline.place(x, y, item.texture.width, item.texture.height, start);

                    let transformed: Vec<f32> = item
                        .texture
                        .pixels
                        .chunks_exact(4)
                        .flat_map(|p| transform_pixel(item.texture.ty, table, [p[0], p[1], p[2], p[3]]))
                        .collect();
                    page.blit(x, y, item.texture.width, item.texture.height, &transformed);

                    let inset = 0.5 / page_size as f32;
                    let uv_min = Vec2::new(
                        x as f32 / page_size as f32 + inset,
                        y as f32 / page_size as f32 + inset,
                    );
                    let uv_max = Vec2::new(
                        (x + item.texture.width) as f32 / page_size as f32 - inset,
                        (y + item.texture.height) as f32 / page_size as f32 - inset,
                    );

                    let mut flags = 0u32;
                    if item.texture.nearest_filter {
                        flags |= TEXTURE_FLAG_FILTER_NEAREST;
                    }

                    placements[item.index] = Some((
                        AtlasPlacement { page_index: pages.len() as u32, uv_min, uv_max },
                        flags,
                    ));
                }
                None => remaining.push(item),
            }
        }

        log::debug!(
            "atlas page {} emitted with {} texture(s), {} remaining",
            pages.len(),
            pending_count - remaining.len(),
            remaining.len()
        );
        pages.push(page);
        pending = remaining;
    }

    Ok((pages, placements.into_iter().map(|p| p.expect("every texture is placed")).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::TextureType;

    fn solid_texture(width: u32, height: u32) -> Texture {
        Texture::new("t", TextureType::Raw, width, height, vec![1.0; (width * height * 4) as usize])
    }

    #[test]
    fn oversized_texture_is_rejected() {
        let table = SpectrumTable::build_for_srgb(3);
        let limits = SceneLimits::default();
        let textures = vec![solid_texture(limits.atlas_page_size + 1, 16)];
        let result = pack_textures(textures.iter(), &table, &limits);
        assert!(matches!(result, Err(PathTracerError::OversizedTexture { .. })));
    }

    #[test]
    fn two_large_plus_one_medium_texture_need_two_pages() {
        let table = SpectrumTable::build_for_srgb(3);
        let limits = SceneLimits::default();
        let textures = vec![solid_texture(3000, 3000), solid_texture(3000, 3000), solid_texture(2000, 2000)];
        let (pages, placements) = pack_textures(textures.iter(), &table, &limits).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(placements.len(), 3);
        for (placement, _) in &placements {
            assert!(placement.uv_min.x > 0.0);
        }

        let unique_pages: std::collections::HashSet<_> =
            placements.iter().map(|(p, _)| (p.page_index, p.uv_min.x.to_bits(), p.uv_min.y.to_bits())).collect();
        assert_eq!(unique_pages.len(), 3);
    }

    #[test]
    fn nearest_filter_flag_is_propagated() {
        let table = SpectrumTable::build_for_srgb(3);
        let limits = SceneLimits::default();
        let mut texture = solid_texture(8, 8);
        texture.nearest_filter = true;
        let (_, placements) = pack_textures(std::iter::once(&texture), &table, &limits).unwrap();
        assert_eq!(placements[0].1 & TEXTURE_FLAG_FILTER_NEAREST, TEXTURE_FLAG_FILTER_NEAREST);
    }

    #[test]
    fn radiance_texture_with_near_zero_intensity_packs_to_zero() {
        let table = SpectrumTable::build_for_srgb(3);
        let limits = SceneLimits::default();
        let texture = Texture::new("dark", TextureType::Radiance, 1, 1, vec![0.0, 0.0, 0.0, 1.0]);
        let (pages, placements) = pack_textures(std::iter::once(&texture), &table, &limits).unwrap();
        let (placement, _) = placements[0];
        let page = &pages[placement.page_index as usize];
        assert_eq!(&page.pixels[0..4], &[0.0, 0.0, 0.0, 0.0]);
    }
}
