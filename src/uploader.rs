//! The external upload seam (§6): whatever GPU backend a caller uses, it
//! implements this trait and receives one call per packed tier, letting it
//! skip tiers the dirty-flag cascade didn't touch this frame.

use crate::atlas::AtlasPage;
use crate::packed::{PackedMaterial, PackedMeshFace, PackedMeshFaceExtra, PackedMeshNode, PackedShape, PackedShapeNode, PackedTexture, SceneGlobals};

/// Receives packed scene data for upload to a renderer-owned GPU buffer.
///
/// Every method corresponds to one packed array in [`crate::pack::PackedScene`];
/// [`crate::pack::pack_scene_data`]'s return value tells a caller which of
/// these actually need calling after a given pack pass.
pub trait Uploader {
    fn upload_texture_table(&mut self, textures: &[PackedTexture]);
    fn upload_material_table(&mut self, materials: &[PackedMaterial]);
    fn upload_shape_table(&mut self, shapes: &[PackedShape]);
    fn upload_shape_node_table(&mut self, nodes: &[PackedShapeNode]);
    fn upload_mesh_faces(&mut self, faces: &[PackedMeshFace]);
    fn upload_mesh_face_extras(&mut self, extras: &[PackedMeshFaceExtra]);
    fn upload_mesh_nodes(&mut self, nodes: &[PackedMeshNode]);
    fn upload_globals(&mut self, globals: &SceneGlobals);
    fn upload_atlas_image(&mut self, page_index: u32, page: &AtlasPage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingUploader {
        texture_calls: usize,
        atlas_calls: Vec<u32>,
        last_globals: Option<SceneGlobals>,
    }

    impl Uploader for RecordingUploader {
        fn upload_texture_table(&mut self, _textures: &[PackedTexture]) {
            self.texture_calls += 1;
        }
        fn upload_material_table(&mut self, _materials: &[PackedMaterial]) {}
        fn upload_shape_table(&mut self, _shapes: &[PackedShape]) {}
        fn upload_shape_node_table(&mut self, _nodes: &[PackedShapeNode]) {}
        fn upload_mesh_faces(&mut self, _faces: &[PackedMeshFace]) {}
        fn upload_mesh_face_extras(&mut self, _extras: &[PackedMeshFaceExtra]) {}
        fn upload_mesh_nodes(&mut self, _nodes: &[PackedMeshNode]) {}
        fn upload_globals(&mut self, globals: &SceneGlobals) {
            self.last_globals = Some(*globals);
        }
        fn upload_atlas_image(&mut self, page_index: u32, _page: &AtlasPage) {
            self.atlas_calls.push(page_index);
        }
    }

    #[test]
    fn uploader_receives_calls_for_each_tier() {
        let mut uploader = RecordingUploader::default();
        uploader.upload_texture_table(&[]);
        uploader.upload_globals(&SceneGlobals::default());
        uploader.upload_atlas_image(0, &AtlasPage { size: 4, pixels: vec![0.0; 64] });

        assert_eq!(uploader.texture_calls, 1);
        assert_eq!(uploader.atlas_calls, vec![0]);
        assert!(uploader.last_globals.is_some());
    }
}
