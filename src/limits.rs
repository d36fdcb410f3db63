//! Tunable limits for the packing pipeline.
//!
//! Mirrors the teacher engine's `RendererSettings`: a plain, `Default`-able
//! configuration struct so callers can override pipeline constants without
//! touching library code.

/// Configuration knobs for scene packing and BVH construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneLimits {
    /// Width and height of each texture atlas page, in pixels.
    pub atlas_page_size: u32,
    /// Number of SAH bins per axis when building mesh BVHs.
    pub sah_bin_count: u32,
    /// Maximum explicit stack depth for mesh BVH traversal during tracing.
    pub mesh_traversal_stack_depth: usize,
}

impl Default for SceneLimits {
    fn default() -> Self {
        Self {
            atlas_page_size: 4096,
            sah_bin_count: 32,
            mesh_traversal_stack_depth: 32,
        }
    }
}
