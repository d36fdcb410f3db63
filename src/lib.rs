#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::doc_markdown)]

//! Scene graph packing, BVH construction, and CPU ray/scene intersection
//! for a spectral path tracer.
//!
//! This crate owns the parts of the pipeline that run on the CPU between
//! scene edits and a GPU upload: the entity tree, mesh/top-level BVH
//! construction, texture atlas packing, parametric spectral upsampling,
//! and the flat std430-compatible arrays an external [`Uploader`] consumes.
//! Everything downstream of the upload (shading, denoising, display) is
//! out of scope.

pub mod atlas;
pub mod error;
pub mod limits;
pub mod pack;
pub mod packed;
pub mod scene;
pub mod spectrum;
pub mod toplevel_bvh;
pub mod tracer;
pub mod uploader;

pub use error::{PathTracerError, Result};
pub use limits::SceneLimits;
pub use pack::{pack_scene_data, PackedScene};
pub use scene::{DirtyFlags, Entity, EntityKey, EntityKind, Material, MaterialKey, Mesh, MeshKey, Scene, Texture, TextureKey, TextureType};
pub use spectrum::SpectrumTable;
pub use tracer::{trace, Hit, Ray, TraceScene};
pub use uploader::Uploader;
