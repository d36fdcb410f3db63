//! Error Types
//!
//! This module defines the error type used throughout the scene core.
//!
//! All public, genuinely fallible APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, PathTracerError>`. Destructive operations
//! (destroying a texture/material/mesh) never fail — they scrub references
//! instead, per the scene's lifecycle contract. Internal invariants that
//! would otherwise need a `Result` (a malformed BVH, an empty partition
//! reaching code that assumes otherwise) are bugs, not recoverable errors,
//! and are guarded with `debug_assert!` rather than an error variant.

use thiserror::Error;

/// The error type for the scene core.
#[derive(Error, Debug)]
pub enum PathTracerError {
    /// The spectrum table persistence file is missing, truncated, or has a
    /// bad magic/size header.
    #[error("spectrum table IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A texture exceeds the atlas page size on at least one axis.
    #[error("texture {width}x{height} exceeds the atlas page size")]
    OversizedTexture {
        /// Texture width in pixels.
        width: u32,
        /// Texture height in pixels.
        height: u32,
    },

    /// A caller-supplied mesh/texture import produced malformed data.
    ///
    /// This crate never produces this variant itself; it exists so that
    /// collaborators importing external formats (OBJ, glTF, ...) can
    /// surface their own parse failures through the same `Result` type.
    #[error("import parse error: {0}")]
    ParseError(String),

    /// A BVH build exceeded its configured depth/stack budget.
    #[error("BVH build exhausted its depth budget")]
    BudgetExhausted,
}

/// Alias for `Result<T, PathTracerError>`.
pub type Result<T> = std::result::Result<T, PathTracerError>;
