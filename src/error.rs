//! Crate-wide error type.
//!
//! Per-pixel and per-sample failures inside the training/inference core
//! (`NoData`, an unsplittable node, a tree at max capacity) are recovered
//! locally and never surface here — see `spec.md` §7. This type is for the
//! failures that abort a whole file-level or CLI-level operation.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error in {path:?}: {context}")]
    Format { path: Option<PathBuf>, context: String },

    #[error("geometry mismatch: {context}")]
    Geometry { context: String },

    #[error("resource exhaustion: {context}")]
    Resource { context: String },

    #[error("label color did not match any known class")]
    UnknownClass,

    #[error("filter families do not match ({a} vs {b})")]
    FilterFamilyMismatch { a: String, b: String },

    #[error("class counts do not match ({a} vs {b})")]
    ClassCountMismatch { a: usize, b: usize },

    #[error("colormaps do not match")]
    ColormapMismatch,
}

pub type Result<T> = std::result::Result<T, Error>;
