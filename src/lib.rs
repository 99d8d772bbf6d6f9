//! Random-forest engine for pixel-level texture classification of raster
//! images, built around arithmetic pixel-pair filters evaluated over a local
//! window and trees grown by parallel entropy-minimizing random search.

pub mod colormap;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod forest;
pub mod grow;
pub mod node;
pub mod preprocess;
pub mod raster;
pub mod trainer;
pub mod tree;

pub use error::{Error, Result};

/// Background/unlabeled class. Never predicted, never counted.
pub const UNCLASSIFIED: u8 = 0;

/// Returned by a classifier when every filter along a root-to-leaf path
/// hits `NoData`, or a tree index is empty. Distinct from any real class.
pub const ERROR_CLASS: u8 = 255;

/// Upper bound on distinct classes a colormap/forest can carry (background
/// plus 7 labeled classes), fixing the width of fixed-size count/probability
/// arrays on `Node`.
pub const MAX_CLASSES: usize = 8;

/// Hard cap on nodes per tree; bounds worst-case memory and keeps a grow
/// pass's parallel fan-out finite. Matches the original's fixed-size node
/// array, kept as the cap on an append-only `Vec` rather than preallocated.
pub const MAX_TREE_NODES: usize = 512;

/// Width of the per-candidate threshold histogram; valid thresholds span
/// `MIN_THRESH .. MIN_THRESH + N_THRESH`.
pub const N_THRESH: usize = 512;

/// Lowest threshold value a candidate split can take.
pub const MIN_THRESH: i64 = -255;

/// Minimum mass-weighted sample count on a side of a candidate split for
/// that threshold to be considered.
pub const MIN_SPLIT: f64 = 32.0;

/// Minimum bucket size (unweighted sample count) a leaf must hold before it
/// is even offered to the trainers for expansion.
pub const MIN_SAMPLES: usize = 32;

/// Floor under any per-class probability reported by the forest; keeps
/// downstream log-probability math finite.
pub const MIN_PROB: f32 = 2.678_636_961_808_078e-33;

/// Smallest magnitude treated as nonzero in entropy and mass-reweighting
/// arithmetic.
pub const SMALL: f64 = 1e-10;
