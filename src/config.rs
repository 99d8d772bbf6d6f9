//! Training/classification parameter bundles, collected once from parsed
//! CLI flags and threaded down into the core as plain structs.

use std::path::PathBuf;

use crate::dataset::SamplingMode;
use crate::filter::FilterFamily;

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub winsize: i32,
    pub ntrees: usize,
    pub nfeatures: usize,
    pub niter: usize,
    pub nthreads: usize,
    pub filter_family: FilterFamily,
    pub cross_channel: bool,
    pub seed: u64,
    pub ndata: usize,
    pub sampling_mode: SamplingMode,
    pub binary_colormap: bool,
    pub output: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> TrainConfig {
        TrainConfig {
            winsize: 61,
            ntrees: 64,
            nfeatures: 64,
            niter: 64,
            nthreads: 1,
            filter_family: FilterFamily::Points,
            cross_channel: false,
            seed: 0,
            ndata: 100_000,
            sampling_mode: SamplingMode::Random,
            binary_colormap: false,
            output: PathBuf::from("out.forest"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    pub forest: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub skip: usize,
    pub probs: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepMethod {
    Intensity,
    Hsv,
    Greyworld,
    Normalize,
    Bandpass,
    Bars,
    Flatfield,
    GreyRgb,
}

#[derive(Debug, Clone)]
pub struct PrepConfig {
    pub method: PrepMethod,
    pub input: PathBuf,
    pub output: PathBuf,
    pub maxval: u8,
    pub target_mu: f64,
    pub target_stdev: f64,
    pub robust: f64,
    pub wbig: usize,
    pub wsmall: usize,
    pub norients: usize,
    pub nscales: usize,
    pub support: usize,
    pub flatfield: Option<PathBuf>,
}

impl Default for PrepConfig {
    fn default() -> PrepConfig {
        PrepConfig {
            method: PrepMethod::Intensity,
            input: PathBuf::new(),
            output: PathBuf::new(),
            maxval: 255,
            target_mu: 128.0,
            target_stdev: 32.0,
            robust: 0.0,
            wbig: 21,
            wsmall: 3,
            norients: 4,
            nscales: 2,
            support: 9,
            flatfield: None,
        }
    }
}
