//! Per-thread random feature search: the core split-quality criterion.
//!
//! Each call to [`search`] tries `nfeatures` random candidate filters
//! against the same sample subset and keeps the single best one, scored by
//! expected posterior class entropy (lower entropy, i.e. more negative,
//! scores higher — see `score` below).

use rand::Rng;

use crate::dataset::Dataset;
use crate::filter::{Filter, FilterFamily};
use crate::{MIN_SPLIT, MIN_THRESH, N_THRESH, SMALL};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub filter: Filter,
    pub threshold: i64,
    pub score: f64,
    pub valid: bool,
}

impl Candidate {
    fn invalid() -> Candidate {
        Candidate { filter: Filter::raw_at_origin(), threshold: 0, score: -9e99, valid: false }
    }
}

/// Per-class scale so the most represented class contributes mass `1` and
/// rarer classes are upweighted proportionally. Mirrors the "class mass
/// reweighting" scheme: `mass[k] = max_j represented[j] / represented[k]`.
fn mass_scale(represented: &[usize], nclasses: usize) -> Vec<f64> {
    let max_represented = represented[1..nclasses].iter().copied().max().unwrap_or(0) as f64;
    (0..nclasses)
        .map(|k| if represented[k] > 0 { max_represented / represented[k] as f64 } else { 0.0 })
        .collect()
}

/// Search `nfeatures` random candidates drawn from `family` against the
/// samples in `subset` (indices into `dataset.samples`), returning the best
/// scoring one. `valid` is `false` if no candidate ever cleared the
/// `MIN_SPLIT` gate on both sides of any threshold.
pub fn search<R: Rng + ?Sized>(
    dataset: &Dataset,
    subset: &[usize],
    family: FilterFamily,
    chans: usize,
    winsize: i32,
    cross_channel: bool,
    nfeatures: usize,
    rng: &mut R,
) -> Candidate {
    let nclasses = dataset.nclasses;
    let mass = mass_scale(&dataset.represented, nclasses);
    let mut best = Candidate::invalid();

    for _ in 0..nfeatures {
        let filter = Filter::randomize(rng, family, chans, winsize, cross_channel);
        let mut counts = vec![vec![0.0f64; N_THRESH]; nclasses];

        for &idx in subset {
            let sample = &dataset.samples[idx];
            let image = &dataset.images[sample.image_index];
            let result = match filter.evaluate(image, sample.r, sample.c) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let label = sample.label as usize;
            if label >= nclasses {
                continue;
            }
            let bucket = (result - MIN_THRESH).clamp(0, N_THRESH as i64 - 1) as usize;
            counts[label][bucket] += mass[label];
        }

        let mut accum = vec![vec![0.0f64; N_THRESH]; nclasses];
        for k in 0..nclasses {
            let mut running = 0.0;
            for t in 0..N_THRESH {
                running += counts[k][t];
                accum[k][t] = running;
            }
        }

        for t in 1..N_THRESH - 1 {
            let mut total_low = 0.0;
            let mut total_high = 0.0;
            let mut low = vec![0.0f64; nclasses];
            let mut high = vec![0.0f64; nclasses];
            for k in 0..nclasses {
                low[k] = accum[k][t];
                high[k] = accum[k][N_THRESH - 1] - accum[k][t];
                total_low += low[k];
                total_high += high[k];
            }
            if total_low < MIN_SPLIT || total_high < MIN_SPLIT {
                continue;
            }

            let h_low = entropy(&low, &high, total_low);
            let h_high = entropy(&high, &low, total_high);
            let score = (total_high * h_high + total_low * h_low) / (total_high + total_low);

            if score > best.score {
                best = Candidate {
                    filter,
                    threshold: MIN_THRESH + t as i64,
                    score,
                    valid: true,
                };
            }
        }
    }

    best
}

/// `Σ (p_k/total) ln(p_k/total)` over classes with mass on *both* sides of
/// the split (`side[k]` and `other[k]` both ≥ `SMALL`).
fn entropy(side: &[f64], other: &[f64], total: f64) -> f64 {
    let mut h = 0.0;
    for k in 0..side.len() {
        if side[k] >= SMALL && other[k] >= SMALL {
            let p = side[k] / total;
            h += p * p.ln();
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{build_random_dataset, SamplingMode};
    use crate::raster::RasterImage;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn checkerboard_dataset(ndata: usize) -> Dataset {
        let rows = 8;
        let cols = 8;
        let mut image = RasterImage::new(rows, cols, 1);
        let mut labels = RasterImage::new(rows, cols, 1);
        for r in 0..rows {
            for c in 0..cols {
                let on = c < cols / 2;
                image.set(r, c, 0, if on { 10 } else { 200 });
                labels.set(r, c, 0, if on { 1 } else { 2 });
            }
        }
        build_random_dataset(vec![image], vec![labels], None, ndata, SamplingMode::Random, 11).unwrap()
    }

    #[test]
    fn finds_a_valid_split_on_separable_data() {
        let dataset = checkerboard_dataset(200);
        let subset: Vec<usize> = (0..dataset.samples.len()).collect();
        let mut rng = SmallRng::seed_from_u64(5);
        let best = search(&dataset, &subset, FilterFamily::Points, 1, 5, false, 128, &mut rng);
        assert!(best.valid);
        assert!(best.score > -9e99);
    }

    #[test]
    fn mass_scale_upweights_rare_classes() {
        let represented = [0usize, 90, 10, 0, 0, 0, 0, 0];
        let scale = mass_scale(&represented, 3);
        assert!((scale[1] - 1.0).abs() < 1e-9);
        assert!((scale[2] - 9.0).abs() < 1e-9);
    }
}
