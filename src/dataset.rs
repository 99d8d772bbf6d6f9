//! Training samples drawn from a set of labeled images.
//!
//! Samples live in one flat array owned by the `Dataset`; nodes never hold
//! samples directly, they only remember where their bucket starts. The
//! `next` array threads buckets through the flat array the same way the
//! original threads them through pointers — here via parallel-array indices.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::colormap::Colormap;
use crate::error::{Error, Result};
use crate::raster::{LabelImage, RasterImage};
use crate::MAX_CLASSES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    Random,
    Balanced,
}

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub image_index: usize,
    pub r: usize,
    pub c: usize,
    pub label: u8,
}

#[derive(Debug)]
pub struct Dataset {
    pub images: Vec<RasterImage>,
    pub labels: Vec<LabelImage>,
    pub samples: Vec<Sample>,
    pub next: Vec<Option<usize>>,
    pub represented: [usize; MAX_CLASSES],
    pub nclasses: usize,
}

impl Dataset {
    /// Number of samples reachable by walking `next` from `head`.
    pub fn bucket_len(&self, head: Option<usize>) -> usize {
        let mut count = 0;
        let mut cur = head;
        while let Some(idx) = cur {
            count += 1;
            cur = self.next[idx];
        }
        count
    }

    /// Iterate sample indices reachable from `head` in link order.
    pub fn bucket_indices(&self, head: Option<usize>) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = head;
        while let Some(idx) = cur {
            out.push(idx);
            cur = self.next[idx];
        }
        out
    }
}

/// Load images and label rasters, scan label rasters for per-image class
/// histograms, then draw `ndata` samples according to `mode`.
pub fn build_random_dataset(
    images: Vec<RasterImage>,
    label_rasters: Vec<RasterImage>,
    colormap: Option<&Colormap>,
    ndata: usize,
    mode: SamplingMode,
    seed: u64,
) -> Result<Dataset> {
    if images.len() != label_rasters.len() {
        return Err(Error::Geometry { context: "image and label counts differ".to_string() });
    }
    let nimages = images.len();
    if nimages == 0 {
        return Err(Error::Geometry { context: "no images supplied".to_string() });
    }

    let mut labels = Vec::with_capacity(nimages);
    let mut per_image_counts = Vec::with_capacity(nimages);
    let mut nclasses = 1usize;

    for (image, raw_label) in images.iter().zip(label_rasters.iter()) {
        if image.rows != raw_label.rows || image.cols != raw_label.cols {
            return Err(Error::Geometry { context: "image and label dimensions differ".to_string() });
        }

        let (label_image, counts) = match colormap {
            Some(map) => map.label_image(raw_label)?,
            None => {
                if raw_label.chans != 1 {
                    return Err(Error::Geometry {
                        context: "label raster must be single-channel without a colormap".to_string(),
                    });
                }
                let mut out = LabelImage::new(raw_label.rows, raw_label.cols);
                let mut counts = vec![0usize; MAX_CLASSES];
                for r in 0..raw_label.rows {
                    for c in 0..raw_label.cols {
                        let label = raw_label.get(r, c, 0);
                        out.set(r, c, label);
                        if (label as usize) < MAX_CLASSES {
                            counts[label as usize] += 1;
                        }
                    }
                }
                (out, counts)
            }
        };

        nclasses = nclasses.max(counts.len()).min(MAX_CLASSES);
        for (k, &n) in counts.iter().enumerate() {
            if n > 0 {
                nclasses = nclasses.max(k + 1);
            }
        }
        per_image_counts.push(counts);
        labels.push(label_image);
    }

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(ndata);
    let mut represented = [0usize; MAX_CLASSES];
    let mut current_label = 1usize;

    while samples.len() < ndata {
        let i = rng.gen_range(0..nimages);
        let r = rng.gen_range(0..images[i].rows);
        let c = rng.gen_range(0..images[i].cols);
        let label = labels[i].get(r, c);

        if label == 0 || label as usize >= MAX_CLASSES || label as usize >= nclasses {
            continue;
        }

        if mode == SamplingMode::Balanced {
            let has_label = per_image_counts[i].get(current_label).copied().unwrap_or(0) > 0;
            if !has_label || label as usize != current_label {
                continue;
            }
        }

        samples.push(Sample { image_index: i, r, c, label });
        represented[label as usize] += 1;

        if mode == SamplingMode::Balanced && nclasses > 1 {
            current_label = (current_label % (nclasses - 1)) + 1;
        }
    }

    let n = samples.len();
    let next = (0..n).map(|i| if i + 1 < n { Some(i + 1) } else { None }).collect();

    Ok(Dataset { images, labels, samples, next, represented, nclasses })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(rows: usize, cols: usize) -> (RasterImage, RasterImage) {
        let mut image = RasterImage::new(rows, cols, 1);
        let mut labels = RasterImage::new(rows, cols, 1);
        for r in 0..rows {
            for c in 0..cols {
                let on = (r + c) % 2 == 0;
                image.set(r, c, 0, if on { 10 } else { 200 });
                labels.set(r, c, 0, if on { 1 } else { 2 });
            }
        }
        (image, labels)
    }

    #[test]
    fn random_sampling_never_draws_background() {
        let (image, labels) = checkerboard(8, 8);
        let dataset =
            build_random_dataset(vec![image], vec![labels], None, 200, SamplingMode::Random, 42).unwrap();
        assert_eq!(dataset.samples.len(), 200);
        assert!(dataset.samples.iter().all(|s| s.label == 1 || s.label == 2));
    }

    #[test]
    fn balanced_sampling_keeps_classes_within_one_of_each_other() {
        let mut image = RasterImage::new(10, 10, 1);
        let mut labels = RasterImage::new(10, 10, 1);
        for r in 0..10 {
            for c in 0..10 {
                image.set(r, c, 0, 50);
                // 90 pixels of class 1, 10 of class 2
                labels.set(r, c, 0, if r == 0 { 2 } else { 1 });
            }
        }
        let dataset =
            build_random_dataset(vec![image], vec![labels], None, 300, SamplingMode::Balanced, 7).unwrap();
        let diff = (dataset.represented[1] as i64 - dataset.represented[2] as i64).abs();
        assert!(diff <= 1, "represented counts differ by {}", diff);
    }

    #[test]
    fn next_chain_links_all_samples_in_order() {
        let (image, labels) = checkerboard(6, 6);
        let dataset =
            build_random_dataset(vec![image], vec![labels], None, 10, SamplingMode::Random, 1).unwrap();
        for i in 0..dataset.samples.len() - 1 {
            assert_eq!(dataset.next[i], Some(i + 1));
        }
        assert_eq!(dataset.next[dataset.samples.len() - 1], None);
        assert_eq!(dataset.bucket_len(Some(0)), dataset.samples.len());
    }
}
