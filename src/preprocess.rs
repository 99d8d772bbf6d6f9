//! Pure `RasterImage -> RasterImage` preprocessing functions. None of these
//! touch the forest/tree/filter core; they only produce the multi-channel
//! rasters the core consumes.

use crate::error::{Error, Result};
use crate::raster::RasterImage;

/// Per-pixel mean over channels, 1-channel output.
pub fn intensity(src: &RasterImage) -> RasterImage {
    let mut out = RasterImage::new(src.rows, src.cols, 1);
    for r in 0..src.rows {
        for c in 0..src.cols {
            let mut sum = 0u32;
            for ch in 0..src.chans {
                sum += src.get(r, c, ch) as u32;
            }
            out.set(r, c, 0, (sum / src.chans as u32) as u8);
        }
    }
    out
}

/// Standard RGB -> HSV, rescaled back into `0..=maxval`. Requires a
/// 3-channel source.
pub fn rgb_to_hsv(src: &RasterImage, maxval: u8) -> Result<RasterImage> {
    if src.chans != 3 {
        return Err(Error::Geometry { context: "rgb_to_hsv requires a 3-channel image".to_string() });
    }
    let mut out = RasterImage::new(src.rows, src.cols, 3);
    let scale = maxval as f64;
    for r in 0..src.rows {
        for c in 0..src.cols {
            let rr = src.get(r, c, 0) as f64 / 255.0;
            let gg = src.get(r, c, 1) as f64 / 255.0;
            let bb = src.get(r, c, 2) as f64 / 255.0;
            let maxc = rr.max(gg).max(bb);
            let minc = rr.min(gg).min(bb);
            let delta = maxc - minc;

            let hue = if delta.abs() < 1e-12 {
                0.0
            } else if maxc == rr {
                60.0 * (((gg - bb) / delta).rem_euclid(6.0))
            } else if maxc == gg {
                60.0 * ((bb - rr) / delta + 2.0)
            } else {
                60.0 * ((rr - gg) / delta + 4.0)
            };
            let sat = if maxc.abs() < 1e-12 { 0.0 } else { delta / maxc };
            let val = maxc;

            out.set(r, c, 0, ((hue / 360.0) * scale) as u8);
            out.set(r, c, 1, (sat * scale) as u8);
            out.set(r, c, 2, (val * scale) as u8);
        }
    }
    Ok(out)
}

/// Per-channel grey-world color constancy: scale each channel so its mean
/// equals `target_mu`.
pub fn greyworld(src: &RasterImage, target_mu: f64) -> RasterImage {
    let mut out = RasterImage::new(src.rows, src.cols, src.chans);
    let npix = (src.rows * src.cols) as f64;
    for ch in 0..src.chans {
        let mut sum = 0.0;
        for r in 0..src.rows {
            for c in 0..src.cols {
                sum += src.get(r, c, ch) as f64;
            }
        }
        let mean = sum / npix;
        let scale = if mean.abs() < 1e-9 { 1.0 } else { target_mu / mean };
        for r in 0..src.rows {
            for c in 0..src.cols {
                let v = (src.get(r, c, ch) as f64 * scale).round().clamp(0.0, 255.0);
                out.set(r, c, ch, v as u8);
            }
        }
    }
    out
}

fn mean_stdev(values: &[f64], robust: f64) -> (f64, f64) {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let stdev = var.sqrt();

    if robust <= 0.0 || stdev < 1e-12 {
        return (mean, stdev);
    }
    let lo = mean - robust * stdev;
    let hi = mean + robust * stdev;
    let kept: Vec<f64> = values.iter().copied().filter(|v| *v >= lo && *v <= hi).collect();
    if kept.is_empty() {
        return (mean, stdev);
    }
    let mean2 = kept.iter().sum::<f64>() / kept.len() as f64;
    let var2 = kept.iter().map(|v| (v - mean2).powi(2)).sum::<f64>() / kept.len() as f64;
    (mean2, var2.sqrt())
}

/// Affine rescale of every channel so it has mean `target_mu` and stdev
/// `target_stdev`. `robust` (if > 0) clips outliers beyond that many
/// standard deviations before recomputing the statistics used for scaling.
pub fn normalize(src: &RasterImage, target_mu: f64, target_stdev: f64, robust: f64) -> RasterImage {
    let mut out = RasterImage::new(src.rows, src.cols, src.chans);
    for ch in 0..src.chans {
        let values: Vec<f64> = (0..src.rows)
            .flat_map(|r| (0..src.cols).map(move |c| (r, c)))
            .map(|(r, c)| src.get(r, c, ch) as f64)
            .collect();
        let (mean, stdev) = mean_stdev(&values, robust);
        let scale = if stdev < 1e-9 { 0.0 } else { target_stdev / stdev };
        for r in 0..src.rows {
            for c in 0..src.cols {
                let v = target_mu + (src.get(r, c, ch) as f64 - mean) * scale;
                out.set(r, c, ch, v.round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

/// Box blur of the given odd `width`, edge-replicated at the border.
pub fn moving_average(src: &RasterImage, width: usize) -> RasterImage {
    let half = (width / 2) as i64;
    let mut out = RasterImage::new(src.rows, src.cols, src.chans);
    for ch in 0..src.chans {
        for r in 0..src.rows {
            for c in 0..src.cols {
                let mut sum = 0u32;
                let mut n = 0u32;
                for dr in -half..=half {
                    for dc in -half..=half {
                        let rr = (r as i64 + dr).clamp(0, src.rows as i64 - 1) as usize;
                        let cc = (c as i64 + dc).clamp(0, src.cols as i64 - 1) as usize;
                        sum += src.get(rr, cc, ch) as u32;
                        n += 1;
                    }
                }
                out.set(r, c, ch, (sum / n) as u8);
            }
        }
    }
    out
}

/// Texture bandpass: difference of a wide and a narrow box blur, recentered
/// to `target_mu`.
pub fn bandpass(src: &RasterImage, wbig: usize, wsmall: usize, target_mu: f64) -> RasterImage {
    let big = moving_average(src, wbig);
    let small = moving_average(src, wsmall);
    let mut out = RasterImage::new(src.rows, src.cols, src.chans);
    for ch in 0..src.chans {
        for r in 0..src.rows {
            for c in 0..src.cols {
                let diff = small.get(r, c, ch) as f64 - big.get(r, c, ch) as f64;
                let v = (diff + target_mu).round().clamp(0.0, 255.0);
                out.set(r, c, ch, v as u8);
            }
        }
    }
    out
}

/// A precomputed table of oriented bar-detector kernels, fixed-point scaled
/// by `FIXED_SCALE`. Passed by value into [`oriented_bars`] rather than held
/// in a global — the kernel bank has no reason to outlive one preprocessing
/// call.
#[derive(Debug, Clone)]
pub struct BarBank {
    pub support: usize,
    pub norients: usize,
    pub nscales: usize,
    kernels: Vec<Vec<i32>>, // one support*support kernel per (orientation, scale)
}

const FIXED_SCALE: i64 = 1024;

/// Build a bank of `norients * nscales` bar-detector kernels over a
/// `support x support` window: a positive central band at a given
/// orientation and width, negative on either side, normalized to sum to
/// zero.
pub fn build_bar_bank(norients: usize, nscales: usize, support: usize) -> BarBank {
    let mut kernels = Vec::with_capacity(norients * nscales);
    let center = (support as f64 - 1.0) / 2.0;

    for orient in 0..norients {
        let theta = std::f64::consts::PI * orient as f64 / norients as f64;
        let (sin_t, cos_t) = theta.sin_cos();
        for scale in 0..nscales {
            let band_half_width = 0.5 + scale as f64;
            let mut kernel = vec![0f64; support * support];
            let mut pos_sum = 0.0;
            let mut neg_sum = 0.0;
            for y in 0..support {
                for x in 0..support {
                    let dx = x as f64 - center;
                    let dy = y as f64 - center;
                    // distance from the oriented axis through the center
                    let perp = dx * (-sin_t) + dy * cos_t;
                    let weight = if perp.abs() <= band_half_width { 1.0 } else { -1.0 };
                    kernel[y * support + x] = weight;
                    if weight > 0.0 {
                        pos_sum += 1.0;
                    } else {
                        neg_sum += 1.0;
                    }
                }
            }
            if pos_sum > 0.0 && neg_sum > 0.0 {
                for v in kernel.iter_mut() {
                    if *v > 0.0 {
                        *v /= pos_sum;
                    } else {
                        *v /= -neg_sum;
                    }
                }
            }
            let fixed: Vec<i32> = kernel.iter().map(|v| (v * FIXED_SCALE as f64).round() as i32).collect();
            kernels.push(fixed);
        }
    }

    BarBank { support, norients, nscales, kernels }
}

/// Apply a precomputed [`BarBank`] to `src`'s intensity, producing one
/// output channel per (orientation, scale) pair.
pub fn oriented_bars(src: &RasterImage, bank: &BarBank) -> RasterImage {
    let grey = intensity(src);
    let half = (bank.support / 2) as i64;
    let nout = bank.norients * bank.nscales;
    let mut out = RasterImage::new(src.rows, src.cols, nout);

    for (k, kernel) in bank.kernels.iter().enumerate() {
        for r in 0..src.rows {
            for c in 0..src.cols {
                let mut acc: i64 = 0;
                for ky in 0..bank.support {
                    for kx in 0..bank.support {
                        let rr = (r as i64 + ky as i64 - half).clamp(0, src.rows as i64 - 1) as usize;
                        let cc = (c as i64 + kx as i64 - half).clamp(0, src.cols as i64 - 1) as usize;
                        acc += grey.get(rr, cc, 0) as i64 * kernel[ky * bank.support + kx] as i64;
                    }
                }
                let v = (acc / FIXED_SCALE + 128).clamp(0, 255);
                out.set(r, c, k, v as u8);
            }
        }
    }
    out
}

/// Per-pixel divide-and-rescale flat-field correction:
/// `out = clamp(src / field * 128, 0, 255)`. The caller is expected to load
/// `field` first and propagate any read failure as an error *before*
/// calling this — the original's `TEXTURECAM` branch had a bug that skipped
/// this step unconditionally; that bug is not reproduced here.
pub fn flatfield(src: &RasterImage, field: &RasterImage) -> Result<RasterImage> {
    if src.rows != field.rows || src.cols != field.cols || src.chans != field.chans {
        return Err(Error::Geometry { context: "flat field dimensions do not match source image".to_string() });
    }
    let mut out = RasterImage::new(src.rows, src.cols, src.chans);
    for ch in 0..src.chans {
        for r in 0..src.rows {
            for c in 0..src.cols {
                let f = field.get(r, c, ch) as f64;
                let s = src.get(r, c, ch) as f64;
                let v = if f.abs() < 1e-9 { 0.0 } else { (s / f * 128.0).round() };
                out.set(r, c, ch, v.clamp(0.0, 255.0) as u8);
            }
        }
    }
    Ok(out)
}

/// Triplicate a single-channel image into 3 identical channels.
pub fn grey_to_rgb(src: &RasterImage) -> Result<RasterImage> {
    if src.chans != 1 {
        return Err(Error::Geometry { context: "grey_to_rgb requires a single-channel image".to_string() });
    }
    let mut out = RasterImage::new(src.rows, src.cols, 3);
    for r in 0..src.rows {
        for c in 0..src.cols {
            let v = src.get(r, c, 0);
            out.set(r, c, 0, v);
            out.set(r, c, 1, v);
            out.set(r, c, 2, v);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intensity_averages_channels() {
        let mut src = RasterImage::new(1, 1, 3);
        src.set(0, 0, 0, 10);
        src.set(0, 0, 1, 20);
        src.set(0, 0, 2, 30);
        let out = intensity(&src);
        assert_eq!(out.get(0, 0, 0), 20);
    }

    #[test]
    fn greyworld_rescales_channel_mean() {
        let mut src = RasterImage::new(2, 2, 1);
        src.data.copy_from_slice(&[10, 20, 30, 40]);
        let out = greyworld(&src, 100.0);
        let mean: f64 = out.data.iter().map(|&v| v as f64).sum::<f64>() / 4.0;
        assert!((mean - 100.0).abs() < 2.0);
    }

    #[test]
    fn normalize_hits_target_mean_and_stdev() {
        let mut src = RasterImage::new(4, 1, 1);
        src.data.copy_from_slice(&[0, 50, 100, 150]);
        let out = normalize(&src, 128.0, 10.0, 0.0);
        let values: Vec<f64> = out.data.iter().map(|&v| v as f64).collect();
        let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
        assert!((mean - 128.0).abs() < 2.0);
    }

    #[test]
    fn flatfield_rejects_mismatched_dimensions() {
        let src = RasterImage::new(2, 2, 1);
        let field = RasterImage::new(3, 3, 1);
        assert!(flatfield(&src, &field).is_err());
    }

    #[test]
    fn grey_to_rgb_triplicates_channel() {
        let mut src = RasterImage::new(1, 1, 1);
        src.set(0, 0, 0, 77);
        let out = grey_to_rgb(&src).unwrap();
        assert_eq!(out.get(0, 0, 0), 77);
        assert_eq!(out.get(0, 0, 1), 77);
        assert_eq!(out.get(0, 0, 2), 77);
    }

    #[test]
    fn oriented_bars_produces_one_channel_per_orientation_scale() {
        let src = RasterImage::new(16, 16, 1);
        let bank = build_bar_bank(4, 2, 9);
        let out = oriented_bars(&src, &bank);
        assert_eq!(out.chans, 8);
    }
}
