//! Maps label-image color tuples to dense class indices.
//!
//! Color `0` (all channels zero) is always the unlabeled/background class.

use crate::error::{Error, Result};
use crate::raster::{LabelImage, RasterImage};
use crate::MAX_CLASSES;

#[derive(Debug, Clone)]
pub struct Colormap {
    pub nclasses: usize,
    pub colordepth: usize,
    pub colors: Vec<[u8; 4]>, // up to 4 channels stored; only colordepth used
}

impl Colormap {
    pub fn new(colordepth: usize) -> Self {
        let mut colors = vec![[0u8; 4]; MAX_CLASSES];
        colors[0] = [0, 0, 0, 0];
        Colormap { nclasses: 1, colordepth, colors }
    }

    /// Blue=background (class 1), red=foreground (class 2), 3-channel convention.
    pub fn binary() -> Self {
        let mut map = Colormap::new(3);
        map.colors[1] = [0, 0, 255, 0];
        map.colors[2] = [255, 0, 0, 0];
        map.nclasses = 3;
        map
    }

    fn color_at(&self, raster: &RasterImage, r: usize, c: usize) -> Vec<u8> {
        (0..self.colordepth).map(|b| raster.get(r, c, b)).collect()
    }

    fn matches(&self, class: usize, color: &[u8]) -> bool {
        (0..self.colordepth).all(|b| self.colors[class][b] == color[b])
    }

    /// Scan a label raster and extend the palette with any new colors found.
    /// Mirrors `tc_find_classes`.
    pub fn find_classes(&mut self, label_raster: &RasterImage) -> Result<()> {
        if label_raster.chans < self.colordepth {
            return Err(Error::Geometry {
                context: format!(
                    "label image has {} channels, expected at least {}",
                    label_raster.chans, self.colordepth
                ),
            });
        }
        if label_raster.chans != self.colordepth {
            return Err(Error::Geometry {
                context: "mismatch between colormap depth and label image channel count"
                    .to_string(),
            });
        }

        for r in 0..label_raster.rows {
            for c in 0..label_raster.cols {
                let color = self.color_at(label_raster, r, c);
                let known = (0..self.nclasses).any(|i| self.matches(i, &color));
                if !known {
                    if self.nclasses >= MAX_CLASSES {
                        return Err(Error::Resource {
                            context: "max number of classes exceeded".to_string(),
                        });
                    }
                    for b in 0..self.colordepth {
                        self.colors[self.nclasses][b] = color[b];
                    }
                    self.nclasses += 1;
                }
            }
        }
        Ok(())
    }

    /// Map every pixel's color tuple to its class index, producing a dense
    /// `LabelImage` and per-class pixel counts. Mirrors `tc_label_image`.
    pub fn label_image(&self, raster: &RasterImage) -> Result<(LabelImage, Vec<usize>)> {
        if self.colordepth > raster.chans {
            return Err(Error::Geometry {
                context: "colormap channel count exceeds label image channel count".to_string(),
            });
        }
        let mut out = LabelImage::new(raster.rows, raster.cols);
        let mut counts = vec![0usize; self.nclasses];

        for r in 0..raster.rows {
            for c in 0..raster.cols {
                let color = self.color_at(raster, r, c);
                let class = (0..self.nclasses).find(|&i| self.matches(i, &color));
                match class {
                    Some(class) => {
                        out.set(r, c, class as u8);
                        counts[class] += 1;
                    }
                    None => return Err(Error::UnknownClass),
                }
            }
        }
        Ok((out, counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_colormap_has_two_classes_plus_background() {
        let map = Colormap::binary();
        assert_eq!(map.nclasses, 3);
        assert_eq!(map.colors[0], [0, 0, 0, 0]);
    }

    #[test]
    fn find_classes_discovers_palette() {
        let mut raster = RasterImage::new(2, 2, 3);
        raster.set(0, 0, 0, 0);
        raster.set(0, 0, 1, 0);
        raster.set(0, 0, 2, 0);
        raster.set(0, 1, 0, 10);
        raster.set(0, 1, 1, 20);
        raster.set(0, 1, 2, 30);
        raster.set(1, 0, 0, 10);
        raster.set(1, 0, 1, 20);
        raster.set(1, 0, 2, 30);
        raster.set(1, 1, 0, 40);
        raster.set(1, 1, 1, 50);
        raster.set(1, 1, 2, 60);

        let mut map = Colormap::new(3);
        map.find_classes(&raster).unwrap();
        assert_eq!(map.nclasses, 3); // background + two distinct colors
    }

    #[test]
    fn label_image_maps_colors_to_dense_indices() {
        let mut raster = RasterImage::new(1, 2, 3);
        raster.set(0, 1, 0, 255);
        raster.set(0, 1, 1, 0);
        raster.set(0, 1, 2, 0);

        let mut map = Colormap::new(3);
        map.colors[1] = [255, 0, 0, 0];
        map.nclasses = 2;

        let (labels, counts) = map.label_image(&raster).unwrap();
        assert_eq!(labels.get(0, 0), 0);
        assert_eq!(labels.get(0, 1), 1);
        assert_eq!(counts, vec![1, 1]);
    }

    #[test]
    fn unknown_color_is_an_error() {
        let mut raster = RasterImage::new(1, 1, 3);
        raster.set(0, 0, 0, 9);
        raster.set(0, 0, 1, 9);
        raster.set(0, 0, 2, 9);
        let map = Colormap::new(3);
        assert!(map.label_image(&raster).is_err());
    }
}
