//! Pixel-level arithmetic features evaluated over a local window.
//!
//! A filter samples one or two pixel locations offset from a query pixel
//! and combines them arithmetically. Training searches random filters from
//! one of three families; the winning filter is persisted as a compact
//! string in the forest file (`spec.md` §6.1) and must evaluate identically
//! whether it came from training or was just parsed off disk.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::raster::RasterImage;

/// Sentinel returned to callers when a filter references an out-of-bounds
/// pixel. Distinct from `ERROR_CLASS` and `UNCLASSIFIED` (`spec.md` §9).
pub const NO_DATA: i64 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Raw = 0,
    Sum = 1,
    Diff = 2,
    Abs = 3,
    Ratio = 4,
    Rect = 5,
}

impl FilterKind {
    fn from_i32(v: i32) -> Option<FilterKind> {
        Some(match v {
            0 => FilterKind::Raw,
            1 => FilterKind::Sum,
            2 => FilterKind::Diff,
            3 => FilterKind::Abs,
            4 => FilterKind::Ratio,
            5 => FilterKind::Rect,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterFamily {
    Points,
    Ratios,
    Rectangles,
}

impl FilterFamily {
    pub fn name(&self) -> &'static str {
        match self {
            FilterFamily::Points => "points",
            FilterFamily::Ratios => "ratios",
            FilterFamily::Rectangles => "rectangles",
        }
    }

    pub fn from_name(name: &str) -> Option<FilterFamily> {
        Some(match name {
            "points" => FilterFamily::Points,
            "ratios" => FilterFamily::Ratios,
            "rectangles" => FilterFamily::Rectangles,
            _ => return None,
        })
    }

    pub fn to_id(self) -> i32 {
        match self {
            FilterFamily::Points => 0,
            FilterFamily::Ratios => 1,
            FilterFamily::Rectangles => 2,
        }
    }

    pub fn from_id(id: i32) -> Option<FilterFamily> {
        Some(match id {
            0 => FilterFamily::Points,
            1 => FilterFamily::Ratios,
            2 => FilterFamily::Rectangles,
            _ => return None,
        })
    }
}

/// A single offset `(dr, dc, channel)` relative to a query pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub dr: i32,
    pub dc: i32,
    pub ch: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub kind: FilterKind,
    pub a: Offset,
    pub b: Offset,
}

impl Filter {
    pub fn raw_at_origin() -> Filter {
        Filter {
            kind: FilterKind::Raw,
            a: Offset { dr: 0, dc: 0, ch: 0 },
            b: Offset { dr: 0, dc: 0, ch: 0 },
        }
    }

    /// Evaluate the filter at query pixel `(r, c)`. Returns `NoData` if any
    /// referenced position or channel falls outside `image`.
    pub fn evaluate(&self, image: &RasterImage, r: usize, c: usize) -> Result<i64, NoData> {
        let r = r as i64;
        let c = c as i64;

        let row_a = r + self.a.dr as i64;
        let col_a = c + self.a.dc as i64;
        let chan_a = self.a.ch as i64;
        if !image.in_bounds(row_a, col_a, chan_a) {
            return Err(NoData);
        }

        if self.kind == FilterKind::Raw {
            return Ok(image.get(row_a as usize, col_a as usize, chan_a as usize) as i64);
        }

        let row_b = r + self.b.dr as i64;
        let col_b = c + self.b.dc as i64;
        let chan_b = self.b.ch as i64;
        if !image.in_bounds(row_b, col_b, chan_b) {
            return Err(NoData);
        }

        let ra = row_a as usize;
        let ca = col_a as usize;
        let cha = chan_a as usize;
        let rb = row_b as usize;
        let cb = col_b as usize;
        let chb = chan_b as usize;

        let va = image.get(ra, ca, cha) as i64;
        let vb = image.get(rb, cb, chb) as i64;

        Ok(match self.kind {
            FilterKind::Raw => unreachable!(),
            FilterKind::Sum => va + vb,
            FilterKind::Diff => va - vb,
            FilterKind::Abs => (va - vb).abs(),
            FilterKind::Ratio => {
                let diff = va * 100 - vb * 100;
                diff / (va + 1)
            }
            FilterKind::Rect => {
                let v_rb_ca = image.get(rb, ca, cha) as i64;
                let v_ra_cb = image.get(ra, cb, cha) as i64;
                va + vb - v_ra_cb - v_rb_ca
            }
        })
    }

    /// Draw a random filter from the given family. Mirrors
    /// `tc_randomize_filter`.
    pub fn randomize<R: Rng + ?Sized>(
        rng: &mut R,
        family: FilterFamily,
        chans: usize,
        winsize: i32,
        cross_channel: bool,
    ) -> Filter {
        let halfwidth = winsize / 2;
        match family {
            FilterFamily::Points => {
                let chan_a = rng.gen_range(0..chans as i32);
                let chan_b = if cross_channel { rng.gen_range(0..chans as i32) } else { chan_a };
                let kinds = [
                    FilterKind::Raw,
                    FilterKind::Sum,
                    FilterKind::Diff,
                    FilterKind::Abs,
                    FilterKind::Ratio,
                ];
                let kind = kinds[rng.gen_range(0..kinds.len())];
                Filter {
                    kind,
                    a: Offset {
                        dr: rng.gen_range(-halfwidth..winsize - halfwidth),
                        dc: rng.gen_range(-halfwidth..winsize - halfwidth),
                        ch: chan_a,
                    },
                    b: Offset {
                        dr: rng.gen_range(-halfwidth..winsize - halfwidth),
                        dc: rng.gen_range(-halfwidth..winsize - halfwidth),
                        ch: chan_b,
                    },
                }
            }
            FilterFamily::Ratios => {
                let chan_a = rng.gen_range(0..chans as i32);
                let chan_b = if cross_channel { rng.gen_range(0..chans as i32) } else { chan_a };
                Filter {
                    kind: FilterKind::Ratio,
                    a: Offset {
                        dr: rng.gen_range(-halfwidth..winsize - halfwidth),
                        dc: rng.gen_range(-halfwidth..winsize - halfwidth),
                        ch: chan_a,
                    },
                    b: Offset {
                        dr: rng.gen_range(-halfwidth..winsize - halfwidth),
                        dc: rng.gen_range(-halfwidth..winsize - halfwidth),
                        ch: chan_b,
                    },
                }
            }
            FilterFamily::Rectangles => {
                let chan = rng.gen_range(0..chans as i32);
                let lo = -(winsize - 1);
                let hi = winsize;
                let mut row_a = rng.gen_range(lo..hi);
                let mut row_b = rng.gen_range(lo..hi);
                let mut col_a = rng.gen_range(lo..hi);
                let mut col_b = rng.gen_range(lo..hi);
                if row_a > row_b {
                    std::mem::swap(&mut row_a, &mut row_b);
                }
                if col_a > col_b {
                    std::mem::swap(&mut col_a, &mut col_b);
                }
                Filter {
                    kind: FilterKind::Rect,
                    a: Offset { dr: row_a, dc: col_a, ch: chan },
                    b: Offset { dr: row_b, dc: col_b, ch: chan },
                }
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "F{}_({},{},{})_({},{},{})",
            self.kind as i32,
            self.a.dr,
            self.a.dc,
            self.a.ch,
            self.b.dr,
            self.b.dc,
            self.b.ch
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParseError;

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Filter, FilterParseError> {
        let s = s.trim();
        let rest = s.strip_prefix('F').ok_or(FilterParseError)?;
        let (kind_str, rest) = rest.split_once('_').ok_or(FilterParseError)?;
        let kind = FilterKind::from_i32(kind_str.parse().map_err(|_| FilterParseError)?)
            .ok_or(FilterParseError)?;

        let rest = rest.trim();
        let (a_str, b_str) = rest.split_once(")_(").ok_or(FilterParseError)?;
        let a_str = a_str.trim_start_matches('(');
        let b_str = b_str.trim_end_matches(')');

        let a = parse_triple(a_str)?;
        let b = parse_triple(b_str)?;
        Ok(Filter { kind, a, b })
    }
}

fn parse_triple(s: &str) -> Result<Offset, FilterParseError> {
    let mut parts = s.split(',');
    let dr = parts.next().ok_or(FilterParseError)?.parse().map_err(|_| FilterParseError)?;
    let dc = parts.next().ok_or(FilterParseError)?.parse().map_err(|_| FilterParseError)?;
    let ch = parts.next().ok_or(FilterParseError)?.parse().map_err(|_| FilterParseError)?;
    if parts.next().is_some() {
        return Err(FilterParseError);
    }
    Ok(Offset { dr, dc, ch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn to_string_from_string_roundtrip() {
        let f = Filter {
            kind: FilterKind::Diff,
            a: Offset { dr: -3, dc: 4, ch: 1 },
            b: Offset { dr: 2, dc: -1, ch: 0 },
        };
        let s = f.to_string();
        let parsed: Filter = s.parse().unwrap();
        assert_eq!(f, parsed);
    }

    #[test]
    fn raw_only_checks_a() {
        let image = RasterImage::new(3, 3, 1);
        let f = Filter {
            kind: FilterKind::Raw,
            a: Offset { dr: 0, dc: 0, ch: 0 },
            b: Offset { dr: 100, dc: 100, ch: 0 },
        };
        assert_eq!(f.evaluate(&image, 1, 1), Ok(0));
    }

    #[test]
    fn out_of_bounds_is_nodata() {
        let image = RasterImage::new(3, 3, 1);
        let f = Filter {
            kind: FilterKind::Sum,
            a: Offset { dr: 5, dc: 0, ch: 0 },
            b: Offset { dr: 0, dc: 0, ch: 0 },
        };
        assert_eq!(f.evaluate(&image, 0, 0), Err(NoData));
    }

    #[test]
    fn ratio_matches_fixed_point_formula() {
        let mut image = RasterImage::new(1, 2, 1);
        image.set(0, 0, 0, 50);
        image.set(0, 1, 0, 20);
        let f = Filter {
            kind: FilterKind::Ratio,
            a: Offset { dr: 0, dc: 0, ch: 0 },
            b: Offset { dr: 0, dc: 1, ch: 0 },
        };
        // (50*100 - 20*100) / (50+1) = 3000/51 = 58
        assert_eq!(f.evaluate(&image, 0, 0), Ok(58));
    }

    #[test]
    fn rect_uses_integral_image_corners() {
        let mut image = RasterImage::new(3, 3, 1);
        for r in 0..3 {
            for c in 0..3 {
                image.set(r, c, 0, ((r * 3 + c) * 10) as u8);
            }
        }
        let f = Filter {
            kind: FilterKind::Rect,
            a: Offset { dr: 0, dc: 0, ch: 0 },
            b: Offset { dr: 2, dc: 2, ch: 0 },
        };
        let result = f.evaluate(&image, 0, 0).unwrap();
        let expected = image.get(0, 0, 0) as i64 + image.get(2, 2, 0) as i64
            - image.get(0, 2, 0) as i64
            - image.get(2, 0, 0) as i64;
        assert_eq!(result, expected);
    }

    #[test]
    fn rectangles_family_forbids_cross_channel() {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        let f = Filter::randomize(&mut rng, FilterFamily::Rectangles, 3, 21, false);
        assert_eq!(f.kind, FilterKind::Rect);
        assert_eq!(f.a.ch, f.b.ch);
        assert!(f.a.dr <= f.b.dr);
        assert!(f.a.dc <= f.b.dc);
    }

    #[test]
    fn ratios_family_always_ratio_kind() {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(2);
        for _ in 0..50 {
            let f = Filter::randomize(&mut rng, FilterFamily::Ratios, 2, 11, true);
            assert_eq!(f.kind, FilterKind::Ratio);
        }
    }

    #[test]
    fn points_family_offsets_within_window() {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(3);
        let winsize = 9;
        let halfwidth = winsize / 2;
        for _ in 0..200 {
            let f = Filter::randomize(&mut rng, FilterFamily::Points, 1, winsize, false);
            assert!(f.a.dr >= -halfwidth && f.a.dr < winsize - halfwidth);
            assert!(f.a.dc >= -halfwidth && f.a.dc < winsize - halfwidth);
            assert_eq!(f.a.ch, f.b.ch);
        }
    }
}
