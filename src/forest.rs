//! A collection of trees sharing a filter family, class count, and window
//! size; the unit of persistence and inference.

use std::io::{BufRead, Write};

use crate::colormap::Colormap;
use crate::error::{Error, Result};
use crate::filter::FilterFamily;
use crate::raster::RasterImage;
use crate::tree::Tree;
use crate::{ERROR_CLASS, MAX_CLASSES, MIN_PROB};

#[derive(Debug, Clone)]
pub struct Forest {
    pub trees: Vec<Tree>,
    pub family: FilterFamily,
    pub nclasses: usize,
    pub winsize: i32,
}

impl Forest {
    pub fn new(ntrees: usize, family: FilterFamily, nclasses: usize, winsize: i32) -> Forest {
        Forest { trees: (0..ntrees).map(|_| Tree::new()).collect(), family, nclasses, winsize }
    }

    #[inline]
    pub fn ntrees(&self) -> usize {
        self.trees.len()
    }

    /// Classify one pixel by walking every tree to a leaf and summing
    /// `class_probs`. Returns `ERROR_CLASS` if any tree hits `NoData`, or if
    /// no class clears `MIN_PROB` after averaging. `out_probs`, if given, is
    /// filled with the pre-division accumulated probability mass.
    pub fn classify(&self, image: &RasterImage, r: usize, c: usize, mut out_probs: Option<&mut [f32]>) -> u8 {
        let mut probs = [0.0f32; MAX_CLASSES];

        for tree in &self.trees {
            let leaf = match tree.find_leaf(image, r, c) {
                Some(idx) => idx,
                None => return ERROR_CLASS,
            };
            let node = &tree.nodes[leaf];
            for k in 0..self.nclasses {
                probs[k] += node.class_probs[k];
            }
        }

        if let Some(buf) = out_probs.as_deref_mut() {
            for k in 0..self.nclasses {
                buf[k] = probs[k];
            }
        }

        let ntrees = self.ntrees().max(1) as f32;
        let mut best_class = ERROR_CLASS;
        let mut best_prob = MIN_PROB;
        for k in 0..self.nclasses {
            let p = probs[k] / ntrees;
            if p > best_prob {
                best_prob = p;
                best_class = k as u8;
            }
        }
        best_class
    }

    /// Write `forest <ntrees> <family> <nclasses> <winsize>`, one blank-line
    /// separated `tree i` block per tree, and an optional trailing colormap
    /// block, per `spec.md` §6.1.
    pub fn write(&self, out: &mut impl Write, colormap: Option<&Colormap>) -> std::io::Result<()> {
        writeln!(out, "forest {} {} {} {}", self.ntrees(), self.family.to_id(), self.nclasses, self.winsize)?;
        for (i, tree) in self.trees.iter().enumerate() {
            writeln!(out)?;
            writeln!(out, "tree {}", i)?;
            tree.write(out, self.nclasses)?;
        }
        if let Some(map) = colormap {
            writeln!(out)?;
            writeln!(out, "colormap {}", map.colordepth)?;
            for class in 0..map.nclasses {
                let row: Vec<String> =
                    (0..map.colordepth).map(|b| map.colors[class][b].to_string()).collect();
                writeln!(out, "{}", row.join(" "))?;
            }
        }
        Ok(())
    }

    /// Read a forest written by [`Forest::write`]. Returns the forest and,
    /// if a trailing colormap block was present, the parsed [`Colormap`].
    pub fn read(reader: impl BufRead) -> Result<(Forest, Option<Colormap>)> {
        let mut lines = reader.lines();
        let header = next_nonblank(&mut lines)?;
        let mut tokens = header.split_whitespace();
        if tokens.next() != Some("forest") {
            return Err(Error::Format { path: None, context: "missing forest header".to_string() });
        }
        let ntrees: usize = parse_tok(tokens.next())?;
        let family_id: i32 = parse_tok(tokens.next())?;
        let family = FilterFamily::from_id(family_id)
            .ok_or_else(|| Error::Format { path: None, context: "unknown filter family id".to_string() })?;
        let nclasses: usize = parse_tok(tokens.next())?;
        let winsize: i32 = parse_tok(tokens.next())?;

        let mut trees = Vec::with_capacity(ntrees);
        for expected_i in 0..ntrees {
            let tree_header = next_nonblank(&mut lines)?;
            let mut tt = tree_header.split_whitespace();
            if tt.next() != Some("tree") {
                return Err(Error::Format { path: None, context: "missing tree header".to_string() });
            }
            let idx: usize = parse_tok(tt.next())?;
            if idx != expected_i {
                return Err(Error::Format { path: None, context: "out-of-order tree index".to_string() });
            }
            trees.push(Tree::read(&mut lines, nclasses)?);
        }

        let colormap = match lines.next() {
            None => None,
            Some(line) => {
                let line = line?;
                if line.trim().is_empty() {
                    match lines.next() {
                        None => None,
                        Some(cm_header) => Some(read_colormap(cm_header?, nclasses, &mut lines)?),
                    }
                } else {
                    Some(read_colormap(line, nclasses, &mut lines)?)
                }
            }
        };

        Ok((Forest { trees, family, nclasses, winsize }, colormap))
    }
}

fn read_colormap(
    header: String,
    nclasses: usize,
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
) -> Result<Colormap> {
    let mut tokens = header.split_whitespace();
    if tokens.next() != Some("colormap") {
        return Err(Error::Format { path: None, context: "missing colormap header".to_string() });
    }
    let colordepth: usize = parse_tok(tokens.next())?;
    let mut map = Colormap::new(colordepth);
    map.nclasses = nclasses;
    for class in 0..nclasses {
        let row = next_nonblank(lines)?;
        let mut vals = row.split_whitespace();
        for b in 0..colordepth {
            let v: u8 = parse_tok(vals.next())?;
            map.colors[class][b] = v;
        }
    }
    Ok(map)
}

fn next_nonblank(lines: &mut impl Iterator<Item = std::io::Result<String>>) -> Result<String> {
    loop {
        match lines.next() {
            None => return Err(Error::Format { path: None, context: "unexpected end of file".to_string() }),
            Some(line) => {
                let line = line?;
                if !line.trim().is_empty() {
                    return Ok(line);
                }
            }
        }
    }
}

fn parse_tok<T: std::str::FromStr>(tok: Option<&str>) -> Result<T> {
    tok.and_then(|t| t.parse().ok())
        .ok_or_else(|| Error::Format { path: None, context: "bad numeric field".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterKind, Offset};

    fn single_split_forest() -> Forest {
        let mut forest = Forest::new(1, FilterFamily::Points, 3, 5);
        let tree = &mut forest.trees[0];
        tree.nodes[0].filter = Filter {
            kind: FilterKind::Diff,
            a: Offset { dr: 0, dc: 0, ch: 0 },
            b: Offset { dr: 0, dc: 1, ch: 0 },
        };
        tree.nodes[0].threshold = 10;
        let (low, high) = tree.push_children();
        tree.nodes[0].left = Some(low);
        tree.nodes[0].right = Some(high);
        tree.nodes[low as usize].class_counts[1] = 10.0;
        tree.nodes[low as usize].update_probs(3);
        tree.nodes[high as usize].class_counts[2] = 10.0;
        tree.nodes[high as usize].update_probs(3);
        forest
    }

    #[test]
    fn classify_picks_the_leaf_majority_class() {
        let forest = single_split_forest();
        let mut image = RasterImage::new(1, 2, 1);
        image.set(0, 0, 0, 50);
        image.set(0, 1, 0, 0);
        assert_eq!(forest.classify(&image, 0, 0, None), 2);
    }

    #[test]
    fn classify_reports_error_class_on_out_of_bounds() {
        let forest = single_split_forest();
        let image = RasterImage::new(1, 1, 1);
        assert_eq!(forest.classify(&image, 0, 0, None), ERROR_CLASS);
    }

    #[test]
    fn write_then_read_roundtrips_with_colormap() {
        let forest = single_split_forest();
        let map = Colormap::binary();

        let mut buf = Vec::new();
        forest.write(&mut buf, Some(&map)).unwrap();

        let (parsed, parsed_map) = Forest::read(std::io::Cursor::new(buf)).unwrap();
        assert_eq!(parsed.ntrees(), 1);
        assert_eq!(parsed.nclasses, 3);
        assert_eq!(parsed.winsize, 5);
        assert_eq!(parsed.family, FilterFamily::Points);
        let parsed_map = parsed_map.unwrap();
        assert_eq!(parsed_map.colordepth, map.colordepth);
        assert_eq!(parsed_map.colors[1], map.colors[1]);
    }

    #[test]
    fn write_then_read_without_colormap() {
        let forest = single_split_forest();
        let mut buf = Vec::new();
        forest.write(&mut buf, None).unwrap();
        let (parsed, parsed_map) = Forest::read(std::io::Cursor::new(buf)).unwrap();
        assert_eq!(parsed.ntrees(), 1);
        assert!(parsed_map.is_none());
    }
}
