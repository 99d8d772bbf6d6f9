//! A single decision tree: an append-only array of [`Node`]s, root at index 0.

use std::io::Write;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::node::Node;
use crate::raster::RasterImage;
use crate::MAX_TREE_NODES;

#[derive(Debug, Clone)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// A tree with a single (leaf) root node.
    pub fn new() -> Tree {
        Tree { nodes: vec![Node::new()] }
    }

    #[inline]
    pub fn nnodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.nnodes() >= MAX_TREE_NODES - 2
    }

    /// Append two fresh leaf children, returning their node ids.
    pub fn push_children(&mut self) -> (u16, u16) {
        let low_id = self.nodes.len() as u16;
        self.nodes.push(Node::new());
        let high_id = self.nodes.len() as u16;
        self.nodes.push(Node::new());
        (low_id, high_id)
    }

    /// Walk root-to-leaf for a query pixel, returning the leaf's node id, or
    /// `None` if a filter along the path returns `NoData`.
    pub fn find_leaf(&self, image: &RasterImage, r: usize, c: usize) -> Option<usize> {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                return Some(idx);
            }
            let result = node.filter.evaluate(image, r, c).ok()?;
            idx = if result > node.threshold {
                node.right.unwrap() as usize
            } else {
                node.left.unwrap() as usize
            };
        }
    }

    pub fn num_leaves(&self) -> usize {
        fn count(nodes: &[Node], idx: usize) -> usize {
            let node = &nodes[idx];
            if node.is_leaf() {
                1
            } else {
                count(nodes, node.left.unwrap() as usize) + count(nodes, node.right.unwrap() as usize)
            }
        }
        count(&self.nodes, 0)
    }

    /// Write `nnodes <n>` followed by one node record per line, per
    /// `spec.md` §6.1.
    pub fn write(&self, out: &mut impl Write, nclasses: usize) -> std::io::Result<()> {
        writeln!(out, "nnodes {}", self.nnodes())?;
        for (i, node) in self.nodes.iter().enumerate() {
            let (high_id, low_id) = if node.is_leaf() { (0, 0) } else { (node.right.unwrap(), node.left.unwrap()) };
            write!(
                out,
                "{} {} {} {} {} {}",
                i, node.map_class, node.threshold, high_id, low_id, node.filter
            )?;
            for k in 0..nclasses {
                write!(out, " {:.8}", node.class_counts[k])?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Read a tree written by [`Tree::write`].
    pub fn read(lines: &mut impl Iterator<Item = std::io::Result<String>>, nclasses: usize) -> Result<Tree> {
        let header = next_line(lines)?;
        let nnodes: usize = header
            .strip_prefix("nnodes ")
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| Error::Format { path: None, context: "bad tree header".to_string() })?;

        let mut nodes = Vec::with_capacity(nnodes);
        for expected_i in 0..nnodes {
            let line = next_line(lines)?;
            let mut tokens = line.split_whitespace();
            let idx: usize = parse_tok(tokens.next())?;
            if idx != expected_i {
                return Err(Error::Format { path: None, context: "out-of-order node index".to_string() });
            }
            let map_class: u8 = parse_tok(tokens.next())?;
            let threshold: i64 = parse_tok(tokens.next())?;
            let high_id: u16 = parse_tok(tokens.next())?;
            let low_id: u16 = parse_tok(tokens.next())?;
            let filter_str = tokens
                .next()
                .ok_or_else(|| Error::Format { path: None, context: "missing filter field".to_string() })?;
            let filter: Filter = filter_str
                .parse()
                .map_err(|_| Error::Format { path: None, context: "bad filter string".to_string() })?;

            let mut node = Node::new();
            node.map_class = map_class;
            node.threshold = threshold;
            node.filter = filter;
            if high_id == 0 {
                node.left = None;
                node.right = None;
            } else {
                node.left = Some(low_id);
                node.right = Some(high_id);
            }
            for k in 0..nclasses {
                let v: f32 = parse_tok(tokens.next())?;
                node.class_counts[k] = v;
            }
            node.update_probs(nclasses);
            nodes.push(node);
        }
        Ok(Tree { nodes })
    }
}

impl Default for Tree {
    fn default() -> Tree {
        Tree::new()
    }
}

fn next_line(lines: &mut impl Iterator<Item = std::io::Result<String>>) -> Result<String> {
    match lines.next() {
        Some(line) => Ok(line?),
        None => Err(Error::Format { path: None, context: "unexpected end of file".to_string() }),
    }
}

fn parse_tok<T: std::str::FromStr>(tok: Option<&str>) -> Result<T> {
    tok.and_then(|t| t.parse().ok())
        .ok_or_else(|| Error::Format { path: None, context: "bad numeric field".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterKind, Offset};

    fn sample_tree(nclasses: usize) -> Tree {
        let mut tree = Tree::new();
        tree.nodes[0].filter = Filter {
            kind: FilterKind::Diff,
            a: Offset { dr: 0, dc: 0, ch: 0 },
            b: Offset { dr: 0, dc: 1, ch: 0 },
        };
        tree.nodes[0].threshold = 10;
        let (low, high) = tree.push_children();
        tree.nodes[0].left = Some(low);
        tree.nodes[0].right = Some(high);
        tree.nodes[low as usize].class_counts[1] = 5.0;
        tree.nodes[low as usize].update_probs(nclasses);
        tree.nodes[high as usize].class_counts[2] = 3.0;
        tree.nodes[high as usize].update_probs(nclasses);
        tree
    }

    #[test]
    fn write_then_read_roundtrips() {
        let tree = sample_tree(3);
        let mut buf = Vec::new();
        tree.write(&mut buf, 3).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines().map(|l| Ok(l.to_string()));
        let parsed = Tree::read(&mut lines, 3).unwrap();

        assert_eq!(parsed.nnodes(), tree.nnodes());
        assert_eq!(parsed.nodes[0].threshold, tree.nodes[0].threshold);
        assert_eq!(parsed.nodes[0].filter, tree.nodes[0].filter);
        assert!(!parsed.nodes[0].is_leaf());
        assert!(parsed.nodes[1].is_leaf());
        assert_eq!(parsed.nodes[1].class_counts[1], 5.0);
    }

    #[test]
    fn find_leaf_walks_to_correct_child() {
        let tree = sample_tree(3);
        let mut image = RasterImage::new(1, 2, 1);
        image.set(0, 0, 0, 50);
        image.set(0, 1, 0, 0);
        // Diff(0,0 - 0,1) = 50 > threshold 10 -> high child (index 2)
        let leaf = tree.find_leaf(&image, 0, 0).unwrap();
        assert_eq!(leaf, 2);
    }

    #[test]
    fn num_leaves_counts_two_for_one_split() {
        let tree = sample_tree(3);
        assert_eq!(tree.num_leaves(), 2);
    }
}
