//! Drives one training pass: pick the best expandable leaf per tree,
//! dispatch parallel trainers against it, install the winner, and
//! propagate samples to the new children.

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::dataset::Dataset;
use crate::forest::Forest;
use crate::trainer::{self, Candidate};
use crate::tree::Tree;
use crate::MAX_CLASSES;
use crate::MIN_SAMPLES;

/// Splits `seed` deterministically per thread, per tree, and per grow pass
/// so each trainer gets an independent stream without a shared global
/// generator, and distinct trees/passes don't replay the same candidate
/// filters (`spec.md` §5/§9).
fn mix(seed: u64, tree_idx: usize, pass: usize, thread_idx: usize) -> u64 {
    let mut x = seed;
    for salt in [tree_idx as u64, pass as u64, thread_idx as u64] {
        x ^= salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        x ^= x >> 31;
    }
    x
}

/// Seed every tree's root bucket: sample `i` goes to tree
/// `floor(i * ntrees / ndata)`, preserving source order within a tree.
pub fn assign_evenly(dataset: &mut Dataset, forest: &mut Forest) {
    let ndata = dataset.samples.len();
    let ntrees = forest.ntrees();
    if ndata == 0 || ntrees == 0 {
        return;
    }

    let mut heads = vec![None; ntrees];
    let mut tails: Vec<Option<usize>> = vec![None; ntrees];
    for i in 0..ndata {
        let t = ((i * ntrees) / ndata).min(ntrees - 1);
        dataset.next[i] = None;
        match tails[t] {
            Some(prev) => dataset.next[prev] = Some(i),
            None => heads[t] = Some(i),
        }
        tails[t] = Some(i);
    }
    for (t, head) in heads.into_iter().enumerate() {
        forest.trees[t].nodes[0].bucket = head;
    }
}

fn next_expansion(dataset: &Dataset, tree: &Tree) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, node) in tree.nodes.iter().enumerate() {
        if !node.is_leaf() || !node.is_expandable() {
            continue;
        }
        let size = dataset.bucket_len(node.bucket);
        if size < MIN_SAMPLES {
            continue;
        }
        match best {
            Some((_, best_size)) if best_size >= size => {}
            _ => best = Some((i, size)),
        }
    }
    best.map(|(i, _)| i)
}

fn propagate(dataset: &mut Dataset, tree: &mut Tree, node_idx: usize, low_id: u16, high_id: u16) {
    let bucket = tree.nodes[node_idx].bucket.take();
    let filter = tree.nodes[node_idx].filter;
    let threshold = tree.nodes[node_idx].threshold;

    let mut low_head = None;
    let mut low_tail: Option<usize> = None;
    let mut high_head = None;
    let mut high_tail: Option<usize> = None;

    let mut cur = bucket;
    while let Some(idx) = cur {
        let next = dataset.next[idx];
        dataset.next[idx] = None;
        let sample = dataset.samples[idx];
        let image = &dataset.images[sample.image_index];
        if let Ok(value) = filter.evaluate(image, sample.r, sample.c) {
            if value > threshold {
                match high_tail {
                    Some(t) => dataset.next[t] = Some(idx),
                    None => high_head = Some(idx),
                }
                high_tail = Some(idx);
            } else {
                match low_tail {
                    Some(t) => dataset.next[t] = Some(idx),
                    None => low_head = Some(idx),
                }
                low_tail = Some(idx);
            }
        }
        cur = next;
    }

    tree.nodes[low_id as usize].bucket = low_head;
    tree.nodes[high_id as usize].bucket = high_head;
}

/// One training pass: try to expand one node per tree. Trees already at
/// capacity, or with no qualifying expandable leaf, are left untouched.
pub fn grow_pass(
    dataset: &mut Dataset,
    forest: &mut Forest,
    nthreads: usize,
    nfeatures: usize,
    cross_channel: bool,
    seed: u64,
    pass: usize,
) {
    let chans = dataset.images.first().map(|img| img.chans).unwrap_or(1);
    let winsize = forest.winsize;
    let family = forest.family;

    for (tree_idx, tree) in forest.trees.iter_mut().enumerate() {
        if tree.is_full() {
            continue;
        }
        let node_idx = match next_expansion(dataset, tree) {
            Some(i) => i,
            None => continue,
        };
        let subset = dataset.bucket_indices(tree.nodes[node_idx].bucket);

        let results: Vec<Candidate> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..nthreads.max(1))
                .map(|t| {
                    let subset = &subset;
                    let dataset = &*dataset;
                    scope.spawn(move || {
                        let mut rng = SmallRng::seed_from_u64(mix(seed, tree_idx, pass, t));
                        trainer::search(dataset, subset, family, chans, winsize, cross_channel, nfeatures, &mut rng)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("trainer thread panicked")).collect()
        });

        let mut winner: Option<&Candidate> = None;
        for candidate in &results {
            if !candidate.valid {
                continue;
            }
            match winner {
                Some(w) if candidate.score <= w.score => {}
                _ => winner = Some(candidate),
            }
        }

        match winner {
            None => {
                tree.nodes[node_idx].expandable = false;
            }
            Some(winner) => {
                let filter = winner.filter;
                let threshold = winner.threshold;
                tree.nodes[node_idx].filter = filter;
                tree.nodes[node_idx].threshold = threshold;
                let (low_id, high_id) = tree.push_children();
                tree.nodes[node_idx].left = Some(low_id);
                tree.nodes[node_idx].right = Some(high_id);
                propagate(dataset, tree, node_idx, low_id, high_id);
            }
        }
    }
}

/// Re-route every sample through every tree from root to the farthest
/// reachable node, accumulating `class_counts` at *every* node along the
/// path (not only at leaves), then recompute every node's probabilities.
pub fn tally_classes(dataset: &Dataset, forest: &mut Forest) {
    for tree in forest.trees.iter_mut() {
        for node in tree.nodes.iter_mut() {
            node.class_counts = [0.0; MAX_CLASSES];
            node.class_probs = [0.0; MAX_CLASSES];
        }
    }

    for sample in &dataset.samples {
        let label = sample.label as usize;
        if label == 0 || label >= dataset.nclasses || dataset.represented[label] == 0 {
            continue;
        }
        let weight = 1.0 / dataset.represented[label] as f32;
        let image = &dataset.images[sample.image_index];

        for tree in forest.trees.iter_mut() {
            let mut idx = 0usize;
            loop {
                tree.nodes[idx].class_counts[label] += weight;
                if tree.nodes[idx].is_leaf() {
                    break;
                }
                let filter = tree.nodes[idx].filter;
                let threshold = tree.nodes[idx].threshold;
                let left = tree.nodes[idx].left;
                let right = tree.nodes[idx].right;
                match filter.evaluate(image, sample.r, sample.c) {
                    Ok(value) => idx = if value > threshold { right.unwrap() as usize } else { left.unwrap() as usize },
                    Err(_) => break,
                }
            }
        }
    }

    for tree in forest.trees.iter_mut() {
        for node in tree.nodes.iter_mut() {
            node.update_probs(forest.nclasses);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{build_random_dataset, SamplingMode};
    use crate::filter::FilterFamily;
    use crate::raster::RasterImage;

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
    fn assign_evenly_distributes_samples_across_trees_in_order() {
        let (image, labels) = checkerboard(8, 8);
        let mut dataset =
            build_random_dataset(vec![image], vec![labels], None, 40, SamplingMode::Random, 3).unwrap();
        let mut forest = Forest::new(4, FilterFamily::Points, 3, 5);
        assign_evenly(&mut dataset, &mut forest);

        let total: usize =
            forest.trees.iter().map(|t| dataset.bucket_len(t.nodes[0].bucket)).sum();
        assert_eq!(total, dataset.samples.len());
    }

    #[test]
    fn grow_pass_installs_a_split_on_separable_data() {
        let (image, labels) = checkerboard(8, 8);
        let mut dataset =
            build_random_dataset(vec![image], vec![labels], None, 64, SamplingMode::Random, 9).unwrap();
        let mut forest = Forest::new(1, FilterFamily::Points, 3, 5);
        assign_evenly(&mut dataset, &mut forest);
        grow_pass(&mut dataset, &mut forest, 2, 64, false, 17, 0);
        assert!(forest.trees[0].nnodes() >= 3);
    }

    #[test]
    fn tally_classes_fills_leaf_probabilities() {
        let (image, labels) = checkerboard(8, 8);
        let mut dataset =
            build_random_dataset(vec![image], vec![labels], None, 64, SamplingMode::Random, 9).unwrap();
        let mut forest = Forest::new(1, FilterFamily::Points, 3, 5);
        assign_evenly(&mut dataset, &mut forest);
        for pass in 0..4 {
            grow_pass(&mut dataset, &mut forest, 2, 64, false, 17, pass);
        }
        tally_classes(&dataset, &mut forest);

        let tree = &forest.trees[0];
        let total: f32 = tree.nodes[0].class_counts[1..3].iter().sum();
        assert!(total > 0.0);
    }
}
