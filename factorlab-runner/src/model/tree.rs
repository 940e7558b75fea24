//! Histogram regression trees grown on second-order gradient statistics.
//!
//! Features are pre-binned into at most [`MAX_BINS`] quantile thresholds.
//! A split at threshold `t` sends `x <= t` left; undefined values always
//! go left. Leaf weights are `-G / (H + λ)` and split gain is the usual
//! `½ [G_L²/(H_L+λ) + G_R²/(H_R+λ) − G²/(H+λ)] − γ`.

use serde::{Deserialize, Serialize};

pub const MAX_BINS: usize = 64;

const MISSING: u8 = u8::MAX;

// ─── Binning ─────────────────────────────────────────────────────────

/// Training rows reduced to per-feature bin indices.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    /// Sorted distinct split thresholds per feature.
    thresholds: Vec<Vec<f64>>,
    /// Column-major bin index per row; [`MISSING`] for undefined values.
    bins: Vec<Vec<u8>>,
}

impl BinnedMatrix {
    pub fn build(rows: &[Vec<f64>], n_features: usize) -> Self {
        let mut thresholds = Vec::with_capacity(n_features);
        let mut bins = Vec::with_capacity(n_features);
        for f in 0..n_features {
            let mut values: Vec<f64> = rows
                .iter()
                .map(|r| r[f])
                .filter(|v| v.is_finite())
                .collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            let cuts = cut_points(&values);
            bins.push(rows.iter().map(|r| bin_of(&cuts, r[f])).collect());
            thresholds.push(cuts);
        }
        Self { thresholds, bins }
    }

    pub fn n_features(&self) -> usize {
        self.thresholds.len()
    }

    fn goes_left(&self, feature: usize, bin: usize, row: usize) -> bool {
        let b = self.bins[feature][row];
        b == MISSING || b as usize <= bin
    }
}

fn cut_points(sorted_unique: &[f64]) -> Vec<f64> {
    let n = sorted_unique.len();
    if n <= MAX_BINS {
        return sorted_unique.to_vec();
    }
    let mut cuts: Vec<f64> = (1..=MAX_BINS)
        .map(|k| sorted_unique[k * (n - 1) / MAX_BINS])
        .collect();
    cuts.dedup();
    cuts
}

fn bin_of(cuts: &[f64], x: f64) -> u8 {
    if x.is_finite() {
        cuts.partition_point(|c| *c < x) as u8
    } else {
        MISSING
    }
}

// ─── Tree ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut i = 0;
        while let Some(node) = self.nodes.get(i) {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let x = row[*feature];
                    i = if x.is_nan() || x <= *threshold { *left } else { *right };
                }
            }
        }
        0.0
    }

    /// `(feature, gain)` for every split node.
    pub fn split_gains(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            Node::Split { feature, gain, .. } => Some((*feature, *gain)),
            Node::Leaf { .. } => None,
        })
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

// ─── Growing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub reg_lambda: f64,
    pub min_child_weight: f64,
    pub gamma: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

struct Grower<'a> {
    data: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: TreeParams,
    nodes: Vec<Node>,
}

impl Grower<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.reg_lambda;
        if denom > 0.0 {
            g * g / denom
        } else {
            0.0
        }
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.reg_lambda;
        if denom > 0.0 {
            -g / denom
        } else {
            0.0
        }
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });
        if depth >= self.params.max_depth || rows.len() < 2 {
            return id;
        }
        let Some(best) = self.best_split(&rows, g, h) else {
            return id;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.data.goes_left(best.feature, best.bin, i));
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: self.data.thresholds[best.feature][best.bin],
            gain: best.gain,
            left,
            right,
        };
        id
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let parent = self.score(g, h);
        let mut best: Option<Candidate> = None;
        for &f in self.features {
            let n_bins = self.data.thresholds[f].len();
            if n_bins < 2 {
                continue;
            }
            // (G, H, count) per bin plus the missing bucket.
            let mut hist = vec![(0.0_f64, 0.0_f64, 0_usize); n_bins + 1];
            let mut missing = (0.0_f64, 0.0_f64, 0_usize);
            for &i in rows {
                let slot = match self.data.bins[f][i] {
                    MISSING => &mut missing,
                    b => &mut hist[b as usize],
                };
                slot.0 += self.grad[i];
                slot.1 += self.hess[i];
                slot.2 += 1;
            }

            let (mut gl, mut hl, mut cl) = missing;
            for (bin, &(bg, bh, bc)) in hist.iter().enumerate().take(n_bins) {
                gl += bg;
                hl += bh;
                cl += bc;
                let (gr, hr, cr) = (g - gl, h - hl, rows.len() - cl);
                if cl == 0 || cr == 0 {
                    continue;
                }
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain =
                    0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
                if gain > best.map_or(1e-12, |b| b.gain) {
                    best = Some(Candidate {
                        feature: f,
                        bin,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Grow one tree over `rows` using only the column indices in `features`.
pub fn grow_tree(
    data: &BinnedMatrix,
    grad: &[f64],
    hess: &[f64],
    rows: Vec<usize>,
    features: &[usize],
    params: TreeParams,
) -> Tree {
    let mut grower = Grower {
        data,
        grad,
        hess,
        features,
        params,
        nodes: Vec::new(),
    };
    grower.grow(rows, 0);
    Tree {
        nodes: grower.nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(depth: usize) -> TreeParams {
        TreeParams {
            max_depth: depth,
            reg_lambda: 0.0,
            min_child_weight: 0.0,
            gamma: 0.0,
        }
    }

    #[test]
    fn stump_separates_a_step() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        // Negative gradient on the right half pushes its leaf up.
        let grad: Vec<f64> = (0..10).map(|i| if i < 5 { 1.0 } else { -1.0 }).collect();
        let hess = vec![1.0; 10];
        let data = BinnedMatrix::build(&rows, 1);
        let tree = grow_tree(&data, &grad, &hess, (0..10).collect(), &[0], params(1));
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict(&[2.0]), -1.0);
        assert_eq!(tree.predict(&[7.0]), 1.0);
        assert_eq!(tree.predict(&[4.5]), 1.0);
        assert_eq!(tree.predict(&[f64::NAN]), -1.0);
        let (feature, gain) = tree.split_gains().next().unwrap();
        assert_eq!(feature, 0);
        assert!((gain - 5.0).abs() < 1e-12);
    }

    #[test]
    fn constant_feature_never_splits() {
        let rows = vec![vec![1.0]; 6];
        let grad = vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let data = BinnedMatrix::build(&rows, 1);
        let tree = grow_tree(&data, &grad, &[1.0; 6], (0..6).collect(), &[0], params(3));
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn min_child_weight_blocks_small_children() {
        let rows: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let grad = vec![5.0, -1.0, -1.0, -1.0];
        let data = BinnedMatrix::build(&rows, 1);
        let p = TreeParams {
            min_child_weight: 2.0,
            ..params(1)
        };
        let tree = grow_tree(&data, &grad, &[1.0; 4], (0..4).collect(), &[0], p);
        // Only the 2/2 split satisfies the hessian floor.
        assert_eq!(tree.predict(&[0.0]), -2.0);
        assert_eq!(tree.predict(&[3.0]), 1.0);
    }

    #[test]
    fn binning_caps_thresholds() {
        let rows: Vec<Vec<f64>> = (0..1000).map(|i| vec![i as f64, f64::NAN]).collect();
        let data = BinnedMatrix::build(&rows, 2);
        assert_eq!(data.n_features(), 2);
        assert!(data.thresholds[0].len() <= MAX_BINS);
        assert!(data.thresholds[1].is_empty());
        assert_eq!(data.bins[1][0], MISSING);
        assert_eq!(*data.thresholds[0].last().unwrap(), 999.0);
    }
}
