//! CART decision tree shared by the ensemble adapters.
//!
//! Splits minimize the summed squared error over all outputs. For 0/1
//! targets this is proportional to the Gini impurity, so the same builder
//! grows classification trees (leaf value = class frequency per output) and
//! regression trees (leaf value = mean residual).
//!
//! Trees are grown from a list of sample indices. Repeated indices (bootstrap
//! samples) act as integer sample weights.

use ndarray::{Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::FeatureMatrix;

/// Values closer than this are treated as equal when placing thresholds.
const FEATURE_EPSILON: f64 = 1e-7;

/// Minimum impurity decrease for a split to be kept.
const IMPURITY_EPSILON: f64 = 1e-12;

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// Maximum depth (`None` grows until leaves are pure)
    pub max_depth: Option<usize>,

    /// Minimum samples a node needs to be split
    pub min_samples_split: usize,

    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,

    /// Features examined per node (`None` examines all)
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted binary decision tree with vector-valued leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
    n_outputs: usize,
}

/// Best split found for a node.
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// Per-output running sums over a set of samples.
#[derive(Clone)]
struct Moments {
    count: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Moments {
    fn new(n_outputs: usize) -> Self {
        Self {
            count: 0,
            sum: vec![0.0; n_outputs],
            sum_sq: vec![0.0; n_outputs],
        }
    }

    fn of(samples: &[usize], targets: &Array2<f64>) -> Self {
        let mut moments = Self::new(targets.ncols());
        for &s in samples {
            moments.add(targets.row(s));
        }
        moments
    }

    fn add(&mut self, target: ArrayView1<'_, f64>) {
        self.count += 1;
        for (j, &y) in target.iter().enumerate() {
            self.sum[j] += y;
            self.sum_sq[j] += y * y;
        }
    }

    /// Summed squared error around the per-output mean.
    fn sse(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        self.sum
            .iter()
            .zip(&self.sum_sq)
            .map(|(s, sq)| (sq - s * s / n).max(0.0))
            .sum()
    }

    /// SSE of the complement `self - other`.
    fn sse_without(&self, other: &Self) -> f64 {
        let count = self.count - other.count;
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        self.sum
            .iter()
            .zip(&self.sum_sq)
            .zip(other.sum.iter().zip(&other.sum_sq))
            .map(|((s, sq), (os, osq))| {
                let s = s - os;
                ((sq - osq) - s * s / n).max(0.0)
            })
            .sum()
    }

    fn mean(&self) -> Vec<f64> {
        if self.count == 0 {
            return vec![0.0; self.sum.len()];
        }
        let n = self.count as f64;
        self.sum.iter().map(|s| s / n).collect()
    }
}

impl DecisionTree {
    /// Grow a tree on the given sample indices.
    ///
    /// Row `i` of `targets` is the output vector of sample `i`. The caller
    /// validates that `rows` and `targets` have the same number of rows.
    pub fn fit<R: Rng + ?Sized>(
        rows: &FeatureMatrix,
        targets: &Array2<f64>,
        samples: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let n_features = rows.ncols();
        let n_outputs = targets.ncols();

        let mut tree = Self {
            nodes: Vec::new(),
            n_features,
            n_outputs,
        };

        tree.nodes.push(Node::Leaf { value: Vec::new() });
        let mut pending: Vec<(usize, Vec<usize>, usize)> = vec![(0, samples.to_vec(), 0)];

        while let Some((node_idx, node_samples, depth)) = pending.pop() {
            let moments = Moments::of(&node_samples, targets);

            let split = if tree.can_split(&node_samples, depth, params, &moments) {
                tree.find_split(rows, targets, &node_samples, params, &moments, rng)
            } else {
                None
            };

            match split {
                Some(split) => {
                    let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = node_samples
                        .iter()
                        .partition(|&&s| rows[[s, split.feature]] <= split.threshold);

                    let left = tree.nodes.len();
                    tree.nodes.push(Node::Leaf { value: Vec::new() });
                    let right = tree.nodes.len();
                    tree.nodes.push(Node::Leaf { value: Vec::new() });

                    tree.nodes[node_idx] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };

                    pending.push((right, right_samples, depth + 1));
                    pending.push((left, left_samples, depth + 1));
                }
                None => {
                    tree.nodes[node_idx] = Node::Leaf {
                        value: moments.mean(),
                    };
                }
            }
        }

        tree
    }

    fn can_split(
        &self,
        samples: &[usize],
        depth: usize,
        params: &TreeParams,
        moments: &Moments,
    ) -> bool {
        samples.len() >= params.min_samples_split.max(2)
            && samples.len() >= 2 * params.min_samples_leaf.max(1)
            && params.max_depth.map_or(true, |max| depth < max)
            && moments.sse() > IMPURITY_EPSILON
            && self.n_features > 0
    }

    fn find_split<R: Rng + ?Sized>(
        &self,
        rows: &FeatureMatrix,
        targets: &Array2<f64>,
        samples: &[usize],
        params: &TreeParams,
        parent: &Moments,
        rng: &mut R,
    ) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        let budget = match params.max_features {
            Some(k) => {
                features.shuffle(rng);
                k.clamp(1, self.n_features)
            }
            None => self.n_features,
        };

        let min_leaf = params.min_samples_leaf.max(1);
        let parent_sse = parent.sse();
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;
        let mut non_constant = 0;
        let mut order = samples.to_vec();

        for feature in features {
            // Keep drawing past the budget until a non-constant feature was seen.
            if visited >= budget && non_constant > 0 {
                break;
            }
            visited += 1;

            order.sort_by(|&a, &b| rows[[a, feature]].total_cmp(&rows[[b, feature]]));
            let lowest = rows[[order[0], feature]];
            let highest = rows[[order[order.len() - 1], feature]];
            if highest - lowest <= FEATURE_EPSILON {
                continue;
            }
            non_constant += 1;

            let mut left = Moments::new(self.n_outputs);
            for i in 0..order.len() - 1 {
                left.add(targets.row(order[i]));

                let current = rows[[order[i], feature]];
                let next = rows[[order[i + 1], feature]];
                if next - current <= FEATURE_EPSILON {
                    continue;
                }

                let n_left = i + 1;
                let n_right = order.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let impurity = left.sse() + parent.sse_without(&left);
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let mut threshold = (current + next) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best.filter(|b| b.impurity < parent_sse - IMPURITY_EPSILON)
    }

    /// Index of the leaf `row` falls into.
    #[must_use]
    pub fn apply(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Leaf value for `row`.
    #[must_use]
    pub fn predict(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        match &self.nodes[self.apply(row)] {
            Node::Leaf { value } => value,
            Node::Split { .. } => &[],
        }
    }

    /// Replace the value stored in a leaf (used for boosting leaf updates).
    pub fn set_leaf_value(&mut self, leaf: usize, value: Vec<f64>) {
        if let Some(Node::Leaf { value: slot }) = self.nodes.get_mut(leaf) {
            *slot = value;
        }
    }

    /// Indices of all leaves.
    #[must_use]
    pub fn leaves(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, Node::Leaf { .. }))
            .map(|(i, _)| i)
            .collect()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// Depth of the deepest leaf (a single leaf has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        max_depth
    }
}
