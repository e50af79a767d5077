use core::cmp::Ordering;
use serde::{Deserialize, Serialize};

use kerntune_common::rand::{Rng, StdRng, get_rng_from_seed};

use super::{Shape, TuneError};
use crate::config::tune::SurrogateConfig;

/// Child index of a leaf node.
pub const TREE_LEAF: i64 = -1;
/// Feature and threshold of a leaf node.
pub const TREE_UNDEFINED: i64 = -2;

/// A fitted regression tree stored as parallel node arrays.
///
/// Node `0` is the root. An internal node sends a sample to `children_left` when its
/// `feature` is lower or equal to `threshold`, otherwise to `children_right`. Every node holds
/// the mean performance of its training samples, one value per profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    /// Left child of each node, [TREE_LEAF] for leaves.
    pub children_left: Vec<i64>,
    /// Right child of each node, [TREE_LEAF] for leaves.
    pub children_right: Vec<i64>,
    /// Split threshold of each node.
    pub threshold: Vec<f64>,
    /// Split feature of each node, [TREE_UNDEFINED] for leaves.
    pub feature: Vec<i64>,
    /// Predicted row of each node.
    pub value: Vec<Vec<f64>>,
}

impl RegressionTree {
    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.value.len()
    }

    /// Depth of the deepest leaf, the root being at depth `0`.
    pub fn depth(&self) -> usize {
        fn depth_of(tree: &RegressionTree, node: usize) -> usize {
            match tree.children_left[node] {
                TREE_LEAF => 0,
                left => {
                    let right = tree.children_right[node] as usize;
                    1 + depth_of(tree, left as usize).max(depth_of(tree, right))
                }
            }
        }
        depth_of(self, 0)
    }

    /// Predicted row for the given features.
    pub fn predict(&self, features: &[f64]) -> &[f64] {
        let mut node = 0;
        while self.children_left[node] != TREE_LEAF {
            let value = features
                .get(self.feature[node] as usize)
                .copied()
                .unwrap_or(0.0);
            node = if value <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        &self.value[node]
    }

    fn fit(x: &[Vec<f64>], y: &[Vec<f64>], samples: Vec<usize>, max_depth: usize) -> Self {
        let mut tree = Self {
            children_left: Vec::new(),
            children_right: Vec::new(),
            threshold: Vec::new(),
            feature: Vec::new(),
            value: Vec::new(),
        };
        tree.grow(x, y, samples, 0, max_depth);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[Vec<f64>],
        samples: Vec<usize>,
        depth: usize,
        max_depth: usize,
    ) -> usize {
        let node = self.push_leaf(mean(y, &samples));

        if depth >= max_depth || samples.len() < 2 {
            return node;
        }

        let split = match best_split(x, y, &samples) {
            Some(split) => split,
            None => return node,
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|sample| x[*sample][split.feature] <= split.threshold);

        let left = self.grow(x, y, left, depth + 1, max_depth);
        let right = self.grow(x, y, right, depth + 1, max_depth);

        self.children_left[node] = left as i64;
        self.children_right[node] = right as i64;
        self.feature[node] = split.feature as i64;
        self.threshold[node] = split.threshold;
        node
    }

    fn push_leaf(&mut self, value: Vec<f64>) -> usize {
        self.children_left.push(TREE_LEAF);
        self.children_right.push(TREE_LEAF);
        self.threshold.push(TREE_UNDEFINED as f64);
        self.feature.push(TREE_UNDEFINED);
        self.value.push(value);
        self.value.len() - 1
    }
}

struct Split {
    feature: usize,
    threshold: f64,
}

/// The split minimizing the squared error summed over every output, `None` if the samples can't
/// be separated or no split reduces the error.
fn best_split(x: &[Vec<f64>], y: &[Vec<f64>], samples: &[usize]) -> Option<Split> {
    let outputs = y[samples[0]].len();
    let n = samples.len();

    let mut total_sum = vec![0.0; outputs];
    let mut total_sq = vec![0.0; outputs];
    for sample in samples {
        for (o, value) in y[*sample].iter().enumerate() {
            total_sum[o] += value;
            total_sq[o] += value * value;
        }
    }
    let parent_error = sse(&total_sum, &total_sq, n);

    let mut best: Option<(f64, Split)> = None;
    let mut sorted = samples.to_vec();

    for feature in 0..x[samples[0]].len() {
        sorted.sort_by(|a, b| {
            x[*a][feature]
                .partial_cmp(&x[*b][feature])
                .unwrap_or(Ordering::Equal)
        });

        let mut left_sum = vec![0.0; outputs];
        let mut left_sq = vec![0.0; outputs];

        for i in 0..n - 1 {
            for (o, value) in y[sorted[i]].iter().enumerate() {
                left_sum[o] += value;
                left_sq[o] += value * value;
            }

            let current = x[sorted[i]][feature];
            let next = x[sorted[i + 1]][feature];
            if current >= next {
                continue;
            }

            let right_sum: Vec<f64> = total_sum.iter().zip(&left_sum).map(|(t, l)| t - l).collect();
            let right_sq: Vec<f64> = total_sq.iter().zip(&left_sq).map(|(t, l)| t - l).collect();
            let error = sse(&left_sum, &left_sq, i + 1) + sse(&right_sum, &right_sq, n - i - 1);

            let improves = match &best {
                Some((best_error, _)) => error < *best_error,
                None => error < parent_error,
            };
            if improves {
                best = Some((
                    error,
                    Split {
                        feature,
                        threshold: current + (next - current) / 2.0,
                    },
                ));
            }
        }
    }

    best.map(|(_, split)| split)
}

fn sse(sum: &[f64], sq: &[f64], n: usize) -> f64 {
    let n = n as f64;
    sum.iter()
        .zip(sq)
        .map(|(s, q)| (q - s * s / n).max(0.0))
        .sum()
}

fn mean(y: &[Vec<f64>], samples: &[usize]) -> Vec<f64> {
    let mut mean = vec![0.0; y[samples[0]].len()];
    for sample in samples {
        for (m, value) in mean.iter_mut().zip(&y[*sample]) {
            *m += value;
        }
    }
    let n = samples.len() as f64;
    mean.iter_mut().for_each(|m| *m /= n);
    mean
}

/// A random forest predicting the performance of every known profile for a shape.
///
/// The model is a pure function of the training snapshot and the seed: it doesn't keep any
/// reference to the dataset and training twice on the same input gives the same trees.
#[derive(Clone, Debug, PartialEq)]
pub struct SurrogateModel {
    trees: Vec<RegressionTree>,
    num_profiles: usize,
}

impl SurrogateModel {
    /// Fit a forest on `shapes` and their performance `rows`.
    ///
    /// The number of trees and their depth grow with the number of shapes, up to the ceilings of
    /// the config. Fails with [TuneError::InsufficientData] with fewer than two shapes or
    /// fewer than two profiles.
    pub fn train(
        shapes: &[Shape],
        rows: &[Vec<f64>],
        config: &SurrogateConfig,
        seed: u64,
    ) -> Result<Self, TuneError> {
        let num_profiles = rows.first().map(Vec::len).unwrap_or(0);

        if shapes.len() < 2 || num_profiles < 2 || shapes.len() != rows.len() {
            return Err(TuneError::InsufficientData {
                shapes: shapes.len(),
                profiles: num_profiles,
            });
        }
        if rows.iter().any(|row| row.len() != num_profiles) {
            return Err(TuneError::Invariant(
                "performance rows have different lengths".into(),
            ));
        }

        let x: Vec<Vec<f64>> = shapes.iter().map(Shape::features).collect();
        let n = shapes.len();
        let num_trees = config.max_trees.clamp(1, n + 1);
        let max_depth = config.max_depth.clamp(1, n + 1);
        let mut rng = get_rng_from_seed(seed);

        let trees = (0..num_trees)
            .map(|_| {
                let samples = bootstrap(&mut rng, n);
                RegressionTree::fit(&x, rows, samples, max_depth)
            })
            .collect();

        Ok(Self {
            trees,
            num_profiles,
        })
    }

    /// Predicted performance of every profile known at training time.
    pub fn predict(&self, shape: &Shape) -> Vec<f64> {
        let features = shape.features();
        let mut prediction = vec![0.0; self.num_profiles];

        for tree in self.trees.iter() {
            for (p, value) in prediction.iter_mut().zip(tree.predict(&features)) {
                *p += value;
            }
        }

        let num_trees = self.trees.len() as f64;
        prediction.iter_mut().for_each(|p| *p /= num_trees);
        prediction
    }

    /// The fitted trees.
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Number of profiles the model predicts.
    pub fn num_profiles(&self) -> usize {
        self.num_profiles
    }
}

fn bootstrap(rng: &mut StdRng, n: usize) -> Vec<usize> {
    (0..n).map(|_| rng.random_range(0..n)).collect()
}

/// Indices of the `k` best predicted profiles, best first. Ties keep the lowest index first.
pub fn top_k(prediction: &[f64], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..prediction.len()).collect();
    indices.sort_by(|a, b| {
        prediction[*b]
            .partial_cmp(&prediction[*a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(b))
    });
    indices.truncate(k);
    indices
}
