use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScoreError};

const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` tries all of them.
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct PendingNode {
    node: usize,
    start: usize,
    end: usize,
    depth: usize,
}

impl RegressionTree {
    fn fit<const N: usize>(
        x: &[[f64; N]],
        y: &[f64],
        mut idx: Vec<usize>,
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> Self {
        let min_leaf = params.min_samples_leaf.max(1);
        let min_split = params.min_samples_split.max(2).max(2 * min_leaf);
        let tried = params.max_features.map_or(N, |m| m.clamp(1, N));

        let mut features: Vec<usize> = (0..N).collect();
        let mut scratch: Vec<(f64, f64)> = Vec::with_capacity(idx.len());
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stack = vec![PendingNode {
            node: 0,
            start: 0,
            end: idx.len(),
            depth: 0,
        }];

        while let Some(pending) = stack.pop() {
            let slice = &mut idx[pending.start..pending.end];
            let n = slice.len();
            let (sum, sum_sq) = slice.iter().fold((0.0, 0.0), |(s, sq), &i| {
                (s + y[i], sq + y[i] * y[i])
            });
            let mean = if n == 0 { 0.0 } else { sum / n as f64 };
            let sse = sum_sq - sum * mean;
            let depth_left = params.max_depth.is_none_or(|d| pending.depth < d);
            if n < min_split || !depth_left || sse <= 1e-12 * sum_sq.max(1.0) {
                nodes[pending.node] = Node::Leaf { value: mean };
                continue;
            }

            features.shuffle(rng);
            let mut best: Option<(usize, f64, f64)> = None;
            for &feature in features.iter().take(tried) {
                scratch.clear();
                scratch.extend(slice.iter().map(|&i| (x[i][feature], y[i])));
                scratch.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

                let mut left_sum = 0.0;
                let mut left_sq = 0.0;
                for split in 1..n {
                    let (xv, yv) = scratch[split - 1];
                    left_sum += yv;
                    left_sq += yv * yv;
                    let next = scratch[split].0;
                    if split < min_leaf || n - split < min_leaf || next <= xv {
                        continue;
                    }
                    let right_n = (n - split) as f64;
                    let right_sum = sum - left_sum;
                    let right_sq = sum_sq - left_sq;
                    let child_sse = (left_sq - left_sum * left_sum / split as f64)
                        + (right_sq - right_sum * right_sum / right_n);
                    if best.is_none_or(|(_, _, b)| child_sse < b) {
                        let mut threshold = (xv + next) / 2.0;
                        if threshold >= next {
                            threshold = xv;
                        }
                        best = Some((feature, threshold, child_sse));
                    }
                }
            }

            let Some((feature, threshold, _)) = best else {
                nodes[pending.node] = Node::Leaf { value: mean };
                continue;
            };

            let mut mid = 0;
            for i in 0..n {
                if x[slice[i]][feature] <= threshold {
                    slice.swap(i, mid);
                    mid += 1;
                }
            }

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[pending.node] = Node::Split {
                feature,
                threshold,
                left,
                right,
            };
            stack.push(PendingNode {
                node: right,
                start: pending.start + mid,
                end: pending.end,
                depth: pending.depth + 1,
            });
            stack.push(PendingNode {
                node: left,
                start: pending.start,
                end: pending.start + mid,
                depth: pending.depth + 1,
            });
        }

        Self { nodes }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // Children must point forward so a walk from the root always ends in a leaf.
    fn check(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (at, node) in self.nodes.iter().enumerate() {
            let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            else {
                continue;
            };
            if *feature >= n_features {
                return Err(format!(
                    "node {at} splits on feature {feature}, model has {n_features}"
                ));
            }
            for child in [*left, *right] {
                if child <= at || child >= len {
                    return Err(format!(
                        "node {at} has child {child}, expected {}..{len}",
                        at + 1
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Bagged CART regression trees; the prediction is the mean over trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit<const N: usize>(x: &[[f64; N]], y: &[f64], params: ForestParams) -> Result<Self> {
        if x.is_empty() {
            return Err(ScoreError::data_format("cannot fit a forest on zero rows"));
        }
        if x.len() != y.len() {
            return Err(ScoreError::data_format(format!(
                "feature rows ({}) and targets ({}) differ in length",
                x.len(),
                y.len()
            )));
        }

        let n = x.len();
        let trees: Vec<RegressionTree> = (0..params.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let tree_seed = params.seed ^ (t as u64 + 1).wrapping_mul(SEED_MIX);
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let idx: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, y, idx, &params, &mut rng)
            })
            .collect();

        debug!(
            trees = trees.len(),
            rows = n,
            nodes = trees.iter().map(RegressionTree::node_count).sum::<usize>(),
            "forest fitted"
        );
        Ok(Self {
            params,
            n_features: N,
            trees,
        })
    }

    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.n_features {
            return Err(ScoreError::prediction_input(format!(
                "expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let total: f64 = self.trees.iter().map(|tree| tree.predict(row)).sum();
        Ok(total / self.trees.len().max(1) as f64)
    }

    pub fn predict_batch<const N: usize>(&self, rows: &[[f64; N]]) -> Result<Vec<f64>> {
        rows.par_iter().map(|row| self.predict(row)).collect()
    }

    /// Structural check for a forest read back from disk. A forest that
    /// passes never panics or loops in [`RandomForest::predict`].
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.check(self.n_features)
                .map_err(|reason| format!("tree {t}: {reason}"))?;
        }
        Ok(())
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
