use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use vigil_core::VigilError;

/// Hyperparameters for [`RegressionForest`].
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows each tree until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART regression tree with variance-reduction splits, stored as a flat arena.
#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn fit(x: &[Vec<f64>], y: &[f64], sample: Vec<usize>, params: &ForestParams) -> Self {
        let mut nodes = vec![Node::Leaf(0.0)];
        // (node slot, rows reaching it, depth); explicit stack keeps deep trees off the call stack.
        let mut stack = vec![(0usize, sample, 0usize)];

        while let Some((slot, rows, depth)) = stack.pop() {
            let leaf_value = rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64;
            let depth_ok = params.max_depth.map_or(true, |d| depth < d);

            let split = if depth_ok && rows.len() >= params.min_samples_split {
                best_split(x, y, &rows, params.min_samples_leaf)
            } else {
                None
            };

            match split {
                Some((feature, threshold)) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                        rows.iter().partition(|&&i| x[i][feature] <= threshold);
                    let left = nodes.len();
                    nodes.push(Node::Leaf(0.0));
                    let right = nodes.len();
                    nodes.push(Node::Leaf(0.0));
                    nodes[slot] = Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    };
                    stack.push((left, left_rows, depth + 1));
                    stack.push((right, right_rows, depth + 1));
                }
                None => nodes[slot] = Node::Leaf(leaf_value),
            }
        }

        Self { nodes }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(v) => return *v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Find the `(feature, threshold)` that minimizes the summed squared error of
/// both children. Returns `None` when the node is pure or no split keeps
/// `min_leaf` rows on each side.
fn best_split(x: &[Vec<f64>], y: &[f64], rows: &[usize], min_leaf: usize) -> Option<(usize, f64)> {
    let n = rows.len();
    let min_leaf = min_leaf.max(1);
    if n < 2 * min_leaf {
        return None;
    }

    let total: f64 = rows.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = rows.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = total_sq - total * total / n as f64;
    if parent_sse <= 1e-12 {
        return None;
    }

    let dim = x[rows[0]].len();
    let mut sorted = rows.to_vec();
    // Maximizing sum_l^2/n_l + sum_r^2/n_r is equivalent to minimizing child SSE.
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..dim {
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        for pos in 1..n {
            left_sum += y[sorted[pos - 1]];
            if pos < min_leaf || n - pos < min_leaf {
                continue;
            }
            let lo = x[sorted[pos - 1]][feature];
            let hi = x[sorted[pos]][feature];
            if lo >= hi {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / pos as f64 + right_sum * right_sum / (n - pos) as f64;
            if best.map_or(true, |(_, _, g)| gain > g) {
                let mid = lo + (hi - lo) / 2.0;
                // Midpoint can round up to `hi` for adjacent floats.
                let threshold = if mid < hi { mid } else { lo };
                best = Some((feature, threshold, gain));
            }
        }
    }

    best.map(|(f, t, _)| (f, t))
}

/// Bagged ensemble of regression trees; predictions are the mean over trees.
#[derive(Debug, Clone)]
pub struct RegressionForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RegressionForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<Self, VigilError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(VigilError::InvalidInput(format!(
                "regression forest needs matching non-empty inputs (rows={}, targets={})",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|r| r.len() != n_features) {
            return Err(VigilError::InvalidInput("ragged feature rows".into()));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(VigilError::InvalidInput("non-finite regression target".into()));
        }

        let n = x.len();
        let trees = (0..params.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                // Per-tree seed keeps results independent of thread scheduling.
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, sample, params)
            })
            .collect();

        Ok(Self { trees, n_features })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict_all(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}
