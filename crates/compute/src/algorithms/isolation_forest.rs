use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use vigil_core::VigilError;

use crate::stats::percentile;

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Hyperparameters for [`IsolationForest`].
#[derive(Debug, Clone)]
pub struct IsolationParams {
    pub n_trees: usize,
    /// Subsample size per tree (capped at the number of rows).
    pub max_samples: usize,
    /// Expected share of outliers; sets the decision offset.
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum INode {
    /// External node with the number of training rows that reached it.
    Leaf(usize),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<INode>,
}

impl IsolationTree {
    fn fit(x: &[Vec<f64>], sample: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let dim = x[sample[0]].len();
        let mut nodes = vec![INode::Leaf(0)];
        let mut stack = vec![(0usize, sample, 0usize)];
        let mut features: Vec<usize> = (0..dim).collect();

        while let Some((slot, rows, depth)) = stack.pop() {
            if depth >= max_depth || rows.len() <= 1 {
                nodes[slot] = INode::Leaf(rows.len());
                continue;
            }

            // Random feature among those that still vary on this node.
            features.shuffle(rng);
            let mut chosen = None;
            for &f in &features {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(x[i][f]), hi.max(x[i][f]))
                });
                if hi > lo {
                    chosen = Some((f, lo, hi));
                    break;
                }
            }

            let Some((feature, lo, hi)) = chosen else {
                nodes[slot] = INode::Leaf(rows.len());
                continue;
            };

            let threshold = rng.gen_range(lo..hi);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.iter().partition(|&&i| x[i][feature] <= threshold);
            let left = nodes.len();
            nodes.push(INode::Leaf(0));
            let right = nodes.len();
            nodes.push(INode::Leaf(0));
            nodes[slot] = INode::Split {
                feature,
                threshold,
                left,
                right,
            };
            stack.push((left, left_rows, depth + 1));
            stack.push((right, right_rows, depth + 1));
        }

        Self { nodes }
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                INode::Leaf(size) => return depth + average_path_length(*size),
                INode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` items.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Unsupervised outlier scoring by random isolation.
///
/// `decision_function` follows the usual convention: negative values are
/// outliers, and the fitted offset places `contamination` of the training
/// rows below zero.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn fit(x: &[Vec<f64>], params: &IsolationParams) -> Result<Self, VigilError> {
        if x.is_empty() {
            return Err(VigilError::InvalidInput("isolation forest needs at least one row".into()));
        }
        let dim = x[0].len();
        if dim == 0 || x.iter().any(|r| r.len() != dim) {
            return Err(VigilError::InvalidInput("ragged or empty feature rows".into()));
        }
        if x.iter().flatten().any(|v| !v.is_finite()) {
            return Err(VigilError::InvalidInput("non-finite feature value".into()));
        }

        let n = x.len();
        let sample_size = params.max_samples.clamp(1, n);
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees: Vec<IsolationTree> = (0..params.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let sample = index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::fit(x, sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };
        let train_scores: Vec<f64> = x.iter().map(|r| forest.score_sample(r)).collect();
        forest.offset = percentile(&train_scores, 100.0 * params.contamination.clamp(0.0, 0.5));
        Ok(forest)
    }

    /// Raw score in `[-1, 0)`; lower is more abnormal.
    pub fn score_sample(&self, row: &[f64]) -> f64 {
        let mean_path =
            self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size).max(f64::EPSILON);
        -(2f64.powf(-mean_path / norm))
    }

    /// Score shifted by the contamination offset; negative means outlier.
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.score_sample(row) - self.offset
    }

    pub fn is_outlier(&self, row: &[f64]) -> bool {
        self.decision_function(row) < 0.0
    }
}
