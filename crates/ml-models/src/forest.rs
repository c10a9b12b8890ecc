use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random-forest configuration (regression only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features sampled per split; defaults to p/3 (regression heuristic).
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 8,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct TreeNode {
    feature_idx: usize,
    threshold: f64,
    value: f64,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>,
}

impl TreeNode {
    fn leaf(value: f64) -> Self {
        Self {
            feature_idx: 0,
            threshold: 0.0,
            value,
            left: None,
            right: None,
        }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match (&node.left, &node.right) {
                (Some(left), Some(right)) => {
                    node = if row[node.feature_idx] <= node.threshold {
                        left
                    } else {
                        right
                    };
                }
                _ => return node.value,
            }
        }
    }
}

/// Bagged ensemble of variance-reducing regression trees. Trees are grown
/// in parallel with rayon; bootstrap sampling and per-split feature
/// subsampling are seeded for reproducibility.
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<TreeNode>,
}

impl RandomForest {
    /// Train on rows `x` (n x p) and targets `y`. Returns None for an
    /// empty or inconsistent dataset.
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: ForestConfig) -> Option<Self> {
        let n = x.len();
        if n == 0 || n != y.len() || x[0].is_empty() {
            return None;
        }
        let p = x[0].len();
        let max_features = config.max_features.unwrap_or((p / 3).max(1)).min(p);

        let trees: Vec<TreeNode> = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                build_tree(x, y, &indices, 0, max_features, &config, &mut rng)
            })
            .collect();

        Some(Self { config, trees })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.config.n_trees
    }
}

fn mean(y: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn sse(y: &[f64], indices: &[usize]) -> f64 {
    let m = mean(y, indices);
    indices.iter().map(|&i| (y[i] - m).powi(2)).sum()
}

fn build_tree(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    depth: usize,
    max_features: usize,
    config: &ForestConfig,
    rng: &mut StdRng,
) -> TreeNode {
    let node_sse = sse(y, indices);
    if depth >= config.max_depth || indices.len() < config.min_samples_split || node_sse < 1e-12 {
        return TreeNode::leaf(mean(y, indices));
    }

    match find_best_split(x, y, indices, max_features, config, rng, node_sse) {
        Some((feature_idx, threshold, left_idx, right_idx)) => {
            let left = build_tree(x, y, &left_idx, depth + 1, max_features, config, rng);
            let right = build_tree(x, y, &right_idx, depth + 1, max_features, config, rng);
            TreeNode {
                feature_idx,
                threshold,
                value: mean(y, indices),
                left: Some(Box::new(left)),
                right: Some(Box::new(right)),
            }
        }
        None => TreeNode::leaf(mean(y, indices)),
    }
}

type Split = (usize, f64, Vec<usize>, Vec<usize>);

fn find_best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    max_features: usize,
    config: &ForestConfig,
    rng: &mut StdRng,
    node_sse: f64,
) -> Option<Split> {
    let p = x[0].len();
    let mut feature_pool: Vec<usize> = (0..p).collect();
    feature_pool.shuffle(rng);
    feature_pool.truncate(max_features);

    let mut best: Option<(f64, Split)> = None;

    for &j in &feature_pool {
        let mut values: Vec<f64> = indices.iter().map(|&i| x[i][j]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();
        if values.len() < 2 {
            continue;
        }
        // Candidate thresholds at midpoints between consecutive values.
        for w in values.windows(2) {
            let threshold = (w[0] + w[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[i][j] <= threshold);
            if left.len() < config.min_samples_leaf || right.len() < config.min_samples_leaf {
                continue;
            }
            let split_sse = sse(y, &left) + sse(y, &right);
            let gain = node_sse - split_sse;
            if gain > 1e-12 && best.as_ref().map_or(true, |(g, _)| gain > *g) {
                best = Some((gain, (j, threshold, left, right)));
            }
        }
    }

    best.map(|(_, split)| split)
}
