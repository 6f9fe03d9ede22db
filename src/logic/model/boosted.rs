//! Gradient-boosted regression trees, multiclass
//!
//! Softmax boosting: one regression tree per class per round, fit to
//! the probability residuals, with Newton-style leaf values. Trees grow
//! best-first under a leaf budget. Training is fully deterministic -
//! greedy splits with index-order tie breaking, no sampling.

use serde::{Deserialize, Serialize};

/// Boosted-tree hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTreesConfig {
    pub num_leaves: usize,
    pub iterations: usize,
    pub learning_rate: f32,
}

impl BoostedTreesConfig {
    /// Deeper, slower-learning configuration.
    pub fn deep() -> Self {
        Self {
            num_leaves: 31,
            iterations: 300,
            learning_rate: 0.05,
        }
    }

    /// Wider, faster-learning configuration.
    pub fn wide() -> Self {
        Self {
            num_leaves: 63,
            iterations: 200,
            learning_rate: 0.1,
        }
    }
}

/// Residuals this small end boosting early.
const CONVERGENCE_TOLERANCE: f32 = 0.005;

const HESSIAN_FLOOR: f32 = 1e-10;

// ============================================================================
// REGRESSION TREE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f32,
    pub left: usize,
    pub right: usize,
    pub value: f32,
    pub is_leaf: bool,
}

impl TreeNode {
    fn leaf(value: f32) -> Self {
        Self {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value,
            is_leaf: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict(&self, features: &[f32]) -> f32 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf {
                return node.value;
            }
            idx = if features.get(node.feature).copied().unwrap_or(0.0) < node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }
}

#[derive(Debug, Clone)]
struct Split {
    gain: f32,
    feature: usize,
    threshold: f32,
}

/// Sum of squared errors around the mean, from aggregates.
fn sse(sum: f32, sum_sq: f32, n: usize) -> f32 {
    if n == 0 {
        return 0.0;
    }
    (sum_sq - sum * sum / n as f32).max(0.0)
}

fn best_split(xs: &[Vec<f32>], grad: &[f32], indices: &[usize]) -> Option<Split> {
    let n = indices.len();
    if n < 2 {
        return None;
    }
    let n_features = xs[indices[0]].len();

    let total_sum: f32 = indices.iter().map(|&i| grad[i]).sum();
    let total_sum_sq: f32 = indices.iter().map(|&i| grad[i] * grad[i]).sum();
    let parent_sse = sse(total_sum, total_sum_sq, n);

    let mut best: Option<Split> = None;

    for feature in 0..n_features {
        let mut pairs: Vec<(f32, f32)> = indices
            .iter()
            .map(|&i| (xs[i][feature], grad[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut left_sum = 0.0f32;
        let mut left_sum_sq = 0.0f32;
        for i in 1..n {
            left_sum += pairs[i - 1].1;
            left_sum_sq += pairs[i - 1].1 * pairs[i - 1].1;

            // Only split between distinct feature values
            if pairs[i].0 <= pairs[i - 1].0 {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sum_sq = total_sum_sq - left_sum_sq;
            let gain = parent_sse - sse(left_sum, left_sum_sq, i) - sse(right_sum, right_sum_sq, n - i);

            if gain > best.as_ref().map_or(1e-7, |b| b.gain) {
                best = Some(Split {
                    gain,
                    feature,
                    threshold: (pairs[i - 1].0 + pairs[i].0) / 2.0,
                });
            }
        }
    }

    best
}

/// Newton leaf value: scaled gradient sum over hessian sum.
fn leaf_value(grad: &[f32], hess: &[f32], indices: &[usize], scale: f32) -> f32 {
    let g: f32 = indices.iter().map(|&i| grad[i]).sum();
    let h: f32 = indices.iter().map(|&i| hess[i]).sum();
    scale * g / (h + HESSIAN_FLOOR)
}

/// Grow one regression tree best-first under a leaf budget.
fn fit_tree(
    xs: &[Vec<f32>],
    grad: &[f32],
    hess: &[f32],
    max_leaves: usize,
    scale: f32,
) -> RegressionTree {
    let all: Vec<usize> = (0..xs.len()).collect();
    let mut nodes = vec![TreeNode::leaf(leaf_value(grad, hess, &all, scale))];

    // Expandable leaves with their sample sets and precomputed best split
    let mut frontier: Vec<(usize, Vec<usize>, Option<Split>)> = vec![(
        0,
        all.clone(),
        best_split(xs, grad, &all),
    )];
    let mut leaves = 1;

    while leaves < max_leaves {
        // Pick the expandable leaf with the largest gain
        let pick = frontier
            .iter()
            .enumerate()
            .filter(|(_, (_, _, split))| split.is_some())
            .max_by(|a, b| {
                let ga = a.1 .2.as_ref().map_or(0.0, |s| s.gain);
                let gb = b.1 .2.as_ref().map_or(0.0, |s| s.gain);
                ga.partial_cmp(&gb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i);

        let Some(pick) = pick else { break };
        let (node_idx, indices, split) = frontier.swap_remove(pick);
        let Some(split) = split else { break };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| xs[i][split.feature] < split.threshold);

        let left_idx = nodes.len();
        nodes.push(TreeNode::leaf(leaf_value(grad, hess, &left_indices, scale)));
        let right_idx = nodes.len();
        nodes.push(TreeNode::leaf(leaf_value(grad, hess, &right_indices, scale)));

        let node = &mut nodes[node_idx];
        node.is_leaf = false;
        node.feature = split.feature;
        node.threshold = split.threshold;
        node.left = left_idx;
        node.right = right_idx;

        let left_split = best_split(xs, grad, &left_indices);
        let right_split = best_split(xs, grad, &right_indices);
        frontier.push((left_idx, left_indices, left_split));
        frontier.push((right_idx, right_indices, right_split));

        leaves += 1;
    }

    RegressionTree { nodes }
}

// ============================================================================
// MULTICLASS BOOSTING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedModel {
    pub n_classes: usize,
    pub learning_rate: f32,
    /// rounds[r][k] is the class-k tree of boosting round r.
    pub rounds: Vec<Vec<RegressionTree>>,
}

impl BoostedModel {
    /// Fit on row-major feature matrix `xs` with dense class ids.
    pub fn fit(
        xs: &[Vec<f32>],
        class_ids: &[usize],
        n_classes: usize,
        config: &BoostedTreesConfig,
    ) -> Self {
        let n = xs.len();
        let scale = if n_classes > 1 {
            (n_classes - 1) as f32 / n_classes as f32
        } else {
            0.0
        };

        let mut scores = vec![vec![0.0f32; n_classes]; n];
        let mut rounds = Vec::new();

        for _ in 0..config.iterations {
            let mut max_residual = 0.0f32;
            let mut grads = vec![vec![0.0f32; n]; n_classes];
            let mut hessians = vec![vec![0.0f32; n]; n_classes];

            for i in 0..n {
                let probs = softmax(&scores[i]);
                for k in 0..n_classes {
                    let target = if class_ids[i] == k { 1.0 } else { 0.0 };
                    let residual = target - probs[k];
                    grads[k][i] = residual;
                    hessians[k][i] = probs[k] * (1.0 - probs[k]);
                    max_residual = max_residual.max(residual.abs());
                }
            }

            if max_residual < CONVERGENCE_TOLERANCE {
                break;
            }

            let mut round = Vec::with_capacity(n_classes);
            for k in 0..n_classes {
                let tree = fit_tree(xs, &grads[k], &hessians[k], config.num_leaves, scale);
                for i in 0..n {
                    scores[i][k] += config.learning_rate * tree.predict(&xs[i]);
                }
                round.push(tree);
            }
            rounds.push(round);
        }

        Self {
            n_classes,
            learning_rate: config.learning_rate,
            rounds,
        }
    }

    /// Per-class raw scores (logits).
    pub fn raw_scores(&self, features: &[f32]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.n_classes];
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                scores[k] += self.learning_rate * tree.predict(features);
            }
        }
        scores
    }
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cluster_data() -> (Vec<Vec<f32>>, Vec<usize>) {
        // Class 0 near 0.2, class 1 near 0.8, second feature is noise
        let xs = vec![
            vec![0.18, 0.5],
            vec![0.22, 0.1],
            vec![0.20, 0.9],
            vec![0.25, 0.4],
            vec![0.78, 0.5],
            vec![0.82, 0.2],
            vec![0.80, 0.8],
            vec![0.75, 0.3],
        ];
        let ys = vec![0, 0, 0, 0, 1, 1, 1, 1];
        (xs, ys)
    }

    #[test]
    fn test_separable_clusters_classified() {
        let (xs, ys) = two_cluster_data();
        let model = BoostedModel::fit(&xs, &ys, 2, &BoostedTreesConfig::deep());

        for (x, &y) in xs.iter().zip(ys.iter()) {
            let scores = model.raw_scores(x);
            let predicted = if scores[0] >= scores[1] { 0 } else { 1 };
            assert_eq!(predicted, y, "sample {:?} misclassified", x);
        }
    }

    #[test]
    fn test_unseen_points_follow_clusters() {
        let (xs, ys) = two_cluster_data();
        let model = BoostedModel::fit(&xs, &ys, 2, &BoostedTreesConfig::deep());

        let low = model.raw_scores(&[0.1, 0.5]);
        assert!(low[0] > low[1]);
        let high = model.raw_scores(&[0.9, 0.5]);
        assert!(high[1] > high[0]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (xs, ys) = two_cluster_data();
        let config = BoostedTreesConfig::wide();
        let a = BoostedModel::fit(&xs, &ys, 2, &config);
        let b = BoostedModel::fit(&xs, &ys, 2, &config);

        assert_eq!(a.rounds.len(), b.rounds.len());
        let x = [0.4, 0.6];
        assert_eq!(a.raw_scores(&x), b.raw_scores(&x));
    }

    #[test]
    fn test_three_classes() {
        let xs = vec![
            vec![0.1], vec![0.15], vec![0.2],
            vec![0.45], vec![0.5], vec![0.55],
            vec![0.8], vec![0.85], vec![0.9],
        ];
        let ys = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let model = BoostedModel::fit(&xs, &ys, 3, &BoostedTreesConfig::deep());

        for (x, &y) in xs.iter().zip(ys.iter()) {
            let scores = model.raw_scores(x);
            let predicted = scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .unwrap()
                .0;
            assert_eq!(predicted, y);
        }
    }

    #[test]
    fn test_single_class_degenerates_gracefully() {
        let xs = vec![vec![0.1], vec![0.2], vec![0.3]];
        let ys = vec![0, 0, 0];
        let model = BoostedModel::fit(&xs, &ys, 1, &BoostedTreesConfig::deep());
        assert_eq!(model.raw_scores(&[0.5]), vec![0.0]);
    }

    #[test]
    fn test_tree_respects_leaf_budget() {
        let (xs, ys) = two_cluster_data();
        let config = BoostedTreesConfig {
            num_leaves: 2,
            iterations: 5,
            learning_rate: 0.1,
        };
        let model = BoostedModel::fit(&xs, &ys, 2, &config);
        for round in &model.rounds {
            for tree in round {
                let leaves = tree.nodes.iter().filter(|n| n.is_leaf).count();
                assert!(leaves <= 2);
            }
        }
    }
}
