//! Maximum-entropy (multinomial logistic) classifier
//!
//! Batch gradient descent on the softmax cross-entropy with L2
//! regularization. Weights start at zero, so training is deterministic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxEntConfig {
    pub iterations: usize,
    pub learning_rate: f32,
    pub l2: f32,
}

impl Default for MaxEntConfig {
    fn default() -> Self {
        Self {
            iterations: 500,
            learning_rate: 0.5,
            l2: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxEntModel {
    pub n_classes: usize,
    pub n_features: usize,
    /// Per-class weight rows; the trailing entry of each row is the bias.
    pub weights: Vec<Vec<f32>>,
}

impl MaxEntModel {
    pub fn fit(
        xs: &[Vec<f32>],
        class_ids: &[usize],
        n_classes: usize,
        config: &MaxEntConfig,
    ) -> Self {
        let n = xs.len();
        let n_features = xs.first().map_or(0, |x| x.len());
        let mut weights = vec![vec![0.0f32; n_features + 1]; n_classes];

        for _ in 0..config.iterations {
            let mut grads = vec![vec![0.0f32; n_features + 1]; n_classes];

            for (x, &y) in xs.iter().zip(class_ids.iter()) {
                let logits: Vec<f32> = weights.iter().map(|w| dot(w, x)).collect();
                let probs = softmax(&logits);
                for k in 0..n_classes {
                    let err = probs[k] - if y == k { 1.0 } else { 0.0 };
                    for (g, &xv) in grads[k].iter_mut().zip(x.iter()) {
                        *g += err * xv;
                    }
                    grads[k][n_features] += err; // bias
                }
            }

            let inv_n = 1.0 / n.max(1) as f32;
            for k in 0..n_classes {
                for j in 0..=n_features {
                    let l2 = if j < n_features { config.l2 * weights[k][j] } else { 0.0 };
                    weights[k][j] -= config.learning_rate * (grads[k][j] * inv_n + l2);
                }
            }
        }

        Self {
            n_classes,
            n_features,
            weights,
        }
    }

    /// Per-class raw scores (logits).
    pub fn raw_scores(&self, features: &[f32]) -> Vec<f32> {
        self.weights.iter().map(|w| dot(w, features)).collect()
    }
}

fn dot(weights: &[f32], features: &[f32]) -> f32 {
    let n = weights.len() - 1;
    let mut acc = weights[n]; // bias
    for j in 0..n.min(features.len()) {
        acc += weights[j] * features[j];
    }
    acc
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

    #[test]
    fn test_linearly_separable_data() {
        let xs = vec![
            vec![0.1, 0.9],
            vec![0.2, 0.8],
            vec![0.15, 0.85],
            vec![0.9, 0.1],
            vec![0.8, 0.2],
            vec![0.85, 0.15],
        ];
        let ys = vec![0, 0, 0, 1, 1, 1];
        let model = MaxEntModel::fit(&xs, &ys, 2, &MaxEntConfig::default());

        for (x, &y) in xs.iter().zip(ys.iter()) {
            let scores = model.raw_scores(x);
            let predicted = if scores[0] >= scores[1] { 0 } else { 1 };
            assert_eq!(predicted, y);
        }
    }

    #[test]
    fn test_deterministic_fit() {
        let xs = vec![vec![0.1], vec![0.9], vec![0.2], vec![0.8]];
        let ys = vec![0, 1, 0, 1];
        let config = MaxEntConfig::default();
        let a = MaxEntModel::fit(&xs, &ys, 2, &config);
        let b = MaxEntModel::fit(&xs, &ys, 2, &config);
        assert_eq!(a.weights, b.weights);
    }

    #[test]
    fn test_single_class() {
        let xs = vec![vec![0.3], vec![0.4]];
        let ys = vec![0, 0];
        let model = MaxEntModel::fit(&xs, &ys, 1, &MaxEntConfig::default());
        assert_eq!(model.raw_scores(&[0.5]).len(), 1);
    }

    #[test]
    fn test_scores_favor_training_direction() {
        let xs = vec![vec![0.0], vec![1.0]];
        let ys = vec![0, 1];
        let model = MaxEntModel::fit(&xs, &ys, 2, &MaxEntConfig::default());

        let low = model.raw_scores(&[0.0]);
        let high = model.raw_scores(&[1.0]);
        assert!(low[0] > low[1]);
        assert!(high[1] > high[0]);
    }
}
