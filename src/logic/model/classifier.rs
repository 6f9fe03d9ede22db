//! Classification pipeline
//!
//! Wraps a learner behind the fixed preprocessing contract: dense label
//! indexing, per-feature min-max scaling learned at fit time, and mean
//! imputation for non-finite inputs at predict time. The fitted
//! `labels` vector is the single authority for associating score
//! positions with subjects.

use serde::{Deserialize, Serialize};

use crate::logic::features::FeatureVector;
use crate::logic::ProfilerError;

use super::boosted::{BoostedModel, BoostedTreesConfig};
use super::maxent::{MaxEntConfig, MaxEntModel};

/// Guard against zero-width feature ranges.
const RANGE_FLOOR: f32 = 1e-8;

/// Which learner to fit, with its hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LearnerConfig {
    BoostedTrees(BoostedTreesConfig),
    MaxEnt(MaxEntConfig),
}

impl LearnerConfig {
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            LearnerConfig::BoostedTrees(c) if c.num_leaves > 31 => "boosted-trees-wide",
            LearnerConfig::BoostedTrees(_) => "boosted-trees-deep",
            LearnerConfig::MaxEnt(_) => "max-entropy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LearnerModel {
    BoostedTrees(BoostedModel),
    MaxEnt(MaxEntModel),
}

/// A fitted classifier with its preprocessing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedClassifier {
    /// Subject behind each score index. The only valid interpretation
    /// of score vectors produced by this classifier.
    pub labels: Vec<String>,
    pub scaler_mins: Vec<f32>,
    pub scaler_ranges: Vec<f32>,
    /// Post-scaling feature means, used to impute non-finite inputs.
    pub imputation_means: Vec<f32>,
    pub model: LearnerModel,
}

impl FittedClassifier {
    /// Fit the full pipeline on labeled vectors.
    pub fn fit(samples: &[FeatureVector], config: &LearnerConfig) -> Result<Self, ProfilerError> {
        if samples.is_empty() {
            return Err(ProfilerError::Computation(
                "classifier fit on empty sample set".to_string(),
            ));
        }
        let n_features = samples[0].values.len();

        // Dense label ids in first-seen order
        let mut labels: Vec<String> = Vec::new();
        let mut class_ids = Vec::with_capacity(samples.len());
        for sample in samples {
            let id = match labels.iter().position(|l| l == &sample.label) {
                Some(id) => id,
                None => {
                    labels.push(sample.label.clone());
                    labels.len() - 1
                }
            };
            class_ids.push(id);
        }

        // Per-feature min-max over finite values
        let mut mins = vec![f32::INFINITY; n_features];
        let mut maxs = vec![f32::NEG_INFINITY; n_features];
        for sample in samples {
            for (j, &v) in sample.values.iter().enumerate() {
                if v.is_finite() {
                    mins[j] = mins[j].min(v);
                    maxs[j] = maxs[j].max(v);
                }
            }
        }
        for j in 0..n_features {
            if !mins[j].is_finite() {
                mins[j] = 0.0;
                maxs[j] = 0.0;
            }
        }
        let ranges: Vec<f32> = mins
            .iter()
            .zip(maxs.iter())
            .map(|(min, max)| (max - min).max(RANGE_FLOOR))
            .collect();

        let scale = |values: &[f32]| -> Vec<f32> {
            values
                .iter()
                .enumerate()
                .map(|(j, &v)| {
                    if v.is_finite() {
                        ((v - mins[j]) / ranges[j]).clamp(0.0, 1.0)
                    } else {
                        f32::NAN // imputed below
                    }
                })
                .collect()
        };

        let mut xs: Vec<Vec<f32>> = samples.iter().map(|s| scale(&s.values)).collect();

        // Scaled means for imputation
        let mut means = vec![0.0f32; n_features];
        for j in 0..n_features {
            let finite: Vec<f32> = xs.iter().map(|x| x[j]).filter(|v| v.is_finite()).collect();
            if !finite.is_empty() {
                means[j] = finite.iter().sum::<f32>() / finite.len() as f32;
            }
        }
        for x in &mut xs {
            for (j, v) in x.iter_mut().enumerate() {
                if !v.is_finite() {
                    *v = means[j];
                }
            }
        }

        let model = match config {
            LearnerConfig::BoostedTrees(c) => {
                LearnerModel::BoostedTrees(BoostedModel::fit(&xs, &class_ids, labels.len(), c))
            }
            LearnerConfig::MaxEnt(c) => {
                LearnerModel::MaxEnt(MaxEntModel::fit(&xs, &class_ids, labels.len(), c))
            }
        };

        Ok(Self {
            labels,
            scaler_mins: mins,
            scaler_ranges: ranges,
            imputation_means: means,
            model,
        })
    }

    /// Scale, impute and score one vector. Scores align with `labels`.
    pub fn predict_raw(&self, vector: &FeatureVector) -> Vec<f32> {
        let scaled: Vec<f32> = vector
            .values
            .iter()
            .enumerate()
            .map(|(j, &v)| {
                let min = self.scaler_mins.get(j).copied().unwrap_or(0.0);
                let range = self.scaler_ranges.get(j).copied().unwrap_or(1.0);
                if v.is_finite() {
                    ((v - min) / range).clamp(0.0, 1.0)
                } else {
                    self.imputation_means.get(j).copied().unwrap_or(0.0)
                }
            })
            .collect();

        match &self.model {
            LearnerModel::BoostedTrees(model) => model.raw_scores(&scaled),
            LearnerModel::MaxEnt(model) => model.raw_scores(&scaled),
        }
    }
}
