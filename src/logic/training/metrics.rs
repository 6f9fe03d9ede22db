//! Training evaluation metrics
//!
//! Micro/macro accuracy and log loss over a held-out set, plus the
//! persisted metrics record written beside the model artifact.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::calibrate::softmax_with_temperature;
use crate::logic::features::{FeatureVector, FEATURE_COUNT};
use crate::logic::model::FittedClassifier;
use crate::logic::ProfilerError;

const LOG_LOSS_FLOOR: f32 = 1e-15;

/// The metrics record persisted as `training_metrics.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetrics {
    pub micro_acc: f32,
    pub macro_acc: f32,
    pub log_loss: f32,
    pub log_loss_reduction: f32,
    pub total_samples: usize,
    pub unique_labels: usize,
    pub feature_count: usize,
    pub algorithm: String,
    pub trained_at: DateTime<Utc>,
    pub samples_per_user: HashMap<String, usize>,
}

impl TrainingMetrics {
    pub fn new(
        evaluation: &Evaluation,
        algorithm: &str,
        samples_per_user: HashMap<String, usize>,
    ) -> Self {
        Self {
            micro_acc: evaluation.micro_accuracy,
            macro_acc: evaluation.macro_accuracy,
            log_loss: evaluation.log_loss,
            log_loss_reduction: evaluation.log_loss_reduction,
            total_samples: samples_per_user.values().sum(),
            unique_labels: samples_per_user.len(),
            feature_count: FEATURE_COUNT,
            algorithm: algorithm.to_string(),
            trained_at: Utc::now(),
            samples_per_user,
        }
    }
}

/// Held-out evaluation of one fitted classifier.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub micro_accuracy: f32,
    pub macro_accuracy: f32,
    pub log_loss: f32,
    pub log_loss_reduction: f32,
}

impl Evaluation {
    /// Model-selection score: macro accuracy weighted over micro so
    /// sparse subjects count.
    pub fn selection_score(&self) -> f32 {
        0.6 * self.macro_accuracy + 0.4 * self.micro_accuracy
    }

    /// Mean of per-fold evaluations.
    pub fn mean_of(folds: &[Evaluation]) -> Evaluation {
        if folds.is_empty() {
            return Evaluation::default();
        }
        let n = folds.len() as f32;
        Evaluation {
            micro_accuracy: folds.iter().map(|f| f.micro_accuracy).sum::<f32>() / n,
            macro_accuracy: folds.iter().map(|f| f.macro_accuracy).sum::<f32>() / n,
            log_loss: folds.iter().map(|f| f.log_loss).sum::<f32>() / n,
            log_loss_reduction: folds.iter().map(|f| f.log_loss_reduction).sum::<f32>() / n,
        }
    }
}

/// Evaluate a classifier on labeled holdout vectors.
pub fn evaluate(classifier: &FittedClassifier, holdout: &[FeatureVector]) -> Evaluation {
    if holdout.is_empty() {
        return Evaluation::default();
    }

    let mut correct = 0usize;
    let mut per_label: HashMap<&str, (usize, usize)> = HashMap::new(); // (correct, total)
    let mut loss_sum = 0.0f32;

    for sample in holdout {
        let scores = classifier.predict_raw(sample);
        let probs = softmax_with_temperature(&scores, 1.0);

        let predicted = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let truth_index = classifier.labels.iter().position(|l| l == &sample.label);

        let hit = truth_index == Some(predicted);
        if hit {
            correct += 1;
        }
        let entry = per_label.entry(sample.label.as_str()).or_insert((0, 0));
        entry.1 += 1;
        if hit {
            entry.0 += 1;
        }

        // A label the model has never seen scores the floor probability
        let p_true = truth_index
            .and_then(|i| probs.get(i).copied())
            .unwrap_or(0.0)
            .max(LOG_LOSS_FLOOR);
        loss_sum += -p_true.ln();
    }

    let n = holdout.len() as f32;
    let micro = correct as f32 / n;
    let macro_acc = per_label
        .values()
        .map(|(hits, total)| *hits as f32 / *total as f32)
        .sum::<f32>()
        / per_label.len() as f32;
    let log_loss = loss_sum / n;

    Evaluation {
        micro_accuracy: micro,
        macro_accuracy: macro_acc,
        log_loss,
        log_loss_reduction: log_loss_reduction(log_loss, holdout),
    }
}

/// Reduction of log loss against the label-frequency prior:
/// 1 - loss / prior_loss, 0 when the prior is degenerate.
fn log_loss_reduction(log_loss: f32, holdout: &[FeatureVector]) -> f32 {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for sample in holdout {
        *counts.entry(sample.label.as_str()).or_insert(0) += 1;
    }
    let n = holdout.len() as f32;
    let prior_loss = holdout
        .iter()
        .map(|s| {
            let freq = counts[s.label.as_str()] as f32 / n;
            -freq.max(LOG_LOSS_FLOOR).ln()
        })
        .sum::<f32>()
        / n;

    if prior_loss <= f32::EPSILON {
        return 0.0;
    }
    1.0 - log_loss / prior_loss
}

/// Persist the metrics record beside the artifact.
pub fn save_metrics(metrics: &TrainingMetrics, path: &Path) -> Result<(), ProfilerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ProfilerError::Persistence(format!("create metrics dir: {}", e)))?;
    }
    let json = serde_json::to_vec_pretty(metrics)
        .map_err(|e| ProfilerError::Computation(format!("serialize metrics: {}", e)))?;
    fs::write(path, json)
        .map_err(|e| ProfilerError::Persistence(format!("write metrics: {}", e)))?;
    Ok(())
}

/// Load a previously persisted metrics record, if present.
pub fn load_metrics(path: &Path) -> Option<TrainingMetrics> {
    let data = fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::layout::{IDX_MEAN_DWELL, IDX_MEAN_FLIGHT, IDX_TYPING_SPEED};
    use crate::logic::model::{LearnerConfig, MaxEntConfig};

    fn sample(label: &str, dwell: f32, flight: f32) -> FeatureVector {
        let mut v = FeatureVector::zeroed(label);
        v.set(IDX_MEAN_DWELL, dwell);
        v.set(IDX_MEAN_FLIGHT, flight);
        v.set(IDX_TYPING_SPEED, 1000.0 / flight);
        v
    }

    fn classifier() -> FittedClassifier {
        FittedClassifier::fit(
            &[
                sample("alice", 60.0, 110.0),
                sample("alice", 64.0, 112.0),
                sample("bob", 150.0, 300.0),
                sample("bob", 155.0, 295.0),
            ],
            &LearnerConfig::MaxEnt(MaxEntConfig::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_perfect_holdout() {
        let evaluation = evaluate(
            &classifier(),
            &[sample("alice", 62.0, 111.0), sample("bob", 152.0, 298.0)],
        );
        assert_eq!(evaluation.micro_accuracy, 1.0);
        assert_eq!(evaluation.macro_accuracy, 1.0);
        assert!(evaluation.log_loss >= 0.0);
        assert!(evaluation.log_loss_reduction > 0.0);
    }

    #[test]
    fn test_macro_weights_labels_equally() {
        // Three alice samples right, one bob sample wrong:
        // micro 0.75, macro (1.0 + 0.0) / 2 = 0.5
        let evaluation = evaluate(
            &classifier(),
            &[
                sample("alice", 61.0, 110.0),
                sample("alice", 63.0, 112.0),
                sample("alice", 62.0, 109.0),
                sample("bob", 60.0, 110.0), // typed like alice
            ],
        );
        assert_eq!(evaluation.micro_accuracy, 0.75);
        assert_eq!(evaluation.macro_accuracy, 0.5);
    }

    #[test]
    fn test_unseen_label_counts_as_miss() {
        let evaluation = evaluate(&classifier(), &[sample("carol", 100.0, 200.0)]);
        assert_eq!(evaluation.micro_accuracy, 0.0);
        assert!(evaluation.log_loss > 1.0);
    }

    #[test]
    fn test_empty_holdout() {
        let evaluation = evaluate(&classifier(), &[]);
        assert_eq!(evaluation.micro_accuracy, 0.0);
    }

    #[test]
    fn test_selection_score_weighting() {
        let evaluation = Evaluation {
            micro_accuracy: 1.0,
            macro_accuracy: 0.5,
            ..Default::default()
        };
        assert!((evaluation.selection_score() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_mean_of_folds() {
        let folds = vec![
            Evaluation {
                micro_accuracy: 1.0,
                macro_accuracy: 0.8,
                log_loss: 0.2,
                log_loss_reduction: 0.5,
            },
            Evaluation {
                micro_accuracy: 0.5,
                macro_accuracy: 0.4,
                log_loss: 0.6,
                log_loss_reduction: 0.1,
            },
        ];
        let mean = Evaluation::mean_of(&folds);
        assert!((mean.micro_accuracy - 0.75).abs() < 1e-6);
        assert!((mean.log_loss - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_metrics_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_metrics.json");

        let evaluation = evaluate(&classifier(), &[sample("alice", 62.0, 111.0)]);
        let mut per_user = HashMap::new();
        per_user.insert("alice".to_string(), 3);
        per_user.insert("bob".to_string(), 2);
        let metrics = TrainingMetrics::new(&evaluation, "max-entropy", per_user);

        save_metrics(&metrics, &path).unwrap();
        let loaded = load_metrics(&path).unwrap();
        assert_eq!(loaded.algorithm, "max-entropy");
        assert_eq!(loaded.total_samples, 5);
        assert_eq!(loaded.unique_labels, 2);
        assert_eq!(loaded.feature_count, FEATURE_COUNT);
    }

    #[test]
    fn test_metrics_json_field_names() {
        let metrics = TrainingMetrics::new(&Evaluation::default(), "x", HashMap::new());
        let json = serde_json::to_value(&metrics).unwrap();
        assert!(json.get("microAcc").is_some());
        assert!(json.get("macroAcc").is_some());
        assert!(json.get("logLossReduction").is_some());
        assert!(json.get("samplesPerUser").is_some());
    }
}
