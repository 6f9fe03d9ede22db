//! Training orchestration
//!
//! Turns persisted labeled sessions into a published model artifact:
//! extraction with augmentation, per-label minimum filtering, a
//! data-size-dependent model-selection strategy, and the final refit on
//! all data. Deterministic under the configured seed.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::events::{normalize_events, KeystrokeEvent};
use crate::logic::features::{FeatureVector, UNKNOWN_LABEL};
use crate::logic::model::{
    BoostedTreesConfig, FittedClassifier, LearnerConfig, MaxEntConfig, ModelArtifact,
};
use crate::logic::ProfilerError;

use super::augment::{training_vectors, AugmentationConfig};
use super::metrics::{evaluate, Evaluation, TrainingMetrics};

/// One labeled session pulled from the store.
#[derive(Debug, Clone)]
pub struct LabeledSession {
    pub id: Uuid,
    pub label: String,
    pub events: Vec<KeystrokeEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub augmentation: AugmentationConfig,
    /// Held-out fraction for split-based strategies.
    pub test_fraction: f32,
    pub cv_folds: usize,
    /// Minimum accepted vectors overall.
    pub min_vectors: usize,
    /// Labels with fewer accepted vectors are dropped.
    pub min_vectors_per_label: usize,
    /// Thresholds for strategy selection (counts after augmentation).
    pub ensemble_min_vectors: usize,
    pub cv_min_vectors: usize,
    pub min_distinct_labels: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            augmentation: AugmentationConfig::default(),
            test_fraction: 0.15,
            cv_folds: 5,
            min_vectors: 5,
            min_vectors_per_label: 2,
            ensemble_min_vectors: 30,
            cv_min_vectors: 20,
            min_distinct_labels: 3,
            seed: 42,
        }
    }
}

/// A finished training run, ready to persist and publish.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub metrics: TrainingMetrics,
}

/// Run the full training pipeline over labeled sessions.
pub fn train(
    sessions: &[LabeledSession],
    config: &TrainingConfig,
) -> Result<TrainingOutcome, ProfilerError> {
    // 1. Extraction with augmentation; unlabeled sessions are skipped
    let mut vectors: Vec<FeatureVector> = Vec::new();
    for session in sessions {
        if session.label.is_empty() || session.label == UNKNOWN_LABEL {
            continue;
        }
        let normalized = normalize_events(&session.events);
        let mut extracted = training_vectors(&normalized, &session.label, &config.augmentation);
        if extracted.is_empty() {
            tracing::debug!(session_id = %session.id, "session produced no valid vectors");
        }
        vectors.append(&mut extracted);
    }

    // 2. Per-label minimum, then the overall minimum
    let mut per_label: HashMap<String, usize> = HashMap::new();
    for vector in &vectors {
        *per_label.entry(vector.label.clone()).or_insert(0) += 1;
    }
    vectors.retain(|v| per_label[&v.label] >= config.min_vectors_per_label);
    per_label.retain(|_, count| *count >= config.min_vectors_per_label);

    if vectors.len() < config.min_vectors {
        return Err(ProfilerError::InsufficientData {
            vectors: vectors.len(),
            required: config.min_vectors,
        });
    }

    let distinct_labels = per_label.len();
    tracing::info!(
        vectors = vectors.len(),
        labels = distinct_labels,
        "training set assembled"
    );

    // 3. Strategy by data size
    let (learner, evaluation) = if vectors.len() >= config.ensemble_min_vectors
        && distinct_labels >= config.min_distinct_labels
    {
        ensemble_select(&vectors, config)?
    } else if vectors.len() >= config.cv_min_vectors
        && distinct_labels >= config.min_distinct_labels
    {
        cross_validate(&vectors, config)?
    } else {
        single_split(&vectors, config)?
    };

    // 4. Refit the chosen pipeline on the full data
    let classifier = FittedClassifier::fit(&vectors, &learner)?;
    let algorithm = learner.algorithm_name();
    tracing::info!(
        algorithm,
        micro_acc = evaluation.micro_accuracy,
        macro_acc = evaluation.macro_accuracy,
        log_loss = evaluation.log_loss,
        "classifier trained"
    );

    let metrics = TrainingMetrics::new(&evaluation, algorithm, per_label);
    let artifact = ModelArtifact::new(classifier, algorithm);

    Ok(TrainingOutcome { artifact, metrics })
}

/// The three candidate pipelines of the ensemble-select strategy.
fn candidates() -> Vec<LearnerConfig> {
    vec![
        LearnerConfig::BoostedTrees(BoostedTreesConfig::deep()),
        LearnerConfig::BoostedTrees(BoostedTreesConfig::wide()),
        LearnerConfig::MaxEnt(MaxEntConfig::default()),
    ]
}

/// Shuffle deterministically and split off the held-out tail.
fn shuffled_split(
    vectors: &[FeatureVector],
    config: &TrainingConfig,
) -> (Vec<FeatureVector>, Vec<FeatureVector>) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut shuffled = vectors.to_vec();
    shuffled.shuffle(&mut rng);

    let test_len = ((vectors.len() as f32 * config.test_fraction).floor() as usize)
        .clamp(1, vectors.len() - 1);
    let train = shuffled[..vectors.len() - test_len].to_vec();
    let test = shuffled[vectors.len() - test_len..].to_vec();
    (train, test)
}

/// Fit every candidate on the split and keep the best scorer.
fn ensemble_select(
    vectors: &[FeatureVector],
    config: &TrainingConfig,
) -> Result<(LearnerConfig, Evaluation), ProfilerError> {
    let (train_set, test_set) = shuffled_split(vectors, config);

    let mut best: Option<(LearnerConfig, Evaluation)> = None;
    for candidate in candidates() {
        let fitted = FittedClassifier::fit(&train_set, &candidate)?;
        let evaluation = evaluate(&fitted, &test_set);
        tracing::debug!(
            algorithm = candidate.algorithm_name(),
            score = evaluation.selection_score(),
            "ensemble candidate evaluated"
        );
        let replace = best
            .as_ref()
            .map_or(true, |(_, e)| evaluation.selection_score() > e.selection_score());
        if replace {
            best = Some((candidate, evaluation));
        }
    }

    best.ok_or_else(|| ProfilerError::Computation("no ensemble candidate fitted".to_string()))
}

/// K-fold cross-validation of the deep boosted pipeline; reports mean
/// fold metrics.
fn cross_validate(
    vectors: &[FeatureVector],
    config: &TrainingConfig,
) -> Result<(LearnerConfig, Evaluation), ProfilerError> {
    let learner = LearnerConfig::BoostedTrees(BoostedTreesConfig::deep());
    let folds = config.cv_folds.max(2).min(vectors.len());

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..vectors.len()).collect();
    indices.shuffle(&mut rng);

    let mut evaluations = Vec::with_capacity(folds);
    for fold in 0..folds {
        let holdout: Vec<usize> = indices
            .iter()
            .copied()
            .skip(fold)
            .step_by(folds)
            .collect();
        if holdout.is_empty() || holdout.len() == vectors.len() {
            continue;
        }

        let test_set: Vec<FeatureVector> = holdout.iter().map(|&i| vectors[i].clone()).collect();
        let train_set: Vec<FeatureVector> = indices
            .iter()
            .copied()
            .filter(|i| !holdout.contains(i))
            .map(|i| vectors[i].clone())
            .collect();

        let fitted = FittedClassifier::fit(&train_set, &learner)?;
        evaluations.push(evaluate(&fitted, &test_set));
    }

    Ok((learner, Evaluation::mean_of(&evaluations)))
}

/// Fallback for small data: one 85/15 split of the deep boosted pipeline.
fn single_split(
    vectors: &[FeatureVector],
    config: &TrainingConfig,
) -> Result<(LearnerConfig, Evaluation), ProfilerError> {
    let learner = LearnerConfig::BoostedTrees(BoostedTreesConfig::deep());
    let (train_set, test_set) = shuffled_split(vectors, config);
    let fitted = FittedClassifier::fit(&train_set, &learner)?;
    Ok((learner, evaluate(&fitted, &test_set)))
}
