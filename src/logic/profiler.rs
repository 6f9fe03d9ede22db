//! Profiler service façade
//!
//! Owns the live model store, the session evidence cache and the
//! tunables; exposes the three logical operations (identify, train,
//! engine status). Persistence of raw sessions stays in the handlers -
//! identify itself never touches the database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use super::calibrate;
use super::events::{normalize_events, KeystrokeEvent};
use super::features::{self, extract_features, UNKNOWN_LABEL};
use super::model::{artifact, ModelStore};
use super::session::{self, EliminationPolicy, SessionCache};
use super::training::{self, LabeledSession, TrainingConfig, TrainingMetrics};
use super::ProfilerError;

/// Identify requests below this many events are rejected outright.
pub const MIN_EVENTS_IDENTIFY: usize = 5;

/// Tunables of the identification pipeline; built from `crate::config`.
#[derive(Debug, Clone)]
pub struct ProfilerSettings {
    pub calibration_temperature: f32,
    pub session_ttl: Duration,
    /// Authentication threshold once more than `early_sample_limit`
    /// samples have been observed.
    pub auth_threshold: f32,
    /// Stricter threshold for the first few samples.
    pub early_auth_threshold: f32,
    pub early_sample_limit: u32,
    pub elimination: EliminationPolicy,
    pub training: TrainingConfig,
    pub model_path: PathBuf,
    pub metrics_path: PathBuf,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            calibration_temperature: 1.0,
            session_ttl: Duration::from_secs(600),
            auth_threshold: 0.75,
            early_auth_threshold: 0.90,
            early_sample_limit: 3,
            elimination: EliminationPolicy::default(),
            training: TrainingConfig::default(),
            model_path: PathBuf::from("data/model.json"),
            metrics_path: PathBuf::from("data/training_metrics.json"),
        }
    }
}

/// Wire-visible request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdentifyStatus {
    Authenticated,
    Continue,
    Error,
}

/// Result of one identify call.
#[derive(Debug, Clone)]
pub struct IdentifyOutcome {
    pub user: String,
    /// Percent in [0, 100].
    pub confidence: f32,
    pub message: String,
    pub status: IdentifyStatus,
    pub session_id: String,
    pub sample_count: u32,
}

/// Engine status for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub model_loaded: bool,
    pub algorithm: Option<String>,
    pub known_subjects: usize,
    pub feature_layout: features::layout::LayoutInfo,
    pub active_sessions: usize,
    pub last_training: Option<TrainingMetrics>,
}

pub struct ProfilerService {
    settings: ProfilerSettings,
    store: ModelStore,
    sessions: SessionCache,
    last_metrics: RwLock<Option<TrainingMetrics>>,
}

impl ProfilerService {
    pub fn new(settings: ProfilerSettings) -> Self {
        let sessions = SessionCache::new(settings.session_ttl);
        Self {
            settings,
            store: ModelStore::new(),
            sessions,
            last_metrics: RwLock::new(None),
        }
    }

    /// Load a previously persisted artifact and metrics at startup.
    /// Absence is normal for a fresh deployment; a schema-mismatched
    /// artifact is rejected and the service starts without a model.
    pub fn warm_load(&self) {
        match artifact::load_artifact(&self.settings.model_path) {
            Ok(loaded) => {
                tracing::info!(
                    algorithm = %loaded.algorithm,
                    subjects = loaded.labels().len(),
                    "model artifact loaded from disk"
                );
                self.store.publish(loaded);
            }
            Err(e) => {
                tracing::info!("no usable model artifact on disk: {}", e);
            }
        }
        if let Some(metrics) = training::load_metrics(&self.settings.metrics_path) {
            *self.last_metrics.write() = Some(metrics);
        }
    }

    /// Run the identification pipeline for one evidence submission.
    pub fn identify(
        &self,
        events: &[KeystrokeEvent],
        session_id: Option<&str>,
    ) -> Result<IdentifyOutcome, ProfilerError> {
        if events.len() < MIN_EVENTS_IDENTIFY {
            return Err(ProfilerError::InsufficientInput(events.len()));
        }

        let session_id = match session_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        // Snapshot under a brief lock; predict outside it. A train
        // finishing mid-request cannot invalidate this snapshot.
        let Some(snapshot) = self.store.snapshot() else {
            return Ok(IdentifyOutcome {
                user: UNKNOWN_LABEL.to_string(),
                confidence: 0.0,
                message: "No trained model available".to_string(),
                status: IdentifyStatus::Error,
                session_id,
                sample_count: 0,
            });
        };

        let normalized = normalize_events(events);
        let vector = extract_features(&normalized, None);

        let raw_scores = snapshot.classifier.predict_raw(&vector);
        let prediction = calibrate::calibrate(
            snapshot.labels(),
            &raw_scores,
            self.settings.calibration_temperature,
        );

        tracing::debug!(
            session_id = %session_id,
            predicted = %prediction.predicted_label,
            entropy = prediction.entropy,
            margin = prediction.top_two_margin,
            per_sample_confidence = prediction.adjusted_confidence,
            "per-sample prediction calibrated"
        );

        // Serialize the evidence step per session id
        let state = self.sessions.checkout(&session_id);
        let verdict = {
            let mut state = state.lock();
            session::observe(
                &mut state,
                &prediction.labels,
                &prediction.probabilities,
                &self.settings.elimination,
            )
        };

        let status = self.status_for(verdict.confidence, verdict.sample_count);
        let message = match status {
            IdentifyStatus::Authenticated => format!("Identified as {}", verdict.label),
            IdentifyStatus::Continue => format!(
                "Collecting evidence ({} samples)",
                verdict.sample_count
            ),
            IdentifyStatus::Error => "Identification error".to_string(),
        };

        Ok(IdentifyOutcome {
            user: verdict.label,
            confidence: verdict.confidence * 100.0,
            message,
            status,
            session_id,
            sample_count: verdict.sample_count,
        })
    }

    /// The authentication rule: stricter until enough samples arrived.
    fn status_for(&self, confidence: f32, sample_count: u32) -> IdentifyStatus {
        let threshold = if sample_count > self.settings.early_sample_limit {
            self.settings.auth_threshold
        } else {
            self.settings.early_auth_threshold
        };
        if confidence > threshold {
            IdentifyStatus::Authenticated
        } else {
            IdentifyStatus::Continue
        }
    }

    /// Train from pre-loaded sessions, persist the artifact and metrics,
    /// and publish. The live artifact is only replaced after the new one
    /// is safely on disk.
    pub fn train_and_publish(
        &self,
        sessions: &[LabeledSession],
    ) -> Result<TrainingMetrics, ProfilerError> {
        let outcome = training::train(sessions, &self.settings.training)?;

        artifact::save_artifact(&outcome.artifact, &self.settings.model_path)?;
        if let Err(e) = training::save_metrics(&outcome.metrics, &self.settings.metrics_path) {
            // Metrics are advisory; the model itself is intact
            tracing::warn!("failed to persist training metrics: {}", e);
        }

        self.store.publish(outcome.artifact);
        *self.last_metrics.write() = Some(outcome.metrics.clone());

        tracing::info!(
            algorithm = %outcome.metrics.algorithm,
            samples = outcome.metrics.total_samples,
            subjects = outcome.metrics.unique_labels,
            "model artifact published"
        );

        Ok(outcome.metrics)
    }

    /// Install an already-built artifact as the live model without
    /// touching disk. Warm load and training go through richer paths;
    /// this is the raw swap.
    pub fn publish_artifact(&self, artifact: crate::logic::model::ModelArtifact) {
        self.store.publish(artifact);
    }

    pub fn engine_status(&self) -> EngineStatus {
        let snapshot = self.store.snapshot();
        EngineStatus {
            model_loaded: snapshot.is_some(),
            algorithm: snapshot.as_ref().map(|a| a.algorithm.clone()),
            known_subjects: snapshot.as_ref().map_or(0, |a| a.labels().len()),
            feature_layout: features::layout::LayoutInfo::current(),
            active_sessions: self.sessions.len(),
            last_training: self.last_metrics.read().clone(),
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.store.is_loaded()
    }
}

/// Shared handle used by handlers and background training tasks.
pub type SharedProfiler = Arc<ProfilerService>;
