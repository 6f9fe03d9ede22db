//! Model artifact persistence
//!
//! The artifact bundles the fitted classifier with its label order and
//! the feature schema stamp. Saves are write-to-temp-then-rename so a
//! concurrent reader never sees a partial file; loads reject any
//! artifact produced under a different feature schema.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::features::layout::{self, FEATURE_VERSION};
use crate::logic::ProfilerError;

use super::classifier::FittedClassifier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_schema_version: u8,
    pub layout_hash: u32,
    pub algorithm: String,
    pub trained_at: DateTime<Utc>,
    pub classifier: FittedClassifier,
}

impl ModelArtifact {
    pub fn new(classifier: FittedClassifier, algorithm: &str) -> Self {
        Self {
            feature_schema_version: FEATURE_VERSION,
            layout_hash: layout::layout_hash(),
            algorithm: algorithm.to_string(),
            trained_at: Utc::now(),
            classifier,
        }
    }

    /// Canonical score-index to subject order.
    pub fn labels(&self) -> &[String] {
        &self.classifier.labels
    }
}

/// Serialize the artifact next to its destination and rename into
/// place. Rename within one directory is atomic on POSIX filesystems.
pub fn save_artifact(artifact: &ModelArtifact, path: &Path) -> Result<(), ProfilerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ProfilerError::Persistence(format!("create model dir: {}", e)))?;
    }

    let json = serde_json::to_vec(artifact)
        .map_err(|e| ProfilerError::Computation(format!("serialize artifact: {}", e)))?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)
        .map_err(|e| ProfilerError::Persistence(format!("write artifact: {}", e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| ProfilerError::Persistence(format!("publish artifact: {}", e)))?;

    Ok(())
}

/// Load and validate an artifact. Schema mismatch is a hard rejection.
pub fn load_artifact(path: &Path) -> Result<ModelArtifact, ProfilerError> {
    let data = fs::read(path)
        .map_err(|e| ProfilerError::Persistence(format!("read artifact: {}", e)))?;
    let artifact: ModelArtifact = serde_json::from_slice(&data)
        .map_err(|e| ProfilerError::Computation(format!("parse artifact: {}", e)))?;

    layout::validate_layout(artifact.feature_schema_version, artifact.layout_hash)
        .map_err(|e| ProfilerError::Persistence(format!("artifact rejected: {}", e)))?;

    Ok(artifact)
}
