//! Live artifact store
//!
//! Single-writer pointer swap: training publishes a new artifact, every
//! identify takes a snapshot reference under a brief lock and predicts
//! outside it. An in-flight prediction keeps its snapshot alive even if
//! a train completes underneath it.

use std::sync::Arc;

use parking_lot::RwLock;

use super::artifact::ModelArtifact;

#[derive(Default)]
pub struct ModelStore {
    live: RwLock<Option<Arc<ModelArtifact>>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current artifact, if any.
    pub fn snapshot(&self) -> Option<Arc<ModelArtifact>> {
        self.live.read().clone()
    }

    /// Atomically replace the live artifact.
    pub fn publish(&self, artifact: ModelArtifact) {
        *self.live.write() = Some(Arc::new(artifact));
    }

    pub fn is_loaded(&self) -> bool {
        self.live.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::layout::{IDX_MEAN_DWELL, IDX_MEAN_FLIGHT, IDX_TYPING_SPEED};
    use crate::logic::features::FeatureVector;
    use crate::logic::model::classifier::{FittedClassifier, LearnerConfig};
    use crate::logic::model::maxent::MaxEntConfig;

    fn artifact(algorithm: &str) -> ModelArtifact {
        let mut a = FeatureVector::zeroed("alice");
        a.set(IDX_MEAN_DWELL, 60.0);
        a.set(IDX_MEAN_FLIGHT, 110.0);
        a.set(IDX_TYPING_SPEED, 9.0);
        let mut b = FeatureVector::zeroed("bob");
        b.set(IDX_MEAN_DWELL, 150.0);
        b.set(IDX_MEAN_FLIGHT, 300.0);
        b.set(IDX_TYPING_SPEED, 3.0);
        let classifier = FittedClassifier::fit(
            &[a.clone(), a, b.clone(), b],
            &LearnerConfig::MaxEnt(MaxEntConfig::default()),
        )
        .unwrap();
        ModelArtifact::new(classifier, algorithm)
    }

    #[test]
    fn test_empty_store() {
        let store = ModelStore::new();
        assert!(!store.is_loaded());
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_publish_and_snapshot() {
        let store = ModelStore::new();
        store.publish(artifact("max-entropy"));
        assert!(store.is_loaded());
        assert_eq!(store.snapshot().unwrap().algorithm, "max-entropy");
    }

    #[test]
    fn test_snapshot_survives_republish() {
        let store = ModelStore::new();
        store.publish(artifact("first"));
        let held = store.snapshot().unwrap();

        store.publish(artifact("second"));
        // The held snapshot still points at the old artifact
        assert_eq!(held.algorithm, "first");
        assert_eq!(store.snapshot().unwrap().algorithm, "second");
    }
}
