//! Training: augmentation, evaluation metrics, orchestration

pub mod augment;
pub mod metrics;
pub mod orchestrator;

pub use augment::AugmentationConfig;
pub use metrics::{load_metrics, save_metrics, TrainingMetrics};
pub use orchestrator::{train, LabeledSession, TrainingConfig, TrainingOutcome};
