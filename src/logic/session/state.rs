//! Per-identification-session evidence state

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score history is bounded; older samples beyond this are dropped.
pub const MAX_SCORE_HISTORY: usize = 50;

/// Running belief for one identification session.
///
/// Invariants maintained by the accumulator:
/// - `cumulative[i] == 0` for every eliminated index
/// - `cumulative` sums to 1 over surviving indices
/// - at least one index survives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvidenceState {
    pub session_id: String,
    /// Label order fixed on first evidence; mirrors the artifact order
    /// at that time.
    pub labels: Vec<String>,
    pub cumulative: Vec<f32>,
    pub eliminated: HashSet<usize>,
    pub sample_count: u32,
    pub last_update: DateTime<Utc>,
    /// Normalized per-sample distributions, most recent last.
    pub score_history: Vec<Vec<f32>>,
}

impl SessionEvidenceState {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            labels: Vec::new(),
            cumulative: Vec::new(),
            eliminated: HashSet::new(),
            sample_count: 0,
            last_update: Utc::now(),
            score_history: Vec::new(),
        }
    }

    /// Reset for a (possibly new) label list, forgetting all evidence.
    pub fn reset(&mut self, labels: &[String]) {
        self.labels = labels.to_vec();
        self.cumulative = vec![0.0; labels.len()];
        self.eliminated.clear();
        self.sample_count = 0;
        self.score_history.clear();
        self.last_update = Utc::now();
    }

    pub fn surviving_count(&self) -> usize {
        self.labels.len() - self.eliminated.len()
    }

    pub fn is_survivor(&self, index: usize) -> bool {
        !self.eliminated.contains(&index)
    }

    pub fn push_history(&mut self, sample: Vec<f32>) {
        self.score_history.push(sample);
        if self.score_history.len() > MAX_SCORE_HISTORY {
            self.score_history.remove(0);
        }
    }
}
