//! Error-correction features
//!
//! Backspace behavior is a strong personal signal: how often a typist
//! corrects, how many characters they erase at once, and how quickly
//! they resume typing afterwards.

use crate::logic::stats;

use super::timing::{Timeline, VALID_INTERVAL_MS};
use super::vector::FeatureVector;
use super::FeatureExtractor;

const BACKSPACE: &str = "backspace";

pub struct CorrectionFeatures<'a> {
    timeline: &'a Timeline,
}

impl<'a> CorrectionFeatures<'a> {
    pub fn new(timeline: &'a Timeline) -> Self {
        Self { timeline }
    }

    /// Lengths of maximal runs of consecutive backspace keydowns.
    fn backspace_runs(&self) -> Vec<f32> {
        let mut runs = Vec::new();
        let mut current = 0u32;
        for (key, _) in &self.timeline.keydowns {
            if key == BACKSPACE {
                current += 1;
            } else if current > 0 {
                runs.push(current as f32);
                current = 0;
            }
        }
        if current > 0 {
            runs.push(current as f32);
        }
        runs
    }

    /// Interval from each backspace keydown to the next non-backspace
    /// keydown, kept when at most the validity window.
    fn correction_intervals(&self) -> Vec<f32> {
        let keydowns = &self.timeline.keydowns;
        let mut intervals = Vec::new();
        for (i, (key, t_bs)) in keydowns.iter().enumerate() {
            if key != BACKSPACE {
                continue;
            }
            if let Some((_, t_next)) = keydowns[i + 1..].iter().find(|(k, _)| k != BACKSPACE) {
                let gap = (t_next - t_bs) as f32;
                if gap > 0.0 && gap <= VALID_INTERVAL_MS {
                    intervals.push(gap);
                }
            }
        }
        intervals
    }

    /// Backspace counts in the first and second half of the session,
    /// split at the midpoint between first and last timestamps.
    fn half_backspace_counts(&self) -> (u32, u32) {
        let midpoint = self.timeline.first_t + (self.timeline.last_t - self.timeline.first_t) / 2;
        let mut first = 0u32;
        let mut second = 0u32;
        for (key, t) in &self.timeline.keydowns {
            if key == BACKSPACE {
                if *t <= midpoint {
                    first += 1;
                } else {
                    second += 1;
                }
            }
        }
        (first, second)
    }
}

impl FeatureExtractor for CorrectionFeatures<'_> {
    fn extract(&self, vector: &mut FeatureVector) {
        let keydown_count = self.timeline.keydowns.len();
        let backspaces = self
            .timeline
            .keydowns
            .iter()
            .filter(|(key, _)| key == BACKSPACE)
            .count();

        if keydown_count > 0 {
            vector.set(20, backspaces as f32 / keydown_count as f32);
        }
        vector.set(21, stats::mean(&self.backspace_runs()));
        vector.set(22, stats::mean(&self.correction_intervals()));

        let (first, second) = self.half_backspace_counts();
        vector.set(
            123,
            (second as f32 - first as f32) / (first.max(1) as f32),
        );
    }
}
