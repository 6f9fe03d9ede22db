//! Evidence accumulation and progressive elimination
//!
//! Each per-sample distribution is fused into the session's running
//! belief with a sample-count-dependent EMA; once enough samples have
//! arrived, subjects whose cumulative probability falls below the
//! active threshold are eliminated permanently for the session.

use serde::{Deserialize, Serialize};

use super::state::SessionEvidenceState;
use crate::logic::features::UNKNOWN_LABEL;

/// Floor applied to zero/negative incoming probabilities.
const PROBABILITY_EPSILON: f32 = 1e-4;

/// Elimination thresholds and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EliminationPolicy {
    pub base_threshold: f32,
    pub step: f32,
    pub cap: f32,
    pub min_survivors: usize,
}

impl Default for EliminationPolicy {
    fn default() -> Self {
        Self {
            base_threshold: 0.05,
            step: 0.05,
            cap: 0.50,
            min_survivors: 1,
        }
    }
}

impl EliminationPolicy {
    /// Active threshold for a sample count. Monotonically non-decreasing
    /// and capped; zero below the activation count of 3.
    pub fn threshold_for(&self, sample_count: u32) -> f32 {
        if sample_count < 3 {
            0.0
        } else if sample_count <= 9 {
            self.base_threshold
        } else {
            let escalations = (sample_count - 10) / 5 + 1;
            (self.base_threshold + self.step * escalations as f32).min(self.cap)
        }
    }
}

/// Outcome of one evidence step.
#[derive(Debug, Clone)]
pub struct EvidenceVerdict {
    pub label: String,
    pub confidence: f32,
    pub sample_count: u32,
    /// Labels eliminated by this step.
    pub newly_eliminated: Vec<String>,
}

/// Fuse one per-sample probability vector into the session state and
/// produce the running verdict. The caller holds the session lock.
pub fn observe(
    state: &mut SessionEvidenceState,
    labels: &[String],
    probabilities: &[f32],
    policy: &EliminationPolicy,
) -> EvidenceVerdict {
    // Dimension reconciliation: a changed label count means the model
    // was retrained; past evidence no longer lines up, start over.
    let n = labels.len().min(probabilities.len());
    if state.labels.len() != n {
        state.reset(&labels[..n]);
    }

    let sample = normalize_sample(&probabilities[..n]);

    state.push_history(sample.clone());
    state.sample_count += 1;
    state.last_update = chrono::Utc::now();

    // EMA over survivors; eliminated entries stay pinned at zero
    let alpha = 0.3 + 0.4 * (state.sample_count.min(5) as f32 / 5.0);
    if state.sample_count == 1 {
        state.cumulative = sample;
    } else {
        for i in 0..n {
            if state.is_survivor(i) {
                state.cumulative[i] = alpha * sample[i] + (1.0 - alpha) * state.cumulative[i];
            }
        }
    }
    renormalize_survivors(state);

    // Progressive elimination
    let mut newly_eliminated = Vec::new();
    if state.sample_count >= 3 && state.surviving_count() > 1 {
        let threshold = policy.threshold_for(state.sample_count);

        let mut survivors: Vec<usize> = (0..n).filter(|&i| state.is_survivor(i)).collect();
        survivors.sort_by(|&a, &b| {
            state.cumulative[a]
                .partial_cmp(&state.cumulative[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for index in survivors {
            if state.surviving_count() <= policy.min_survivors {
                break;
            }
            if state.cumulative[index] < threshold {
                state.eliminated.insert(index);
                state.cumulative[index] = 0.0;
                tracing::info!(
                    session_id = %state.session_id,
                    label = %state.labels[index],
                    sample_count = state.sample_count,
                    threshold,
                    "subject eliminated from session"
                );
                newly_eliminated.push(state.labels[index].clone());
            }
        }

        if !newly_eliminated.is_empty() {
            renormalize_survivors(state);
        }
    }

    let verdict = final_verdict(state);
    EvidenceVerdict {
        label: verdict.0,
        confidence: verdict.1,
        sample_count: state.sample_count,
        newly_eliminated,
    }
}

/// Floor non-positive entries, then scale to sum 1.
fn normalize_sample(probabilities: &[f32]) -> Vec<f32> {
    let n = probabilities.len();
    let floored: Vec<f32> = probabilities
        .iter()
        .map(|&p| {
            if p.is_finite() && p > 0.0 {
                p
            } else {
                PROBABILITY_EPSILON
            }
        })
        .collect();
    let sum: f32 = floored.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![1.0 / n.max(1) as f32; n];
    }
    floored.iter().map(|p| p / sum).collect()
}

fn renormalize_survivors(state: &mut SessionEvidenceState) {
    let sum: f32 = (0..state.cumulative.len())
        .filter(|&i| state.is_survivor(i))
        .map(|i| state.cumulative[i])
        .sum();
    if sum <= 0.0 {
        // Degenerate belief: spread uniformly over survivors
        let survivors = state.surviving_count().max(1);
        for i in 0..state.cumulative.len() {
            state.cumulative[i] = if state.is_survivor(i) {
                1.0 / survivors as f32
            } else {
                0.0
            };
        }
        return;
    }
    for i in 0..state.cumulative.len() {
        if state.is_survivor(i) {
            state.cumulative[i] /= sum;
        }
    }
}

/// Best surviving label and the calibrated session confidence.
fn final_verdict(state: &SessionEvidenceState) -> (String, f32) {
    let survivors: Vec<usize> = (0..state.labels.len())
        .filter(|&i| state.is_survivor(i))
        .collect();

    let Some(&best) = survivors.iter().max_by(|&&a, &&b| {
        state.cumulative[a]
            .partial_cmp(&state.cumulative[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    }) else {
        return (UNKNOWN_LABEL.to_string(), 0.0);
    };

    let top = state.cumulative[best];
    let second = survivors
        .iter()
        .filter(|&&i| i != best)
        .map(|&i| state.cumulative[i])
        .fold(0.0f32, f32::max);
    let margin = if survivors.len() > 1 { top - second } else { 0.0 };

    let mut confidence =
        top + 0.3 * margin + (0.03 * state.sample_count as f32).min(0.15);

    let surviving = survivors.len();
    if surviving <= 3 {
        confidence *= 1.10;
    }
    if surviving == 2 {
        confidence *= 1.15;
    }

    (
        state.labels[best].clone(),
        confidence.clamp(0.05, 0.99),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn state() -> SessionEvidenceState {
        SessionEvidenceState::new("session-1")
    }

    fn sums_to_one(state: &SessionEvidenceState) -> bool {
        let sum: f32 = (0..state.cumulative.len())
            .filter(|&i| state.is_survivor(i))
            .map(|i| state.cumulative[i])
            .sum();
        (sum - 1.0).abs() < 1e-5
    }

    #[test]
    fn test_threshold_schedule() {
        let policy = EliminationPolicy::default();
        assert_eq!(policy.threshold_for(1), 0.0);
        assert_eq!(policy.threshold_for(2), 0.0);
        assert_eq!(policy.threshold_for(3), 0.05);
        assert_eq!(policy.threshold_for(9), 0.05);
        assert!((policy.threshold_for(10) - 0.10).abs() < 1e-6);
        assert!((policy.threshold_for(14) - 0.10).abs() < 1e-6);
        assert!((policy.threshold_for(15) - 0.15).abs() < 1e-6);
        assert_eq!(policy.threshold_for(200), 0.50);
    }

    #[test]
    fn test_threshold_monotone() {
        let policy = EliminationPolicy::default();
        let mut previous = 0.0;
        for n in 0..100 {
            let current = policy.threshold_for(n);
            assert!(current >= previous, "threshold decreased at n={}", n);
            assert!(current <= 0.50);
            previous = current;
        }
    }

    #[test]
    fn test_first_sample_initializes_belief() {
        let mut s = state();
        let verdict = observe(
            &mut s,
            &labels(&["alice", "bob"]),
            &[0.8, 0.2],
            &EliminationPolicy::default(),
        );
        assert_eq!(verdict.label, "alice");
        assert_eq!(verdict.sample_count, 1);
        assert!(sums_to_one(&s));
    }

    #[test]
    fn test_zero_probabilities_floored() {
        let mut s = state();
        observe(
            &mut s,
            &labels(&["alice", "bob"]),
            &[0.0, 0.0],
            &EliminationPolicy::default(),
        );
        // Both floored to epsilon then normalized: uniform
        assert!((s.cumulative[0] - 0.5).abs() < 1e-5);
        assert!(sums_to_one(&s));
    }

    #[test]
    fn test_no_elimination_before_three_samples() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["alice", "bob"]);
        observe(&mut s, &l, &[0.99, 0.01], &policy);
        let verdict = observe(&mut s, &l, &[0.99, 0.01], &policy);
        assert!(verdict.newly_eliminated.is_empty());
        assert_eq!(s.surviving_count(), 2);
    }

    #[test]
    fn test_elimination_activates_at_three_samples() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["alice", "bob"]);
        observe(&mut s, &l, &[0.99, 0.01], &policy);
        observe(&mut s, &l, &[0.99, 0.01], &policy);
        let verdict = observe(&mut s, &l, &[0.99, 0.01], &policy);

        assert_eq!(verdict.newly_eliminated, vec!["bob".to_string()]);
        assert_eq!(s.surviving_count(), 1);
        assert_eq!(s.cumulative[1], 0.0);
        assert!(sums_to_one(&s));
    }

    #[test]
    fn test_elimination_keeps_minimum_survivor() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["alice", "bob", "carol"]);
        // Uniform evidence cannot eliminate everyone
        for _ in 0..5 {
            observe(&mut s, &l, &[0.34, 0.33, 0.33], &policy);
        }
        assert!(s.surviving_count() >= 1);
    }

    #[test]
    fn test_eliminated_subject_never_returns() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["alice", "bob"]);
        for _ in 0..3 {
            observe(&mut s, &l, &[0.99, 0.01], &policy);
        }
        assert_eq!(s.surviving_count(), 1);

        // Strong contrary evidence; bob stays eliminated
        for _ in 0..3 {
            observe(&mut s, &l, &[0.01, 0.99], &policy);
        }
        assert!(s.eliminated.contains(&1));
        assert_eq!(s.cumulative[1], 0.0);
    }

    #[test]
    fn test_dimension_change_reinitializes() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        observe(&mut s, &labels(&["alice", "bob"]), &[0.8, 0.2], &policy);
        assert_eq!(s.sample_count, 1);

        // Model retrained with three subjects
        let verdict = observe(
            &mut s,
            &labels(&["alice", "bob", "carol"]),
            &[0.5, 0.3, 0.2],
            &policy,
        );
        assert_eq!(verdict.sample_count, 1);
        assert_eq!(s.labels.len(), 3);
    }

    #[test]
    fn test_confidence_bounds() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["alice", "bob"]);
        for _ in 0..20 {
            let verdict = observe(&mut s, &l, &[0.95, 0.05], &policy);
            assert!(verdict.confidence >= 0.05);
            assert!(verdict.confidence <= 0.99);
        }
    }

    #[test]
    fn test_confidence_grows_with_samples() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["alice", "bob", "carol", "dave"]);
        let first = observe(&mut s, &l, &[0.7, 0.1, 0.1, 0.1], &policy);
        let mut last = first.clone();
        for _ in 0..4 {
            last = observe(&mut s, &l, &[0.7, 0.1, 0.1, 0.1], &policy);
        }
        assert!(last.confidence > first.confidence);
    }

    #[test]
    fn test_single_survivor_margin_is_zero() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["alice", "bob"]);
        for _ in 0..3 {
            observe(&mut s, &l, &[0.99, 0.01], &policy);
        }
        assert_eq!(s.surviving_count(), 1);

        // Sole survivor: belief is 1.0, margin contributes nothing;
        // conf = 1.0 + 0 + sample boost, then survivor boosts, clamped
        let verdict = observe(&mut s, &l, &[0.99, 0.01], &policy);
        assert_eq!(verdict.confidence, 0.99);
    }

    #[test]
    fn test_survivor_boosts_compose_for_two() {
        // Three subjects, evidence splits between two of them
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["alice", "bob", "carol"]);
        for _ in 0..3 {
            observe(&mut s, &l, &[0.55, 0.43, 0.02], &policy);
        }
        assert_eq!(s.surviving_count(), 2);

        let verdict = observe(&mut s, &l, &[0.55, 0.43, 0.02], &policy);
        // Both the k<=3 and k==2 multipliers applied
        let top = s.cumulative[0];
        let margin = s.cumulative[0] - s.cumulative[1];
        let expected = ((top + 0.3 * margin + 0.12) * 1.10 * 1.15).clamp(0.05, 0.99);
        assert!((verdict.confidence - expected).abs() < 1e-5);
    }

    #[test]
    fn test_invariants_hold_across_steps() {
        let mut s = state();
        let policy = EliminationPolicy::default();
        let l = labels(&["a", "b", "c", "d", "e"]);
        let evidence = [
            vec![0.5, 0.2, 0.1, 0.1, 0.1],
            vec![0.6, 0.2, 0.1, 0.05, 0.05],
            vec![0.7, 0.15, 0.05, 0.05, 0.05],
            vec![0.8, 0.1, 0.05, 0.03, 0.02],
            vec![0.8, 0.1, 0.05, 0.03, 0.02],
        ];
        for sample in &evidence {
            observe(&mut s, &l, sample, &policy);
            for &i in &s.eliminated {
                assert_eq!(s.cumulative[i], 0.0);
            }
            assert!(sums_to_one(&s));
            assert!(s.surviving_count() >= 1);
        }
    }
}
