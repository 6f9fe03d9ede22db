//! Prediction calibration
//!
//! Converts raw per-class scores into a temperature-scaled probability
//! distribution, derives the quality signals (normalized entropy, top-2
//! margin) and applies the rule ladder that adjusts the headline
//! confidence. Numeric faults here never fail a request: the fallback
//! is the uniform distribution.

use serde::{Deserialize, Serialize};

/// A calibrated single-sample prediction.
///
/// `labels[i]` is the subject behind `probabilities[i]` - this pairing
/// comes straight from the model artifact and is the only valid way to
/// read the distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratedPrediction {
    pub predicted_label: String,
    pub labels: Vec<String>,
    pub probabilities: Vec<f32>,
    /// Shannon entropy normalized to [0, 1]; 0 = certain.
    pub entropy: f32,
    /// Gap between the two largest probabilities.
    pub top_two_margin: f32,
    /// Top probability after the quality adjustments, in [0, 1].
    pub adjusted_confidence: f32,
}

/// Temperature-scaled softmax with max-subtraction for stability.
/// Any non-finite outcome collapses to the uniform distribution.
pub fn softmax_with_temperature(scores: &[f32], temperature: f32) -> Vec<f32> {
    let n = scores.len();
    if n == 0 {
        return Vec::new();
    }
    let tau = if temperature > 0.0 { temperature } else { 1.0 };

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![1.0 / n as f32; n];
    }

    let exps: Vec<f32> = scores.iter().map(|s| ((s - max) / tau).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return vec![1.0 / n as f32; n];
    }

    let probs: Vec<f32> = exps.iter().map(|e| e / sum).collect();
    if probs.iter().any(|p| !p.is_finite()) {
        return vec![1.0 / n as f32; n];
    }
    probs
}

/// Shannon entropy of a probability vector, normalized by log(n).
/// One or zero classes carry no uncertainty.
pub fn normalized_entropy(probabilities: &[f32]) -> f32 {
    let n = probabilities.len();
    if n <= 1 {
        return 0.0;
    }
    let raw: f32 = probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum();
    let normalized = raw / (n as f32).ln();
    normalized.clamp(0.0, 1.0)
}

/// Difference between the two largest probabilities. A single class is
/// maximally separated by definition.
pub fn top_two_margin(probabilities: &[f32]) -> f32 {
    if probabilities.len() < 2 {
        return 1.0;
    }
    let mut sorted = probabilities.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    (sorted[0] - sorted[1]).clamp(0.0, 1.0)
}

/// The confidence rule ladder, applied to the top probability in order.
fn adjust_confidence(top_probability: f32, entropy: f32, margin: f32) -> f32 {
    let mut confidence = top_probability;

    if entropy > 0.70 {
        confidence *= 0.85;
    } else if entropy > 0.50 {
        confidence *= 0.92;
    }

    if margin < 0.10 {
        confidence *= 0.80;
    } else if margin < 0.20 {
        confidence *= 0.90;
    }

    if entropy < 0.30 && margin > 0.40 {
        confidence = (confidence * 1.05).min(1.0);
    }

    confidence.clamp(0.0, 1.0)
}

/// Calibrate raw scores into a [`CalibratedPrediction`].
pub fn calibrate(labels: &[String], raw_scores: &[f32], temperature: f32) -> CalibratedPrediction {
    let n = labels.len().min(raw_scores.len());
    let labels = labels[..n].to_vec();
    let probabilities = softmax_with_temperature(&raw_scores[..n], temperature);

    let entropy = normalized_entropy(&probabilities);
    let margin = top_two_margin(&probabilities);

    let (best_idx, best_prob) = probabilities
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, p)| (i, *p))
        .unwrap_or((0, 0.0));

    let predicted_label = labels
        .get(best_idx)
        .cloned()
        .unwrap_or_else(|| crate::logic::features::UNKNOWN_LABEL.to_string());

    CalibratedPrediction {
        predicted_label,
        labels,
        probabilities,
        entropy,
        top_two_margin: margin,
        adjusted_confidence: adjust_confidence(best_prob, entropy, margin),
    }
}
