//! Sliding-window training augmentation
//!
//! One long labeled session yields several overlapping sub-sessions, so
//! sparse subjects still reach usable sample counts. A window is not a
//! new session for any external accounting; it only exists inside one
//! training run. Every emitted vector must pass the validity gate.

use serde::{Deserialize, Serialize};

use crate::logic::events::KeystrokeEvent;
use crate::logic::features::{extract_features, extract_for_training, FeatureVector};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Window length as a fraction of the session's event count.
    pub window_fraction: f32,
    /// Step between window starts as a fraction of the event count.
    pub step_fraction: f32,
    /// Sessions shorter than this produce no windows, only the full vector.
    pub min_session_events: usize,
    /// Windows shorter than this are discarded.
    pub min_window_events: usize,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            window_fraction: 0.7,
            step_fraction: 0.3,
            min_session_events: 30,
            min_window_events: 20,
        }
    }
}

/// Extract all training vectors from one normalized session: the full
/// vector plus sliding windows for long sessions. Vectors failing the
/// validity gate are dropped.
pub fn training_vectors(
    events: &[KeystrokeEvent],
    label: &str,
    config: &AugmentationConfig,
) -> Vec<FeatureVector> {
    let mut vectors = Vec::new();

    // Sessions too short to form a training sample contribute nothing
    let Ok(full) = extract_for_training(events, label) else {
        return vectors;
    };
    if full.passes_validity_gate() {
        vectors.push(full);
    }

    let n = events.len();
    if n >= config.min_session_events {
        let window = (config.window_fraction * n as f32).floor() as usize;
        let step = ((config.step_fraction * n as f32).floor() as usize).max(1);

        let mut start = 0;
        while start + window <= n {
            let slice = &events[start..start + window];
            if slice.len() >= config.min_window_events {
                let vector = extract_features(slice, Some(label));
                if vector.passes_validity_gate() {
                    vectors.push(vector);
                }
            }
            start += step;
        }
    }

    vectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::events::normalize_events;

    fn session(keys: usize) -> Vec<KeystrokeEvent> {
        let mut events = Vec::new();
        let mut t = 0i64;
        let alphabet = ["t", "h", "e", " ", "c", "a", "r"];
        for i in 0..keys {
            let key = alphabet[i % alphabet.len()];
            events.push(KeystrokeEvent::keydown(key, t));
            events.push(KeystrokeEvent::keyup(key, t + 90));
            t += 160;
        }
        normalize_events(&events)
    }

    #[test]
    fn test_short_session_yields_single_vector() {
        // 10 keys -> 20 events, below the windowing minimum of 30
        let vectors = training_vectors(&session(10), "alice", &AugmentationConfig::default());
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].label, "alice");
    }

    #[test]
    fn test_long_session_is_augmented() {
        // 30 keys -> 60 events: window 42, step 18 -> starts 0 and 18
        let vectors = training_vectors(&session(30), "alice", &AugmentationConfig::default());
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.label == "alice"));
        assert!(vectors.iter().all(|v| v.passes_validity_gate()));
    }

    #[test]
    fn test_windows_differ_from_full_vector() {
        let vectors = training_vectors(&session(30), "alice", &AugmentationConfig::default());
        // Window vectors cover fewer events, so typing-span features differ
        assert_ne!(vectors[0], vectors[1]);
    }

    #[test]
    fn test_degenerate_session_filtered_out() {
        // Single event: zero vector, fails the validity gate
        let events = normalize_events(&[KeystrokeEvent::keydown("a", 0)]);
        let vectors = training_vectors(&events, "alice", &AugmentationConfig::default());
        assert!(vectors.is_empty());
    }
}
