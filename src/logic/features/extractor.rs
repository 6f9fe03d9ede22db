//! Feature extraction entry point
//!
//! Turns a normalized event stream into one [`FeatureVector`]. The
//! individual extractors each own a feature group; this module builds
//! the shared [`Timeline`] once and runs them all.

use crate::logic::events::KeystrokeEvent;
use crate::logic::ProfilerError;

use super::corrections::CorrectionFeatures;
use super::layout;
use super::ngraphs::NgraphFeatures;
use super::timing::{PositionalFeatures, TimingFeatures, Timeline};
use super::vector::{FeatureVector, UNKNOWN_LABEL};
use super::FeatureExtractor;

/// Below this many events a training sample cannot be formed.
pub const MIN_EVENTS_TRAINING: usize = 10;

/// Extract the full feature vector from a normalized event list.
///
/// Fewer than 2 events yields the zero vector labeled `"Unknown"`
/// regardless of the requested label; such input carries no timing
/// signal. Every slot of the result is finite.
pub fn extract_features(events: &[KeystrokeEvent], label: Option<&str>) -> FeatureVector {
    if events.len() < 2 {
        return FeatureVector::zeroed(UNKNOWN_LABEL);
    }

    let timeline = Timeline::build(events);
    let mut vector = FeatureVector::zeroed(label.unwrap_or(UNKNOWN_LABEL));

    TimingFeatures::new(&timeline).extract(&mut vector);
    PositionalFeatures::new(&timeline).extract(&mut vector);
    CorrectionFeatures::new(&timeline).extract(&mut vector);
    NgraphFeatures::new(&timeline).extract(&mut vector);

    let replaced = vector.sanitize();
    if !replaced.is_empty() {
        let names: Vec<&str> = replaced
            .iter()
            .filter_map(|&i| layout::feature_name(i))
            .collect();
        tracing::warn!(?names, "non-finite feature slots zeroed after extraction");
    }

    vector
}

/// Extraction for training: rejects streams too short to carry a
/// usable sample instead of returning a degenerate vector.
pub fn extract_for_training(
    events: &[KeystrokeEvent],
    label: &str,
) -> Result<FeatureVector, ProfilerError> {
    if events.len() < MIN_EVENTS_TRAINING {
        return Err(ProfilerError::InsufficientInput(events.len()));
    }
    Ok(extract_features(events, Some(label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::events::normalize_events;
    use crate::logic::features::layout::FEATURE_COUNT;

    fn prose_events() -> Vec<KeystrokeEvent> {
        // "the cat" with plausible timings
        let keys = ["t", "h", "e", " ", "c", "a", "t"];
        let mut events = Vec::new();
        let mut t = 0i64;
        for key in keys {
            events.push(KeystrokeEvent::keydown(key, t));
            events.push(KeystrokeEvent::keyup(key, t + 85));
            t += 160;
        }
        normalize_events(&events)
    }

    #[test]
    fn test_trivial_input_yields_zero_vector() {
        let empty = extract_features(&[], Some("alice"));
        assert_eq!(empty.label, "Unknown");
        assert!(empty.values.iter().all(|&v| v == 0.0));

        let single = normalize_events(&[KeystrokeEvent::keydown("a", 0)]);
        let vector = extract_features(&single, Some("alice"));
        assert_eq!(vector.label, "Unknown");
        assert!(vector.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let events = prose_events();
        let first = extract_features(&events, Some("alice"));
        let second = extract_features(&events, Some("alice"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_all_slots_finite() {
        let vector = extract_features(&prose_events(), None);
        assert_eq!(vector.values.len(), FEATURE_COUNT);
        assert!(vector.is_finite());
    }

    #[test]
    fn test_prose_passes_validity_gate() {
        let vector = extract_features(&prose_events(), Some("alice"));
        assert!(vector.passes_validity_gate());
        assert_eq!(vector.label, "alice");
    }

    #[test]
    fn test_training_extraction_rejects_short_streams() {
        let events = normalize_events(&[
            KeystrokeEvent::keydown("a", 0),
            KeystrokeEvent::keyup("a", 80),
        ]);
        let result = extract_for_training(&events, "alice");
        assert!(matches!(result, Err(ProfilerError::InsufficientInput(2))));
    }

    #[test]
    fn test_training_extraction_accepts_full_streams() {
        let vector = extract_for_training(&prose_events(), "alice").unwrap();
        assert_eq!(vector.label, "alice");
    }
}
