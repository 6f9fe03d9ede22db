//! Keyed timing features: per-key dwells, digraph flights, trigraph times
//!
//! The key/digraph/trigraph lists are frozen in `layout` next to the
//! slot names; trainer and predictor always agree on them. N-grams are
//! keyed by dash-joined normalized keys ("t-h", "t-h-e"); features that
//! depend on a specific n-gram fall back to the session's global mean
//! flight so an untyped n-gram does not pull the vector toward zero.

use std::collections::HashMap;

use crate::logic::stats;

use super::layout::{
    DIGRAPHS, DIGRAPH_OFFSET, DIGRAPH_VARIANCE_OFFSET, DWELL_KEYS, DWELL_KEY_OFFSET, TRIGRAPHS,
    TRIGRAPH_OFFSET, VARIANCE_DIGRAPHS,
};
use super::timing::Timeline;
use super::vector::FeatureVector;
use super::FeatureExtractor;

pub struct NgraphFeatures<'a> {
    timeline: &'a Timeline,
}

impl<'a> NgraphFeatures<'a> {
    pub fn new(timeline: &'a Timeline) -> Self {
        Self { timeline }
    }

    fn digraph_samples(&self) -> HashMap<String, Vec<f32>> {
        let mut samples: HashMap<String, Vec<f32>> = HashMap::new();
        for (i, gap) in self.timeline.pair_gaps.iter().enumerate() {
            if let Some(gap) = gap {
                let key = format!(
                    "{}-{}",
                    self.timeline.keydowns[i].0, self.timeline.keydowns[i + 1].0
                );
                samples.entry(key).or_default().push(*gap);
            }
        }
        samples
    }

    /// Trigraph spanning times t3 - t1, accepted only when both
    /// component flights are individually valid.
    fn trigraph_samples(&self) -> HashMap<String, Vec<f32>> {
        let mut samples: HashMap<String, Vec<f32>> = HashMap::new();
        let keydowns = &self.timeline.keydowns;
        for i in 0..keydowns.len().saturating_sub(2) {
            let (first_valid, second_valid) = (
                self.timeline.pair_gaps[i].is_some(),
                self.timeline.pair_gaps[i + 1].is_some(),
            );
            if !(first_valid && second_valid) {
                continue;
            }
            let key = format!(
                "{}-{}-{}",
                keydowns[i].0,
                keydowns[i + 1].0,
                keydowns[i + 2].0
            );
            let span = (keydowns[i + 2].1 - keydowns[i].1) as f32;
            samples.entry(key).or_default().push(span);
        }
        samples
    }

    fn dwell_samples(&self) -> HashMap<&str, Vec<f32>> {
        let mut samples: HashMap<&str, Vec<f32>> = HashMap::new();
        for (key, dwell) in &self.timeline.dwells {
            samples.entry(key.as_str()).or_default().push(*dwell);
        }
        samples
    }
}

fn dashed(ngram: &str) -> String {
    ngram
        .chars()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

impl FeatureExtractor for NgraphFeatures<'_> {
    fn extract(&self, vector: &mut FeatureVector) {
        let global_mean_flight = stats::mean(&self.timeline.flight_values());

        // Per-key dwells; absent keys stay at zero
        let dwells = self.dwell_samples();
        for (i, key) in DWELL_KEYS.iter().enumerate() {
            if let Some(samples) = dwells.get(key) {
                vector.set(DWELL_KEY_OFFSET + i, stats::mean(samples));
            }
        }

        // Digraph mean flights with the global-mean default
        let digraphs = self.digraph_samples();
        for (i, digraph) in DIGRAPHS.iter().enumerate() {
            let value = digraphs
                .get(&dashed(digraph))
                .map(|samples| stats::mean(samples))
                .unwrap_or(global_mean_flight);
            vector.set(DIGRAPH_OFFSET + i, value);
        }

        // Digraph flight variance: zero below two occurrences
        for (i, digraph) in VARIANCE_DIGRAPHS.iter().enumerate() {
            let value = digraphs
                .get(&dashed(digraph))
                .filter(|samples| samples.len() >= 2)
                .map(|samples| stats::variance(samples))
                .unwrap_or(0.0);
            vector.set(DIGRAPH_VARIANCE_OFFSET + i, value);
        }

        // Trigraph spanning times with the global-mean default
        let trigraphs = self.trigraph_samples();
        for (i, trigraph) in TRIGRAPHS.iter().enumerate() {
            let value = trigraphs
                .get(&dashed(trigraph))
                .map(|samples| stats::mean(samples))
                .unwrap_or(global_mean_flight);
            vector.set(TRIGRAPH_OFFSET + i, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::events::{normalize_events, KeystrokeEvent};
    use crate::logic::features::vector::UNKNOWN_LABEL;

    fn extract(keys: &[(&str, i64)]) -> FeatureVector {
        let mut events = Vec::new();
        for (key, t) in keys {
            events.push(KeystrokeEvent::keydown(key, *t));
            events.push(KeystrokeEvent::keyup(key, *t + 50));
        }
        let normalized = normalize_events(&events);
        let timeline = Timeline::build(&normalized);
        let mut vector = FeatureVector::zeroed(UNKNOWN_LABEL);
        NgraphFeatures::new(&timeline).extract(&mut vector);
        vector
    }

    #[test]
    fn test_dashed_keys() {
        assert_eq!(dashed("th"), "t-h");
        assert_eq!(dashed("the"), "t-h-e");
    }

    #[test]
    fn test_digraph_mean_flight() {
        // "th" twice: flights 100 and 200 -> mean 150
        let vector = extract(&[("t", 0), ("h", 100), ("x", 400), ("t", 700), ("h", 900)]);
        assert_eq!(vector.get_by_name("dg_th"), Some(150.0));
    }

    #[test]
    fn test_absent_digraph_defaults_to_global_mean() {
        let vector = extract(&[("a", 0), ("b", 100), ("c", 300)]);
        // Global mean flight = (100 + 200) / 2 = 150
        assert_eq!(vector.get_by_name("dg_th"), Some(150.0));
        assert_eq!(vector.get_by_name("dg_er"), Some(150.0));
    }

    #[test]
    fn test_digraph_variance_needs_two_samples() {
        // One "th" only: variance slot stays 0
        let single = extract(&[("t", 0), ("h", 100)]);
        assert_eq!(single.get_by_name("dgv_th"), Some(0.0));

        // Two "th" samples (100, 200): sample variance 5000
        let double = extract(&[("t", 0), ("h", 100), ("x", 400), ("t", 700), ("h", 900)]);
        assert_eq!(double.get_by_name("dgv_th"), Some(5000.0));
    }

    #[test]
    fn test_trigraph_spanning_time() {
        // t@0 h@100 e@250 -> "the" span 250
        let vector = extract(&[("t", 0), ("h", 100), ("e", 250)]);
        assert_eq!(vector.get_by_name("tg_the"), Some(250.0));
    }

    #[test]
    fn test_trigraph_rejected_when_component_flight_invalid() {
        // Second flight 2500 ms: trigraph invalid, slot falls back to
        // the global mean flight (100, the only valid flight).
        let vector = extract(&[("t", 0), ("h", 100), ("e", 2600)]);
        assert_eq!(vector.get_by_name("tg_the"), Some(100.0));
    }

    #[test]
    fn test_per_key_dwell() {
        let vector = extract(&[("e", 0), ("t", 100)]);
        assert_eq!(vector.get_by_name("key_dwell_e"), Some(50.0));
        assert_eq!(vector.get_by_name("key_dwell_t"), Some(50.0));
        // Untyped key stays at zero
        assert_eq!(vector.get_by_name("key_dwell_m"), Some(0.0));
    }

    #[test]
    fn test_space_dwell_slot() {
        let vector = extract(&[(" ", 0), ("a", 100)]);
        assert_eq!(vector.get_by_name("key_dwell_space"), Some(50.0));
    }
}
