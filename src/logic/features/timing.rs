//! Timing-derived features
//!
//! Builds a [`Timeline`] from a normalized event stream once, then the
//! extractors here derive the core timing, dispersion, rhythm, pause,
//! overlap, word-boundary, fatigue, hand, row and finger feature groups
//! from it.

use crate::logic::events::{KeyEventKind, KeystrokeEvent};
use crate::logic::keyboard::{finger_of, hand_of, row_of, Finger, Hand, Row};
use crate::logic::stats;

use super::layout::{
    IDX_MEAN_DWELL, IDX_MEAN_FLIGHT, IDX_TYPING_SPEED,
};
use super::vector::FeatureVector;
use super::FeatureExtractor;

/// Dwell and flight intervals are valid only inside (0, 2000] ms.
/// Out-of-window values are dropped, never clipped.
pub const VALID_INTERVAL_MS: f32 = 2000.0;

/// Flights at or above this are pauses.
pub const PAUSE_THRESHOLD_MS: f32 = 200.0;

/// Pauses at or above this are long pauses.
pub const LONG_PAUSE_THRESHOLD_MS: f32 = 500.0;

/// A second keydown this close to a still-pressed key is an overlap.
pub const OVERLAP_WINDOW_MS: i64 = 100;

/// Timing skeleton of one session, computed in a single O(n) pass.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    /// Normalized key and timestamp of every keydown, in order.
    pub keydowns: Vec<(String, i64)>,
    /// Gap between keydown i and i+1; None when outside the validity window.
    pub pair_gaps: Vec<Option<f32>>,
    /// Per-occurrence dwell samples (key, ms), validity-filtered.
    pub dwells: Vec<(String, f32)>,
    /// Overlap gap samples (ms).
    pub overlap_gaps: Vec<f32>,
    pub first_t: i64,
    pub last_t: i64,
}

impl Timeline {
    /// Build from an already-normalized event list.
    pub fn build(events: &[KeystrokeEvent]) -> Self {
        let mut timeline = Timeline::default();
        if events.is_empty() {
            return timeline;
        }

        timeline.first_t = events[0].timestamp;
        timeline.last_t = events[events.len() - 1].timestamp;

        // Per-key stack of open keydown timestamps; LIFO matching pairs
        // auto-repeat bursts correctly.
        let mut open: std::collections::HashMap<&str, Vec<i64>> =
            std::collections::HashMap::new();

        for event in events {
            match event.kind {
                KeyEventKind::Keydown => {
                    // Overlap: any still-pressed key whose keydown is
                    // within the window contributes one sample.
                    for stack in open.values() {
                        for &t_down in stack {
                            let gap = event.timestamp - t_down;
                            if (0..=OVERLAP_WINDOW_MS).contains(&gap) {
                                timeline.overlap_gaps.push(gap as f32);
                            }
                        }
                    }
                    open.entry(event.key.as_str())
                        .or_default()
                        .push(event.timestamp);
                    timeline
                        .keydowns
                        .push((event.key.clone(), event.timestamp));
                }
                KeyEventKind::Keyup => {
                    if let Some(stack) = open.get_mut(event.key.as_str()) {
                        if let Some(t_down) = stack.pop() {
                            let dwell = (event.timestamp - t_down) as f32;
                            if dwell > 0.0 && dwell <= VALID_INTERVAL_MS {
                                timeline.dwells.push((event.key.clone(), dwell));
                            }
                        }
                    }
                }
            }
        }

        timeline.pair_gaps = timeline
            .keydowns
            .windows(2)
            .map(|pair| {
                let gap = (pair[1].1 - pair[0].1) as f32;
                (gap > 0.0 && gap <= VALID_INTERVAL_MS).then_some(gap)
            })
            .collect();

        timeline
    }

    pub fn dwell_values(&self) -> Vec<f32> {
        self.dwells.iter().map(|(_, v)| *v).collect()
    }

    pub fn flight_values(&self) -> Vec<f32> {
        self.pair_gaps.iter().flatten().copied().collect()
    }

    /// Keydowns per second over the full event span.
    pub fn typing_speed(&self) -> f32 {
        let span_ms = self.last_t - self.first_t;
        if span_ms <= 0 {
            return 0.0;
        }
        self.keydowns.len() as f32 * 1000.0 / span_ms as f32
    }
}

// ============================================================================
// TIMING FEATURES
// ============================================================================

/// Core timing, dispersion, percentile, rhythm, pause, overlap,
/// word-boundary and speed-decay features.
pub struct TimingFeatures<'a> {
    timeline: &'a Timeline,
}

impl<'a> TimingFeatures<'a> {
    pub fn new(timeline: &'a Timeline) -> Self {
        Self { timeline }
    }

    fn word_lengths(&self) -> Vec<f32> {
        let mut lengths = Vec::new();
        let mut current = 0u32;
        for (key, _) in &self.timeline.keydowns {
            if key == "Space" {
                if current > 0 {
                    lengths.push(current as f32);
                }
                current = 0;
            } else {
                current += 1;
            }
        }
        if current > 0 {
            lengths.push(current as f32);
        }
        lengths
    }

    fn space_adjacent_flights(&self) -> (Vec<f32>, Vec<f32>) {
        let mut pre = Vec::new();
        let mut post = Vec::new();
        for (i, gap) in self.timeline.pair_gaps.iter().enumerate() {
            if let Some(gap) = gap {
                if self.timeline.keydowns[i + 1].0 == "Space" {
                    pre.push(*gap);
                }
                if self.timeline.keydowns[i].0 == "Space" {
                    post.push(*gap);
                }
            }
        }
        (pre, post)
    }
}

impl FeatureExtractor for TimingFeatures<'_> {
    fn extract(&self, vector: &mut FeatureVector) {
        let dwells = self.timeline.dwell_values();
        let flights = self.timeline.flight_values();

        let mean_dwell = stats::mean(&dwells);
        let mean_flight = stats::mean(&flights);

        vector.set(IDX_MEAN_DWELL, mean_dwell);
        vector.set(IDX_MEAN_FLIGHT, mean_flight);
        vector.set(IDX_TYPING_SPEED, self.timeline.typing_speed());

        vector.set(3, stats::variance(&dwells));
        vector.set(4, stats::std_dev(&dwells));
        vector.set(5, stats::variance(&flights));
        vector.set(6, stats::std_dev(&flights));

        vector.set(7, stats::percentile(&dwells, 25.0));
        vector.set(8, stats::percentile(&dwells, 50.0));
        vector.set(9, stats::percentile(&dwells, 75.0));
        vector.set(10, stats::percentile(&flights, 25.0));
        vector.set(11, stats::percentile(&flights, 50.0));
        vector.set(12, stats::percentile(&flights, 75.0));

        vector.set(13, stats::consistency(&flights));
        vector.set(14, stats::consistency(&dwells));
        vector.set(15, if mean_dwell > 0.0 { mean_flight / mean_dwell } else { 0.0 });

        // Pause buckets over all valid flights
        if !flights.is_empty() {
            let total = flights.len() as f32;
            let short = flights
                .iter()
                .filter(|&&f| f >= PAUSE_THRESHOLD_MS && f < LONG_PAUSE_THRESHOLD_MS)
                .count() as f32;
            let long = flights
                .iter()
                .filter(|&&f| f >= LONG_PAUSE_THRESHOLD_MS)
                .count() as f32;
            vector.set(16, short / total);
            vector.set(17, long / total);
            vector.set(18, (short + long) / total);
        }
        let pauses: Vec<f32> = flights
            .iter()
            .filter(|&&f| f >= PAUSE_THRESHOLD_MS)
            .copied()
            .collect();
        vector.set(19, stats::mean(&pauses));

        // Overlap
        let keydown_count = self.timeline.keydowns.len();
        if keydown_count > 0 {
            vector.set(
                117,
                self.timeline.overlap_gaps.len() as f32 / keydown_count as f32,
            );
        }
        vector.set(118, stats::mean(&self.timeline.overlap_gaps));

        // Word boundaries
        let (pre_space, post_space) = self.space_adjacent_flights();
        vector.set(119, stats::mean(&pre_space));
        vector.set(120, stats::mean(&post_space));
        vector.set(121, stats::mean(&self.word_lengths()));

        // Typing speed decay: first half of the flight sequence vs second
        let half = flights.len() / 2;
        let first_mean = stats::mean(&flights[..half]);
        let second_mean = stats::mean(&flights[half..]);
        if first_mean > 0.0 {
            vector.set(122, (second_mean - first_mean) / first_mean);
        }
    }
}

// ============================================================================
// POSITIONAL FEATURES (hand / row / finger)
// ============================================================================

/// Hand-transition, row-usage and per-finger dwell features over the
/// frozen QWERTY tables. Unclassified keys contribute to nothing here.
pub struct PositionalFeatures<'a> {
    timeline: &'a Timeline,
}

impl<'a> PositionalFeatures<'a> {
    pub fn new(timeline: &'a Timeline) -> Self {
        Self { timeline }
    }
}

impl FeatureExtractor for PositionalFeatures<'_> {
    fn extract(&self, vector: &mut FeatureVector) {
        // Hand transitions over consecutive keydown pairs
        let mut counts = [0u32; 4]; // LL, LR, RL, RR
        for pair in self.timeline.keydowns.windows(2) {
            if let (Some(a), Some(b)) = (hand_of(&pair[0].0), hand_of(&pair[1].0)) {
                let idx = match (a, b) {
                    (Hand::Left, Hand::Left) => 0,
                    (Hand::Left, Hand::Right) => 1,
                    (Hand::Right, Hand::Left) => 2,
                    (Hand::Right, Hand::Right) => 3,
                };
                counts[idx] += 1;
            }
        }
        let total: u32 = counts.iter().sum();
        if total > 0 {
            let total = total as f32;
            vector.set(23, (counts[1] + counts[2]) as f32 / total);
            vector.set(24, counts[0] as f32 / total);
            vector.set(25, counts[1] as f32 / total);
            vector.set(26, counts[2] as f32 / total);
            vector.set(27, counts[3] as f32 / total);
        } else {
            // No classified transitions: neutral alternation
            vector.set(23, 0.5);
        }

        // Row usage over classified keydowns
        let mut row_counts = [0u32; 3]; // top, home, bottom
        for (key, _) in &self.timeline.keydowns {
            match row_of(key) {
                Some(Row::Top) => row_counts[0] += 1,
                Some(Row::Home) => row_counts[1] += 1,
                Some(Row::Bottom) => row_counts[2] += 1,
                None => {}
            }
        }
        let classified: u32 = row_counts.iter().sum();
        if classified > 0 {
            let classified = classified as f32;
            vector.set(28, row_counts[0] as f32 / classified);
            vector.set(29, row_counts[1] as f32 / classified);
            vector.set(30, row_counts[2] as f32 / classified);
        }

        // Row jumps over consecutive classified keydown pairs
        let mut jump_pairs = 0u32;
        let mut jumps = 0u32;
        for pair in self.timeline.keydowns.windows(2) {
            if let (Some(a), Some(b)) = (row_of(&pair[0].0), row_of(&pair[1].0)) {
                jump_pairs += 1;
                if a != b {
                    jumps += 1;
                }
            }
        }
        if jump_pairs > 0 {
            vector.set(31, jumps as f32 / jump_pairs as f32);
        }

        // Per-finger mean dwell
        let mut by_finger: [Vec<f32>; 5] = Default::default();
        for (key, dwell) in &self.timeline.dwells {
            let slot = match finger_of(key) {
                Some(Finger::Pinky) => 0,
                Some(Finger::Ring) => 1,
                Some(Finger::Middle) => 2,
                Some(Finger::Index) => 3,
                Some(Finger::Thumb) => 4,
                None => continue,
            };
            by_finger[slot].push(*dwell);
        }
        for (i, samples) in by_finger.iter().enumerate() {
            vector.set(32 + i, stats::mean(samples));
        }
    }
}
