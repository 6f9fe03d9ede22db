//! Feature layout - the frozen feature schema
//!
//! Single source of truth for feature ordering. Trained model artifacts
//! carry the version and hash recorded here; a mismatch at load time is
//! a hard rejection, never a reinterpretation.
//!
//! Rules:
//! 1. Add a feature -> increment FEATURE_VERSION
//! 2. Change order -> increment FEATURE_VERSION
//! 3. Remove a feature -> increment FEATURE_VERSION

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version.
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// N-GRAM ENUMERATIONS (frozen alongside the layout)
// ============================================================================

/// Digraphs with a dedicated mean-flight slot, most common English pairs.
pub const DIGRAPHS: &[&str] = &[
    "th", "he", "in", "er", "an", "re", "on", "at", "en", "nd",
    "ti", "es", "or", "te", "of", "ed", "is", "it", "al", "ar",
    "st", "to", "nt", "ng", "se", "ha", "as", "ou", "io", "le",
    "ve", "co", "me", "de", "hi", "ri", "ro", "ic", "ne", "ea",
    "ra", "ce", "li", "ch", "ll", "be", "ma", "si", "om", "ur",
];

/// Digraphs that additionally carry a flight-variance slot.
pub const VARIANCE_DIGRAPHS: &[&str] = &["th", "he", "in", "er", "an"];

/// Trigraphs with a dedicated timing slot.
pub const TRIGRAPHS: &[&str] = &[
    "the", "and", "ing", "ion", "tio", "ent", "for", "her", "hat", "his",
];

/// Keys with a dedicated mean-dwell slot. `"Space"` is the sentinel for
/// the space bar; the rest are the most frequent English letters.
pub const DWELL_KEYS: &[&str] = &[
    "e", "t", "a", "o", "i", "n", "s", "h", "r", "d", "l", "c", "u", "m", "Space",
];

// ============================================================================
// FEATURE LAYOUT (authoritative order)
// ============================================================================

/// Feature names in the exact order they appear in the vector.
pub const FEATURE_LAYOUT: &[&str] = &[
    // === Core timing (0-2) ===
    "mean_dwell_time",        // 0: mean key hold duration (ms)
    "mean_flight_time",       // 1: mean keydown-to-keydown interval (ms)
    "typing_speed",           // 2: keydowns per second

    // === Dispersion (3-6) ===
    "dwell_time_variance",    // 3
    "dwell_time_std_dev",     // 4
    "flight_time_variance",   // 5
    "flight_time_std_dev",    // 6

    // === Percentiles (7-12) ===
    "dwell_p25",              // 7
    "dwell_p50",              // 8
    "dwell_p75",              // 9
    "flight_p25",             // 10
    "flight_p50",             // 11
    "flight_p75",             // 12

    // === Rhythm (13-15) ===
    "rhythm_consistency",     // 13: flight stddev / flight mean
    "dwell_consistency",      // 14: dwell stddev / dwell mean
    "flight_dwell_ratio",     // 15: mean flight / mean dwell

    // === Pauses (16-19) ===
    "short_pause_frequency",  // 16: flights in [200, 500) ms, as fraction
    "long_pause_frequency",   // 17: flights >= 500 ms, as fraction
    "pause_rate",             // 18: flights >= 200 ms, as fraction
    "mean_pause_duration",    // 19: mean of flights >= 200 ms

    // === Error correction (20-22) ===
    "backspace_frequency",    // 20: backspace keydowns / all keydowns
    "consecutive_backspaces", // 21: mean length of backspace runs
    "error_correction_speed", // 22: mean backspace-to-resume interval (ms)

    // === Hand transitions (23-27) ===
    "hand_alternation_ratio", // 23: different-hand transitions / classified
    "left_left_ratio",        // 24
    "left_right_ratio",       // 25
    "right_left_ratio",       // 26
    "right_right_ratio",      // 27

    // === Row position (28-31) ===
    "top_row_usage",          // 28
    "home_row_usage",         // 29
    "bottom_row_usage",       // 30
    "row_jump_ratio",         // 31: consecutive classified keydowns changing row

    // === Per-finger dwell (32-36) ===
    "pinky_dwell",            // 32
    "ring_dwell",             // 33
    "middle_dwell",           // 34
    "index_dwell",            // 35
    "thumb_dwell",            // 36

    // === Trigraph timings (37-46) ===
    "tg_the", "tg_and", "tg_ing", "tg_ion", "tg_tio",
    "tg_ent", "tg_for", "tg_her", "tg_hat", "tg_his",

    // === Per-key dwell (47-61) ===
    "key_dwell_e", "key_dwell_t", "key_dwell_a", "key_dwell_o", "key_dwell_i",
    "key_dwell_n", "key_dwell_s", "key_dwell_h", "key_dwell_r", "key_dwell_d",
    "key_dwell_l", "key_dwell_c", "key_dwell_u", "key_dwell_m", "key_dwell_space",

    // === Digraph flights (62-111) ===
    "dg_th", "dg_he", "dg_in", "dg_er", "dg_an",
    "dg_re", "dg_on", "dg_at", "dg_en", "dg_nd",
    "dg_ti", "dg_es", "dg_or", "dg_te", "dg_of",
    "dg_ed", "dg_is", "dg_it", "dg_al", "dg_ar",
    "dg_st", "dg_to", "dg_nt", "dg_ng", "dg_se",
    "dg_ha", "dg_as", "dg_ou", "dg_io", "dg_le",
    "dg_ve", "dg_co", "dg_me", "dg_de", "dg_hi",
    "dg_ri", "dg_ro", "dg_ic", "dg_ne", "dg_ea",
    "dg_ra", "dg_ce", "dg_li", "dg_ch", "dg_ll",
    "dg_be", "dg_ma", "dg_si", "dg_om", "dg_ur",

    // === Digraph flight variance (112-116) ===
    "dgv_th", "dgv_he", "dgv_in", "dgv_er", "dgv_an",

    // === Key overlap (117-118) ===
    "key_overlap_frequency",  // 117: overlap samples / keydowns
    "mean_overlap_gap",       // 118: mean gap of overlap samples (ms)

    // === Word boundaries (119-121) ===
    "pre_space_flight",       // 119: mean flight into the space bar
    "post_space_flight",      // 120: mean flight out of the space bar
    "mean_word_length",       // 121: mean keydowns between spaces

    // === Fatigue (122-123) ===
    "typing_speed_decay",     // 122: second-half vs first-half flight drift
    "error_rate_increase",    // 123: second-half vs first-half backspaces
];

/// Total number of feature slots.
/// IMPORTANT: must match FEATURE_LAYOUT.len().
pub const FEATURE_COUNT: usize = 124;

// Offsets of the variable-size groups inside FEATURE_LAYOUT.
pub const TRIGRAPH_OFFSET: usize = 37;
pub const DWELL_KEY_OFFSET: usize = 47;
pub const DIGRAPH_OFFSET: usize = 62;
pub const DIGRAPH_VARIANCE_OFFSET: usize = 112;

// Named indices used directly by extractors.
pub const IDX_MEAN_DWELL: usize = 0;
pub const IDX_MEAN_FLIGHT: usize = 1;
pub const IDX_TYPING_SPEED: usize = 2;

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 hash over the version, the slot names and the frozen n-gram
/// lists. Detects layout drift between a stored artifact and this build.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);
    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    for table in [DIGRAPHS, VARIANCE_DIGRAPHS, TRIGRAPHS, DWELL_KEYS] {
        for entry in table {
            hasher.update(entry.as_bytes());
            hasher.update(&[1]);
        }
    }
    hasher.finalize()
}

// ============================================================================
// LAYOUT VALIDATION
// ============================================================================

/// A stored artifact or vector was produced under a different layout.
#[derive(Debug, Clone)]
pub struct LayoutMismatchError {
    pub expected_version: u8,
    pub expected_hash: u32,
    pub actual_version: u8,
    pub actual_hash: u32,
}

impl std::fmt::Display for LayoutMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "feature layout mismatch: expected v{} (hash {:08x}), got v{} (hash {:08x})",
            self.expected_version, self.expected_hash, self.actual_version, self.actual_hash
        )
    }
}

impl std::error::Error for LayoutMismatchError {}

/// Validate that incoming data matches the current layout.
pub fn validate_layout(version: u8, hash: u32) -> Result<(), LayoutMismatchError> {
    let current = layout_hash();
    if version != FEATURE_VERSION || hash != current {
        return Err(LayoutMismatchError {
            expected_version: FEATURE_VERSION,
            expected_hash: current,
            actual_version: version,
            actual_hash: hash,
        });
    }
    Ok(())
}

/// Index of a feature by name.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

/// Name of a feature by index.
pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}

/// Layout description for the status endpoint and the metrics record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_count_matches_layout() {
        assert_eq!(FEATURE_LAYOUT.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_group_offsets() {
        assert_eq!(FEATURE_LAYOUT[TRIGRAPH_OFFSET], "tg_the");
        assert_eq!(FEATURE_LAYOUT[DWELL_KEY_OFFSET], "key_dwell_e");
        assert_eq!(FEATURE_LAYOUT[DIGRAPH_OFFSET], "dg_th");
        assert_eq!(FEATURE_LAYOUT[DIGRAPH_VARIANCE_OFFSET], "dgv_th");
    }

    #[test]
    fn test_group_sizes() {
        assert_eq!(TRIGRAPHS.len(), 10);
        assert_eq!(DWELL_KEYS.len(), 15);
        assert_eq!(DIGRAPHS.len(), 50);
        assert_eq!(VARIANCE_DIGRAPHS.len(), 5);
    }

    #[test]
    fn test_no_duplicate_names() {
        let mut seen = std::collections::HashSet::new();
        for name in FEATURE_LAYOUT {
            assert!(seen.insert(name), "duplicate feature name: {}", name);
        }
    }

    #[test]
    fn test_layout_hash_stable() {
        assert_eq!(layout_hash(), layout_hash());
        assert_ne!(layout_hash(), 0);
    }

    #[test]
    fn test_validate_layout() {
        assert!(validate_layout(FEATURE_VERSION, layout_hash()).is_ok());
        assert!(validate_layout(FEATURE_VERSION + 1, layout_hash()).is_err());
        assert!(validate_layout(FEATURE_VERSION, layout_hash().wrapping_add(1)).is_err());
    }

    #[test]
    fn test_feature_index_lookup() {
        assert_eq!(feature_index("mean_dwell_time"), Some(0));
        assert_eq!(feature_index("error_rate_increase"), Some(FEATURE_COUNT - 1));
        assert_eq!(feature_index("no_such_feature"), None);
        assert_eq!(feature_name(IDX_TYPING_SPEED), Some("typing_speed"));
    }
}
