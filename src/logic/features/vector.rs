//! Versioned, labeled feature vector

use serde::{Deserialize, Serialize};

use super::layout::{
    self, layout_hash, LayoutMismatchError, FEATURE_COUNT, FEATURE_VERSION, IDX_MEAN_DWELL,
    IDX_MEAN_FLIGHT, IDX_TYPING_SPEED,
};

/// Label carried by vectors extracted from unlabeled input.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Fixed-schema model input: FEATURE_COUNT f32 slots in the order
/// defined by `layout::FEATURE_LAYOUT`, plus the subject label.
///
/// Every slot is finite by construction; extractors sanitize before
/// writing and [`FeatureVector::sanitize`] is the final guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub version: u8,
    pub layout_hash: u32,
    pub values: Vec<f32>,
    pub label: String,
}

impl FeatureVector {
    /// Zero-filled vector with the given label.
    pub fn zeroed(label: &str) -> Self {
        Self {
            version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            values: vec![0.0; FEATURE_COUNT],
            label: label.to_string(),
        }
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<f32> {
        layout::feature_index(name).and_then(|i| self.get(i))
    }

    pub fn set(&mut self, index: usize, value: f32) {
        if index < self.values.len() {
            self.values[index] = if value.is_finite() { value } else { 0.0 };
        }
    }

    /// Replace any non-finite slot with 0. Returns the indices replaced
    /// so callers can report the offending features by name.
    pub fn sanitize(&mut self) -> Vec<usize> {
        let mut replaced = Vec::new();
        for (i, v) in self.values.iter_mut().enumerate() {
            if !v.is_finite() {
                *v = 0.0;
                replaced.push(i);
            }
        }
        replaced
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Training validity gate: a vector is trainable only when the core
    /// timing slots are positive and every slot is finite.
    pub fn passes_validity_gate(&self) -> bool {
        self.is_finite()
            && self.values[IDX_MEAN_DWELL] > 0.0
            && self.values[IDX_MEAN_FLIGHT] > 0.0
            && self.values[IDX_TYPING_SPEED] > 0.0
    }

    pub fn validate_layout(&self) -> Result<(), LayoutMismatchError> {
        layout::validate_layout(self.version, self.layout_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_vector() {
        let v = FeatureVector::zeroed(UNKNOWN_LABEL);
        assert_eq!(v.values.len(), FEATURE_COUNT);
        assert_eq!(v.label, "Unknown");
        assert!(v.is_finite());
        assert!(!v.passes_validity_gate());
    }

    #[test]
    fn test_set_rejects_non_finite() {
        let mut v = FeatureVector::zeroed("a");
        v.set(0, f32::NAN);
        assert_eq!(v.get(0), Some(0.0));
        v.set(1, f32::INFINITY);
        assert_eq!(v.get(1), Some(0.0));
    }

    #[test]
    fn test_sanitize_reports_replaced_slots() {
        let mut v = FeatureVector::zeroed("a");
        v.values[3] = f32::NAN;
        v.values[7] = f32::NEG_INFINITY;
        assert_eq!(v.sanitize(), vec![3, 7]);
        assert!(v.is_finite());
        assert!(v.sanitize().is_empty());
    }

    #[test]
    fn test_validity_gate_needs_core_timing() {
        let mut v = FeatureVector::zeroed("a");
        v.set(IDX_MEAN_DWELL, 80.0);
        v.set(IDX_MEAN_FLIGHT, 150.0);
        assert!(!v.passes_validity_gate());
        v.set(IDX_TYPING_SPEED, 4.5);
        assert!(v.passes_validity_gate());
    }

    #[test]
    fn test_layout_validation() {
        let mut v = FeatureVector::zeroed("a");
        assert!(v.validate_layout().is_ok());
        v.version += 1;
        assert!(v.validate_layout().is_err());
    }
}
