//! Descriptive statistics over timing samples
//!
//! All aggregations used by feature extraction live here so the
//! conventions (sample variance, ceiling-rank percentiles) are applied
//! consistently across every feature group.

/// Arithmetic mean. Empty input yields 0.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Sample variance (n-1 divisor). Fewer than 2 values yields 0.
pub fn variance(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f32 = values.iter().map(|v| (v - m) * (v - m)).sum();
    sum_sq / (values.len() - 1) as f32
}

/// Sample standard deviation.
pub fn std_dev(values: &[f32]) -> f32 {
    variance(values).sqrt()
}

/// Percentile by ceiling rank: idx = ceil(p/100 * n) - 1, clamped to
/// [0, n-1], over the ascending sort. Empty input yields 0.
pub fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let rank = (p / 100.0 * n as f32).ceil() as isize - 1;
    let idx = rank.clamp(0, n as isize - 1) as usize;
    sorted[idx]
}

/// Coefficient of variation: stddev / mean, 0 when the mean is 0.
pub fn consistency(values: &[f32]) -> f32 {
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(values) / m
}
