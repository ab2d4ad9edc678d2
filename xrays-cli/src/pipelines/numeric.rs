//! Shared numeric helpers for the metric pipelines.
//!
//! Everything here is pure arithmetic over slices; no numerical library is
//! involved anywhere in the engine.

/// Min-max normalize into [0, 1]. A zero range (including singleton and
/// empty inputs) normalizes to all zeros.
pub fn min_max(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = hi - lo;
    if range == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - lo) / range).collect()
}

/// Exponential half-life decay weight for a change `age_days` old.
pub fn decay_weight(age_days: f64, half_life_days: f64) -> f64 {
    (2.0_f64).powf(-age_days.max(0.0) / half_life_days)
}

/// Shannon entropy in bits of a share distribution (shares must sum to 1).
pub fn shannon_entropy(shares: &[f64]) -> f64 {
    shares
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.log2())
        .sum()
}

/// Gini coefficient of a non-negative distribution, in [0, 1).
/// Zero for empty input, a single value, or an all-zero distribution.
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
    // G = (2 * sum(i * x_i) - (n + 1) * sum(x)) / (n * sum(x)), 1-based i.
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| (i as f64 + 1.0) * x)
        .sum();
    ((2.0 * weighted - (n as f64 + 1.0) * sum) / (n as f64 * sum)).max(0.0)
}

/// Median of an unsorted sample; 0.0 for an empty one.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
