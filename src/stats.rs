use std::cmp::Ordering;

/// Percentile of a finite sample, using the Apache Commons Math default
/// ("legacy") estimation: for a sorted sample of `n` values, the p-th
/// percentile sits at position `p * (n + 1) / 100`. Positions below 1 clamp
/// to the minimum, positions at or beyond `n` clamp to the maximum, and
/// fractional positions interpolate linearly between neighbors.
///
/// Returns `None` for an empty sample or a `p` outside [0.0, 100.0].
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let n = sorted.len();
    let pos = p * (n as f64 + 1.0) / 100.0;
    if pos < 1.0 {
        return Some(sorted[0]);
    }
    if pos >= n as f64 {
        return Some(sorted[n - 1]);
    }
    let k = pos.floor() as usize;
    let d = pos - k as f64;
    Some(sorted[k - 1] + d * (sorted[k] - sorted[k - 1]))
}

/// Whether a sample is large enough for the p-th percentile to be
/// statistically meaningful: both tails must hold at least one value.
pub fn is_data_sufficient(sample_count: usize, p: f64) -> bool {
    let n = sample_count as f64;
    n * p / 100.0 >= 1.0 && n * (1.0 - p / 100.0) >= 1.0
}
