//! Percentiles with linear interpolation between closest ranks

/// `p`-th percentile (0-100) of `values`, sorting them in place.
///
/// Uses rank `p / 100 * (n - 1)` and interpolates between the two nearest
/// order statistics. Returns `None` for an empty slice. Callers filter out
/// NaN beforehand.
pub fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    percentile_sorted(values, p)
}

/// Same as [`percentile`] for already ascending `sorted`
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
