//! Robust statistics for noise estimation

/// Calculate median of a slice of f64 values
///
/// NaN values are ignored. For even-length data, returns the average of the two
/// middle values. Returns `None` when no valid values remain.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut valid: Vec<f64> = values.iter().filter(|v| !v.is_nan()).copied().collect();
    if valid.is_empty() {
        return None;
    }

    valid.sort_by(|a, b| a.total_cmp(b));

    let mid = valid.len() / 2;
    if valid.len() % 2 == 0 {
        Some((valid[mid - 1] + valid[mid]) / 2.0)
    } else {
        Some(valid[mid])
    }
}

/// Median absolute deviation about the median
///
/// Unscaled; divide by 0.6745 for a Gaussian standard deviation estimate.
pub fn mad(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|&v| (v - center).abs()).collect();
    median(&deviations)
}
