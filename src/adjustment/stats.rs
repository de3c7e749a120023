//! Order statistics and distribution helpers for the adjustment engine

use statrs::distribution::{ContinuousCDF, StudentsT};

use super::AdjustmentError;

/// Linearly interpolated percentile, `p` in [0, 100].
///
/// Matches the interpolation the adjustment model was calibrated with:
/// rank `p/100 * (len - 1)` with linear interpolation between neighbors.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Lower and upper IQR fence for one coordinate axis.
pub fn iqr_bounds(values: &[f64], multiplier: f64) -> (f64, f64) {
    let q1 = percentile(values, 25.0);
    let q3 = percentile(values, 75.0);
    let iqr = q3 - q1;
    (q1 - multiplier * iqr, q3 + multiplier * iqr)
}

/// Two-tailed Student-t critical value at significance `alpha` and `dof`
/// degrees of freedom.
pub fn student_t_critical(dof: usize, alpha: f64) -> Result<f64, AdjustmentError> {
    let dist = StudentsT::new(0.0, 1.0, dof as f64)
        .map_err(|_| AdjustmentError::CriticalValueUnavailable { dof })?;
    Ok(dist.inverse_cdf(1.0 - alpha / 2.0))
}
