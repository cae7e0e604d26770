//! Z-score detector.
//!
//! - Standardize within one series using the sample standard deviation,
//!   omitting undefined values from the statistics.
//! - Fewer than two defined values, or zero variance, leaves every score
//!   undefined; undefined scores never flag.
//! - The flag is one-sided: only scores strictly above the threshold fire.

use crate::stats::{defined, mean, sample_std};

/// Scores aligned with `values`; `None` where the value or the statistics are undefined.
pub fn zscores(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let xs = defined(values);
    let (Some(m), Some(sd)) = (mean(&xs), sample_std(&xs)) else {
        return vec![None; values.len()];
    };
    if sd == 0.0 {
        return vec![None; values.len()];
    }
    values
        .iter()
        .map(|v| v.filter(|x| x.is_finite()).map(|x| (x - m) / sd))
        .collect()
}

#[inline]
pub fn flag_high(score: Option<f64>, threshold: f64) -> bool {
    matches!(score, Some(z) if z > threshold)
}
