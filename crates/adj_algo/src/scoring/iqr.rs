//! Interquartile-range detector.
//!
//! Bounds are `q1 - k*iqr` and `q3 + k*iqr` with `k = 3` by default, wider
//! than the textbook 1.5 so legitimate structural breaks survive. A value
//! strictly outside the band flags; undefined values never flag.

use adj_core::IqrBounds;

use crate::stats::{defined, quantile};

/// Quartile bounds of the defined values; `None` for an all-missing series.
pub fn iqr_bounds(values: &[Option<f64>], multiplier: f64) -> Option<IqrBounds> {
    let xs = defined(values);
    let q1 = quantile(&xs, 0.25)?;
    let q3 = quantile(&xs, 0.75)?;
    let iqr = q3 - q1;
    Some(IqrBounds { q1, q3, iqr, lower: q1 - multiplier * iqr, upper: q3 + multiplier * iqr })
}

pub fn is_outside(bounds: &IqrBounds, value: Option<f64>) -> bool {
    matches!(value, Some(v) if v < bounds.lower || v > bounds.upper)
}

/// Bounds plus per-value flags aligned with `values`.
pub fn iqr_flags(values: &[Option<f64>], multiplier: f64) -> (Option<IqrBounds>, Vec<bool>) {
    match iqr_bounds(values, multiplier) {
        Some(b) => (Some(b), values.iter().map(|v| is_outside(&b, *v)).collect()),
        None => (None, vec![false; values.len()]),
    }
}
