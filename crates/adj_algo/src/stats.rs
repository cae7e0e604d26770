//! Descriptive statistics with missing-value omission.
//!
//! Conventions:
//! - `None` and non-finite values are dropped before any computation.
//! - Standard deviation is the sample estimate (divide by `n - 1`).
//! - Quantiles use linear interpolation between order statistics
//!   (`h = (n - 1) * p`), the usual spreadsheet/dataframe default.

/// Finite values of `xs`, in input order.
pub fn defined(xs: &[Option<f64>]) -> Vec<f64> {
    xs.iter().filter_map(|v| v.filter(|x| x.is_finite())).collect()
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Bessel-corrected standard deviation; `None` for fewer than two values.
pub fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let ss: f64 = xs.iter().map(|x| (x - m) * (x - m)).sum();
    Some((ss / (xs.len() - 1) as f64).sqrt())
}

/// Interpolated quantile of `xs` at `p ∈ [0, 1]`. Sorts a copy.
pub fn quantile(xs: &[f64], p: f64) -> Option<f64> {
    if xs.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let frac = h - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn defined_drops_missing_and_nan() {
        assert_eq!(defined(&[Some(1.0), None, Some(f64::NAN), Some(2.0)]), vec![1.0, 2.0]);
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        let s = sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(close(s, (32.0f64 / 7.0).sqrt()));
        assert_eq!(sample_std(&[1.0]), None);
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert!(close(quantile(&xs, 0.25).unwrap(), 1.75));
        assert!(close(quantile(&xs, 0.75).unwrap(), 3.25));
        assert!(close(quantile(&[4.0, 1.0, 3.0, 2.0], 0.5).unwrap(), 2.5));
        assert!(close(quantile(&[7.0], 0.25).unwrap(), 7.0));
        assert_eq!(quantile(&[], 0.5), None);
    }
}
