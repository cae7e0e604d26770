//! Sum-invariant checks shared by every apportionment step.

use adj_core::SUM_TOLERANCE;

/// One partition whose sums disagree beyond tolerance.
#[derive(Clone, Debug, PartialEq)]
pub struct SumMismatch<K> {
    pub key: K,
    pub expected: f64,
    pub actual: f64,
}

/// `|expected - actual| <= SUM_TOLERANCE`; any NaN fails.
#[inline]
pub fn within_tolerance(expected: f64, actual: f64) -> bool {
    (expected - actual).abs() <= SUM_TOLERANCE
}

/// Check `(key, expected, actual)` triples, collecting every mismatch in input order.
pub fn check_sums<K, I>(parts: I) -> Result<(), Vec<SumMismatch<K>>>
where
    I: IntoIterator<Item = (K, f64, f64)>,
{
    let mismatches: Vec<SumMismatch<K>> = parts
        .into_iter()
        .filter(|(_, e, a)| !within_tolerance(*e, *a))
        .map(|(key, expected, actual)| SumMismatch { key, expected, actual })
        .collect();
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(mismatches)
    }
}
