//! Non-outlier proportions and adjustment apportionment for one partition.
//!
//! Contract (one `(group, year)` partition at a time):
//! - `group_total = Σ value`; `non_outlier_total = Σ value` over rows whose year
//!   is not an outlier year for their entity. Outlier rows have no proportion.
//! - A zero `non_outlier_total` is a data error, reported by the caller with the
//!   offending partition keys.
//! - Outlier rows take their imputed value; an outlier without one keeps its
//!   own value (zero delta). `adjusted_total = group_total − Σ fixed values`
//!   is then spread over non-outlier rows by proportion.
//! - Post-condition: `Σ adjusted == group_total` up to rounding.

use adj_core::SUM_TOLERANCE;

use super::AllocError;

/// Totals and per-row proportions of one partition.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionShares {
    pub group_total: f64,
    /// `None` when every member is an outlier.
    pub non_outlier_total: Option<f64>,
    pub proportions: Vec<Option<f64>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Apportioned {
    pub adjusted_total: f64,
    pub adjusted: Vec<f64>,
}

fn check_len(expected: usize, got: usize) -> Result<(), AllocError> {
    if expected == got {
        Ok(())
    } else {
        Err(AllocError::LengthMismatch { expected, got })
    }
}

/// Compute group and non-outlier totals and each non-outlier row's share.
pub fn non_outlier_shares(values: &[f64], outlier: &[bool]) -> Result<PartitionShares, AllocError> {
    check_len(values.len(), outlier.len())?;

    let group_total: f64 = values.iter().sum();
    let mut non_outlier_total: Option<f64> = None;
    for (v, _) in values.iter().zip(outlier).filter(|(_, o)| !**o) {
        *non_outlier_total.get_or_insert(0.0) += *v;
    }

    if non_outlier_total == Some(0.0) {
        return Err(AllocError::ZeroNonOutlierTotal);
    }

    let proportions = values
        .iter()
        .zip(outlier)
        .map(|(v, o)| match (o, non_outlier_total) {
            (false, Some(t)) => Some(v / t),
            _ => None,
        })
        .collect();

    Ok(PartitionShares { group_total, non_outlier_total, proportions })
}

/// Spread the outliers' removed mass over the non-outlier rows.
pub fn apportion(
    values: &[f64],
    outlier: &[bool],
    imputed: &[Option<f64>],
    shares: &PartitionShares,
) -> Result<Apportioned, AllocError> {
    check_len(values.len(), outlier.len())?;
    check_len(values.len(), imputed.len())?;
    check_len(values.len(), shares.proportions.len())?;

    let fixed: Vec<Option<f64>> = values
        .iter()
        .zip(outlier)
        .zip(imputed)
        .map(|((v, o), imp)| o.then(|| imp.unwrap_or(*v)))
        .collect();

    let fixed_mass: f64 = fixed.iter().flatten().sum();
    let adjusted_total = shares.group_total - fixed_mass;

    // Nothing can absorb a non-zero delta when every member is an outlier.
    if shares.non_outlier_total.is_none() && adjusted_total.abs() > SUM_TOLERANCE {
        return Err(AllocError::ZeroNonOutlierTotal);
    }

    let adjusted = fixed
        .iter()
        .zip(&shares.proportions)
        .map(|(f, p)| match (f, p) {
            (Some(v), _) => *v,
            (None, Some(p)) => p * adjusted_total,
            (None, None) => 0.0,
        })
        .collect();

    Ok(Apportioned { adjusted_total, adjusted })
}
