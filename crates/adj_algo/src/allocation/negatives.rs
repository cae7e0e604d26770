//! Negative-value elimination for one partition.
//!
//! Strategies:
//! - `Renormalize` (default): `offset = |min|` when `min < 0`; every member is
//!   shifted by `offset`, then the partition is rescaled so it sums to
//!   `group_total` again. A partition without negatives is returned unchanged.
//! - `SubtractAverage`: negatives are clamped to zero and the removed deficit is
//!   subtracted evenly from the strictly positive members.
//!
//! Post-condition for both: no negative value remains. A negative group total
//! cannot satisfy that and surfaces as `ResidualNegative`.

use adj_core::NegativeStrategy;

use super::AllocError;

#[derive(Clone, Debug, PartialEq)]
pub struct NegativeOutcome {
    pub min: f64,
    /// Shift applied to every member (`Renormalize`) or subtracted from each
    /// positive member (`SubtractAverage`).
    pub offset: f64,
    pub over_adjusted: Vec<f64>,
    pub values: Vec<f64>,
}

pub fn eliminate_negatives(
    values: &[f64],
    group_total: f64,
    strategy: NegativeStrategy,
) -> Result<NegativeOutcome, AllocError> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if values.is_empty() || min >= 0.0 {
        return Ok(NegativeOutcome {
            min: if values.is_empty() { 0.0 } else { min },
            offset: 0.0,
            over_adjusted: values.to_vec(),
            values: values.to_vec(),
        });
    }

    let outcome = match strategy {
        NegativeStrategy::Renormalize => renormalize(values, group_total, min)?,
        NegativeStrategy::SubtractAverage => subtract_average(values, min)?,
    };

    if let Some((index, value)) = outcome.values.iter().copied().enumerate().find(|(_, v)| *v < 0.0) {
        return Err(AllocError::ResidualNegative { index, value });
    }
    Ok(outcome)
}

fn renormalize(values: &[f64], group_total: f64, min: f64) -> Result<NegativeOutcome, AllocError> {
    let offset = min.abs();
    let over_adjusted: Vec<f64> = values.iter().map(|v| v + offset).collect();
    let mass: f64 = over_adjusted.iter().sum();
    if mass == 0.0 {
        return Err(AllocError::ZeroMass);
    }
    let out = over_adjusted.iter().map(|v| v / mass * group_total).collect();
    Ok(NegativeOutcome { min, offset, over_adjusted, values: out })
}

fn subtract_average(values: &[f64], min: f64) -> Result<NegativeOutcome, AllocError> {
    let deficit: f64 = values.iter().filter(|v| **v < 0.0).map(|v| -v).sum();
    let positives = values.iter().filter(|v| **v > 0.0).count();
    if positives == 0 {
        return Err(AllocError::NoPositiveMembers);
    }
    let offset = deficit / positives as f64;
    let over_adjusted: Vec<f64> = values.iter().map(|v| v.max(0.0)).collect();
    let out = over_adjusted
        .iter()
        .map(|v| if *v > 0.0 { v - offset } else { *v })
        .collect();
    Ok(NegativeOutcome { min, offset, over_adjusted, values: out })
}
