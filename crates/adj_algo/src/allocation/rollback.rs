//! Rollback-year shares.
//!
//! Rollback years carry values copied from the first observed year. Each
//! member's share of its partition at the last rollback year is computed once
//! and applied to the group total of every rollback-flagged year.

use super::AllocError;

/// `v_i / Σ v` at the anchor year.
pub fn anchor_shares(anchor_values: &[f64]) -> Result<Vec<f64>, AllocError> {
    let mass: f64 = anchor_values.iter().sum();
    if mass == 0.0 {
        return Err(AllocError::ZeroMass);
    }
    Ok(anchor_values.iter().map(|v| v / mass).collect())
}
