//! Outlier-year imputation from neighbouring safe years.
//!
//! State machine per outlier row:
//! 1. Scan down from `year - 1` to the floor and up from `year + 1` to the
//!    ceiling, skipping years that are themselves flagged.
//! 2. Both sides found and the row is not a rollback row → interpolate.
//! 3. No previous safe year, or a rollback row → extrapolate backward from the
//!    next safe year through a reference year `span` years beyond it.
//! 4. Otherwise, with only a previous safe year → extrapolate forward through
//!    a reference year `span` years before it.
//! 5. Anything else is unresolved: the imputed value stays undefined.
//!
//! The reference year is read from the full series even when it is flagged.

use adj_core::{ImputeMethod, Step, YearRange, YearSet};

/// A `(year, value)` point on a series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    pub year: i32,
    pub value: f64,
}

/// Which anchors an outlier row needs; values are looked up by the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImputePlan {
    Interpolate { prev: i32, next: i32 },
    FromNext { next: i32, reference: i32 },
    FromPrevious { prev: i32, reference: i32 },
    Unresolved,
}

impl ImputePlan {
    pub fn method(&self) -> ImputeMethod {
        match self {
            ImputePlan::Interpolate { .. } => ImputeMethod::Interpolated,
            ImputePlan::FromNext { .. } => ImputeMethod::FromNext,
            ImputePlan::FromPrevious { .. } => ImputeMethod::FromPrevious,
            ImputePlan::Unresolved => ImputeMethod::Unresolved,
        }
    }

    pub fn reference_year(&self) -> Option<i32> {
        match self {
            ImputePlan::FromNext { reference, .. } | ImputePlan::FromPrevious { reference, .. } => {
                Some(*reference)
            }
            _ => None,
        }
    }

    /// Evaluate the plan at `year`; `value_at` returns the series value of a year.
    pub fn evaluate<F>(&self, year: i32, value_at: F) -> Option<f64>
    where
        F: Fn(i32) -> Option<f64>,
    {
        let anchor = |y: i32| value_at(y).map(|value| Anchor { year: y, value });
        match *self {
            ImputePlan::Interpolate { prev, next } => Some(interpolate(anchor(prev)?, anchor(next)?, year)),
            ImputePlan::FromNext { next, reference } => Some(extrapolate(anchor(next)?, anchor(reference)?, year)),
            ImputePlan::FromPrevious { prev, reference } => {
                Some(extrapolate(anchor(prev)?, anchor(reference)?, year))
            }
            ImputePlan::Unresolved => None,
        }
    }
}

/// Nearest unflagged year strictly before `year`, not below `bounds.start`.
pub fn prev_safe_year(year: i32, flagged: &YearSet, bounds: YearRange) -> Option<i32> {
    flagged.first_outside(year.checked_sub(1)?, bounds.start, Step::Down)
}

/// Nearest unflagged year strictly after `year`, not above `bounds.end`.
pub fn next_safe_year(year: i32, flagged: &YearSet, bounds: YearRange) -> Option<i32> {
    flagged.first_outside(year.checked_add(1)?, bounds.end, Step::Up)
}

/// Choose the imputation route for one outlier row.
pub fn plan_imputation(
    prev: Option<i32>,
    next: Option<i32>,
    rollback: bool,
    span: i32,
) -> ImputePlan {
    match (prev, next) {
        (Some(p), Some(n)) if !rollback => ImputePlan::Interpolate { prev: p, next: n },
        (None, Some(n)) | (Some(_), Some(n)) => ImputePlan::FromNext { next: n, reference: n + span },
        (Some(p), None) if !rollback => ImputePlan::FromPrevious { prev: p, reference: p - span },
        _ => ImputePlan::Unresolved,
    }
}

/// Straight line between `prev` and `next`, evaluated at `year`.
pub fn interpolate(prev: Anchor, next: Anchor, year: i32) -> f64 {
    let slope = (next.value - prev.value) / f64::from(next.year - prev.year);
    prev.value + slope * f64::from(year - prev.year)
}

/// Line through `anchor` and `reference`, evaluated at `year`.
pub fn extrapolate(anchor: Anchor, reference: Anchor, year: i32) -> f64 {
    let slope = (anchor.value - reference.value) / f64::from(anchor.year - reference.year);
    anchor.value + slope * f64::from(year - anchor.year)
}
