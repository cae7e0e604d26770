//! Period-over-period ratios.
//!
//! Contract:
//! - Input is one series already ordered in the walk direction (ascending
//!   years for `Forward`, descending for `Backward`).
//! - `ratio[t] = (v[t] - v[t-1]) / v[t-1] + 1`, i.e. `v[t] / v[t-1]` computed the
//!   percent-change way so that duplicated values give exactly `1.0`.
//! - The first element has no predecessor and is undefined.
//! - A missing neighbour or a zero predecessor gives an undefined ratio.

/// Walk direction of a ratio series.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn ascending(self) -> bool {
        matches!(self, Direction::Forward)
    }
}

/// Ratios of consecutive values; same length as `values`.
pub fn ratios(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for (i, v) in values.iter().enumerate() {
        let r = if i == 0 {
            None
        } else {
            match (prev, *v) {
                (Some(p), Some(c)) if p != 0.0 => {
                    let r = (c - p) / p + 1.0;
                    r.is_finite().then_some(r)
                }
                _ => None,
            }
        };
        out.push(r);
        prev = *v;
    }
    out
}
