//! CONSTRAIN stage (preprocess): group non-outlier mean and scaling to reference totals.
//!
//! Per row:
//! - `group_mean` = mean raw value of the partition over series without a master flag;
//!   undefined when every series is flagged.
//! - `rate = reference_total / (raw_value + group_mean)`;
//!   `constrained_value = raw_value × rate`, `constrained_mean = group_mean × rate`.
//!   A missing reference total or a zero denominator leaves both undefined.

use adj_algo::stats::mean;
use adj_core::{Constraint, Panel};
use tracing::{debug, warn};

use crate::load::ReferenceTotals;

/// Set `constraint.group_mean` on every row.
pub fn group_means(panel: &mut Panel) {
    let index = panel.partition_index();
    let rows = panel.rows_mut();
    for idxs in index.values() {
        let clean: Vec<f64> = idxs
            .iter()
            .filter(|&&i| !rows[i].master.any)
            .filter_map(|&i| rows[i].raw_value)
            .filter(|v| v.is_finite())
            .collect();
        let m = mean(&clean);
        for &i in idxs {
            rows[i].constraint.get_or_insert_with(Constraint::default).group_mean = m;
        }
    }
    debug!(partitions = index.len(), "group non-outlier means computed");
}

/// Scale raw values and group means to the reference totals.
pub fn constrain_to_reference(panel: &mut Panel, totals: &ReferenceTotals) {
    let mut unmatched = 0usize;
    for r in panel.rows_mut() {
        let reference_total = totals.get(&r.group, r.transaction.as_ref(), r.year);
        unmatched += usize::from(reference_total.is_none());
        let c = r.constraint.get_or_insert_with(Constraint::default);
        c.reference_total = reference_total;
        c.rate = match (reference_total, r.raw_value, c.group_mean) {
            (Some(t), Some(v), Some(m)) if v + m != 0.0 => Some(t / (v + m)),
            _ => None,
        };
        r.constrained_value = c.rate.zip(r.raw_value).map(|(rate, v)| v * rate);
        c.constrained_mean = c.rate.zip(c.group_mean).map(|(rate, m)| m * rate);
    }
    if unmatched > 0 {
        warn!(rows = unmatched, "rows without a reference total stay unconstrained");
    }
}
