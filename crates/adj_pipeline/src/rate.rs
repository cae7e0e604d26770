//! RATE stage: period-over-period ratios and rollback-year flags.
//!
//! `rate_of_change` re-sorts the panel in the requested direction before
//! walking each series; callers re-sort if they need a particular order.

use adj_algo::{ratios, Direction};
use adj_core::{Panel, YearRange};
use tracing::debug;

/// Fill `forward_ratio` (ascending walk) or `backward_ratio` (descending walk) from `raw_value`.
pub fn rate_of_change(panel: &mut Panel, direction: Direction) {
    panel.sort_by_series(direction.ascending());
    let index = panel.series_index();
    let rows = panel.rows_mut();
    for idxs in index.values() {
        let values: Vec<Option<f64>> = idxs.iter().map(|&i| rows[i].raw_value).collect();
        for (&i, r) in idxs.iter().zip(ratios(&values)) {
            match direction {
                Direction::Forward => rows[i].forward_ratio = r,
                Direction::Backward => rows[i].backward_ratio = r,
            }
        }
    }
}

/// Flag rows whose ratio in either direction is exactly `1.0` inside `window`.
///
/// `None` disables detection (every flag cleared). Returns the flagged row count.
pub fn flag_rollback(panel: &mut Panel, window: Option<YearRange>) -> usize {
    let mut flagged = 0;
    for r in panel.rows_mut() {
        r.rollback_flag = match window {
            Some(w) if w.contains(r.year) => {
                r.forward_ratio == Some(1.0) || r.backward_ratio == Some(1.0)
            }
            _ => false,
        };
        flagged += usize::from(r.rollback_flag);
    }
    debug!(flagged, ?window, "rollback years flagged");
    flagged
}
