//! SCORE stage: z-score and IQR detectors per series, then the master flag.
//!
//! Contract:
//! - Each detector runs on raw values, forward ratios and backward ratios,
//!   within one series at a time.
//! - `master_flags` counts, per series and detector family, the metrics with
//!   at least one flagged year; the family flag fires when that count reaches
//!   `threshold`. The result is broadcast to every row of the series.

use adj_algo::scoring::{flag_high, iqr_flags, zscores};
use adj_core::{MasterFlags, Metric, Panel, Params, SeriesRow};
use tracing::debug;

fn metric_value(r: &SeriesRow, m: Metric) -> Option<f64> {
    match m {
        Metric::Raw => r.raw_value,
        Metric::Forward => r.forward_ratio,
        Metric::Backward => r.backward_ratio,
    }
}

/// Fill `scores` on every row.
pub fn score_panel(panel: &mut Panel, params: &Params) {
    let index = panel.series_index();
    let rows = panel.rows_mut();
    for idxs in index.values() {
        for m in Metric::ALL {
            let values: Vec<Option<f64>> = idxs.iter().map(|&i| metric_value(&rows[i], m)).collect();
            let z = zscores(&values);
            let (bounds, iqr) = iqr_flags(&values, params.iqr_multiplier);
            for (k, &i) in idxs.iter().enumerate() {
                let s = rows[i].scores.get_mut(m);
                s.zscore = z[k];
                s.z_flag = flag_high(z[k], params.zscore_threshold);
                s.bounds = bounds;
                s.iqr_flag = iqr[k];
            }
        }
    }
    debug!(series = index.len(), "scores computed");
}

/// Aggregate per-metric flags into series-level master flags. Returns the
/// number of flagged series.
pub fn master_flags(panel: &mut Panel, threshold: u32) -> usize {
    let index = panel.series_index();
    let rows = panel.rows_mut();
    let mut flagged = 0;
    for idxs in index.values() {
        let count = |pick: fn(&adj_core::MetricScores) -> bool| -> u32 {
            let hits = Metric::ALL
                .iter()
                .filter(|&&m| idxs.iter().any(|&i| pick(rows[i].scores.get(m))))
                .count();
            u32::try_from(hits).unwrap_or(u32::MAX)
        };
        let z = count(|s| s.z_flag) >= threshold;
        let iqr = count(|s| s.iqr_flag) >= threshold;
        let master = MasterFlags { z, iqr, any: z || iqr };
        for &i in idxs {
            rows[i].master = master;
        }
        flagged += usize::from(master.any);
    }
    flagged
}
