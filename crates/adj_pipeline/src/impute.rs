//! IMPUTE stage: replacement values for outlier years.
//!
//! For each row whose year is in its series' `years_to_adjust`:
//! safe years are searched inside `[start_year, end_year]`, a plan is chosen
//! (interpolate / extrapolate from next / extrapolate from previous) and
//! evaluated on the series' constrained values. A plan whose anchor or
//! reference value is missing ends up `Unresolved`; that is never an error.

use std::collections::BTreeMap;

use adj_algo::imputation::{next_safe_year, plan_imputation, prev_safe_year};
use adj_core::{ImputeMethod, Imputation, Panel, Params};
use tracing::{debug, info};

/// Row counts from one imputation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImputeCounts {
    pub outlier_rows: usize,
    pub imputed_rows: usize,
    pub unresolved_rows: usize,
}

pub fn impute_outliers(panel: &mut Panel, params: &Params) -> ImputeCounts {
    let bounds = params.year_range();
    let index = panel.series_index();
    let rows = panel.rows_mut();
    let mut counts = ImputeCounts::default();

    for idxs in index.values() {
        let by_year: BTreeMap<i32, Option<f64>> =
            idxs.iter().map(|&i| (rows[i].year, rows[i].constrained_value)).collect();
        let value_at = |y: i32| by_year.get(&y).copied().flatten();

        for &i in idxs {
            let r = &rows[i];
            if !r.is_outlier_year() {
                continue;
            }
            let prev = prev_safe_year(r.year, &r.years_to_adjust, bounds);
            let next = next_safe_year(r.year, &r.years_to_adjust, bounds);
            let plan = plan_imputation(prev, next, r.rollback_flag, params.extrapolation_span);
            let imputed_value = plan.evaluate(r.year, value_at);
            let method = if imputed_value.is_some() { plan.method() } else { ImputeMethod::Unresolved };

            debug!(series = %r.series_key(), year = r.year, method = method.as_str(), "outlier year imputed");
            counts.outlier_rows += 1;
            if imputed_value.is_some() {
                counts.imputed_rows += 1;
            } else {
                counts.unresolved_rows += 1;
            }
            rows[i].imputation = Some(Imputation {
                prev_safe_year: prev,
                next_safe_year: next,
                reference_year: plan.reference_year(),
                method,
                imputed_value,
            });
        }
    }
    info!(
        outliers = counts.outlier_rows,
        imputed = counts.imputed_rows,
        unresolved = counts.unresolved_rows,
        "imputation finished"
    );
    counts
}
