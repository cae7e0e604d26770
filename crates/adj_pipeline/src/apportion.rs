//! APPORTION stage: sum-preserving redistribution per `(group, transaction, year)`.
//!
//! Sub-steps, each followed by a sum check against the partition's
//! pre-adjustment total:
//! a/b. non-outlier proportions and apportionment of the imputed delta;
//! c.   negative elimination (skipped when `accept_negatives`);
//! d.   rollback reapportionment at the latest rollback-flagged year.
//!
//! Zero non-outlier totals are collected over every partition before failing,
//! so the error names all offending keys at once.

use std::collections::BTreeMap;

use adj_algo::allocation::{anchor_shares, apportion, eliminate_negatives, non_outlier_shares};
use adj_algo::{check_sums, AllocError};
use adj_core::{Apportionment, NegativeStrategy, NegativeTrace, Panel, Params, PartitionKey, SeriesKey};
use tracing::{info, warn};

use crate::{InvariantViolation, PipelineError};

pub const ZERO_NON_OUTLIER_TOTAL: &str = "Non-outlier total check failed: found zero non_outlier_total";
pub const ZERO_ROLLBACK_ANCHOR: &str = "Rollback anchor check failed: found zero anchor total";

const STAGE_APPORTION: &str = "apportionment";
const STAGE_NEGATIVES: &str = "negative elimination";
const STAGE_ROLLBACK: &str = "rollback reapportionment";

/// Run sub-steps a–d. Returns the number of partitions that had negatives removed.
pub fn run_apportionment(panel: &mut Panel, params: &Params) -> Result<usize, PipelineError> {
    apportion_partitions(panel)?;
    let negatives = if params.accept_negatives {
        info!("negative values accepted; elimination skipped");
        0
    } else {
        eliminate_partition_negatives(panel, params.negative_strategy)?
    };
    reapportion_rollback(panel)?;
    Ok(negatives)
}

fn sum_check<I>(stage: &'static str, parts: I) -> Result<(), PipelineError>
where
    I: IntoIterator<Item = (PartitionKey, f64, f64)>,
{
    check_sums(parts).map_err(|mismatches| {
        for m in &mismatches {
            warn!(stage, partition = %m.key, expected = m.expected, actual = m.actual, "sum mismatch");
        }
        InvariantViolation::SumMismatch { stage, keys: mismatches.into_iter().map(|m| m.key).collect() }
            .into()
    })
}

fn internal(stage: &'static str, key: &PartitionKey, e: AllocError) -> PipelineError {
    warn!(stage, partition = %key, error = %e, "allocation failed");
    InvariantViolation::Allocation { stage, key: key.clone(), reason: e.to_string() }.into()
}

/// a/b: proportions over non-outlier rows, then spread `group_total − Σ imputed`.
pub fn apportion_partitions(panel: &mut Panel) -> Result<(), PipelineError> {
    let index = panel.partition_index();
    let rows = panel.rows_mut();
    let mut degenerate: Vec<PartitionKey> = Vec::new();
    let mut sums = Vec::with_capacity(index.len());

    for (key, idxs) in &index {
        // Constrained values are required on load.
        let values: Vec<f64> = idxs.iter().map(|&i| rows[i].constrained_value.unwrap_or(0.0)).collect();
        let outlier: Vec<bool> = idxs.iter().map(|&i| rows[i].is_outlier_year()).collect();
        let imputed: Vec<Option<f64>> =
            idxs.iter().map(|&i| rows[i].imputation.and_then(|m| m.imputed_value)).collect();

        let shares = match non_outlier_shares(&values, &outlier) {
            Ok(s) => s,
            Err(AllocError::ZeroNonOutlierTotal) => {
                degenerate.push(key.clone());
                continue;
            }
            Err(e) => return Err(internal(STAGE_APPORTION, key, e)),
        };
        let out = match apportion(&values, &outlier, &imputed, &shares) {
            Ok(o) => o,
            Err(AllocError::ZeroNonOutlierTotal) => {
                degenerate.push(key.clone());
                continue;
            }
            Err(e) => return Err(internal(STAGE_APPORTION, key, e)),
        };

        for (k, &i) in idxs.iter().enumerate() {
            let adjusted_value = out.adjusted[k];
            rows[i].apportionment = Some(Apportionment {
                group_total: shares.group_total,
                non_outlier_total: shares.non_outlier_total,
                proportion: shares.proportions[k],
                adjusted_total: out.adjusted_total,
                adjusted_value,
                negative: None,
                rollback_value: None,
                final_value: adjusted_value,
            });
        }
        sums.push((key.clone(), shares.group_total, out.adjusted.iter().sum()));
    }

    if !degenerate.is_empty() {
        return Err(PipelineError::Degenerate { reason: ZERO_NON_OUTLIER_TOTAL.to_string(), groups: degenerate });
    }
    sum_check(STAGE_APPORTION, sums)?;
    info!(partitions = index.len(), "adjustments apportioned");
    Ok(())
}

fn final_values(panel: &Panel, idxs: &[usize]) -> Vec<f64> {
    idxs.iter()
        .map(|&i| panel.rows()[i].apportionment.map(|a| a.final_value).unwrap_or(0.0))
        .collect()
}

fn group_total(panel: &Panel, idxs: &[usize]) -> f64 {
    idxs.first()
        .and_then(|&i| panel.rows()[i].apportionment)
        .map(|a| a.group_total)
        .unwrap_or(0.0)
}

/// c: remove negative adjusted values partition by partition.
/// Returns the number of partitions that held a negative value.
pub fn eliminate_partition_negatives(panel: &mut Panel, strategy: NegativeStrategy) -> Result<usize, PipelineError> {
    let index = panel.partition_index();
    let mut residual: Vec<PartitionKey> = Vec::new();
    let mut sums = Vec::with_capacity(index.len());
    let mut touched = 0usize;

    for (key, idxs) in &index {
        let values = final_values(panel, idxs);
        let total = group_total(panel, idxs);
        let out = match eliminate_negatives(&values, total, strategy) {
            Ok(o) => o,
            Err(AllocError::ResidualNegative { .. } | AllocError::ZeroMass | AllocError::NoPositiveMembers) => {
                residual.push(key.clone());
                continue;
            }
            Err(e) => return Err(internal(STAGE_NEGATIVES, key, e)),
        };
        if out.min < 0.0 {
            touched += 1;
        }

        let rows = panel.rows_mut();
        for (k, &i) in idxs.iter().enumerate() {
            if let Some(a) = rows[i].apportionment.as_mut() {
                a.negative = Some(NegativeTrace {
                    min_adjusted: out.min,
                    offset: out.offset,
                    over_adjusted: out.over_adjusted[k],
                    readjusted: out.values[k],
                });
                a.final_value = out.values[k];
            }
        }
        sums.push((key.clone(), total, out.values.iter().sum()));
    }

    if !residual.is_empty() {
        return Err(InvariantViolation::NegativeValues { stage: STAGE_NEGATIVES, keys: residual }.into());
    }
    sum_check(STAGE_NEGATIVES, sums)?;
    info!(partitions = touched, strategy = strategy.as_token(), "negative values eliminated");
    Ok(touched)
}

/// d: apply each series' share at the latest rollback year to the group total
/// of every rollback-flagged row. Returns the number of rows reapportioned.
pub fn reapportion_rollback(panel: &mut Panel) -> Result<usize, PipelineError> {
    let Some(anchor_year) = panel.rows().iter().filter(|r| r.rollback_flag).map(|r| r.year).max() else {
        return Ok(0);
    };
    let index = panel.partition_index();

    // Shares per (group, transaction) at the anchor year, keyed by series.
    let mut shares: BTreeMap<SeriesKey, f64> = BTreeMap::new();
    let mut degenerate: Vec<PartitionKey> = Vec::new();
    for (key, idxs) in index.iter().filter(|(k, _)| k.year == anchor_year) {
        let values: Vec<f64> = idxs
            .iter()
            .map(|&i| panel.rows()[i].apportionment.map(|a| a.post_negative_value()).unwrap_or(0.0))
            .collect();
        match anchor_shares(&values) {
            Ok(s) => {
                for (&i, share) in idxs.iter().zip(s) {
                    shares.insert(panel.rows()[i].series_key(), share);
                }
            }
            Err(_) => degenerate.push(key.clone()),
        }
    }
    if !degenerate.is_empty() {
        return Err(PipelineError::Degenerate {
            reason: format!("{ZERO_ROLLBACK_ANCHOR} at {anchor_year}"),
            groups: degenerate,
        });
    }

    let mut moved = 0usize;
    for r in panel.rows_mut().iter_mut().filter(|r| r.rollback_flag) {
        let Some(share) = shares.get(&r.series_key()).copied() else {
            warn!(series = %r.series_key(), year = r.year, "rollback row has no anchor share; left as is");
            continue;
        };
        if let Some(a) = r.apportionment.as_mut() {
            let v = a.group_total * share;
            a.rollback_value = Some(v);
            a.final_value = v;
            moved += 1;
        }
    }

    let sums: Vec<(PartitionKey, f64, f64)> = index
        .iter()
        .map(|(key, idxs)| (key.clone(), group_total(panel, idxs), final_values(panel, idxs).iter().sum()))
        .collect();
    sum_check(STAGE_ROLLBACK, sums)?;
    info!(anchor_year, rows = moved, "rollback years reapportioned");
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adj_core::{ImputeMethod, Imputation, SeriesRow, YearSet};


    fn row(e: &str, year: i32, value: f64) -> SeriesRow {
        let mut r = SeriesRow::new(e.parse().unwrap(), "E01".parse().unwrap(), year);
        r.constrained_value = Some(value);
        r
    }

    fn outlier(mut r: SeriesRow, imputed: Option<f64>) -> SeriesRow {
        r.years_to_adjust = [r.year].into_iter().collect::<YearSet>();
        r.imputation = Some(Imputation {
            prev_safe_year: None,
            next_safe_year: None,
            reference_year: None,
            method: if imputed.is_some() { ImputeMethod::Interpolated } else { ImputeMethod::Unresolved },
            imputed_value: imputed,
        });
        r
    }

    fn finals(p: &Panel) -> Vec<f64> {
        p.rows().iter().map(|r| r.apportionment.unwrap().final_value).collect()
    }

    #[test]
    fn end_to_end_partition() {
        let mut p = Panel::new(vec![row("E1", 2002, 3.0), row("E2", 2002, 9.0), outlier(row("E3", 2002, 8.0), Some(5.0))]);
        apportion_partitions(&mut p).unwrap();
        let a = p.rows()[0].apportionment.unwrap();
        assert_eq!(a.adjusted_total, 15.0);
        assert_eq!(a.non_outlier_total, Some(12.0));
        assert_eq!(a.proportion, Some(0.25));
        assert_eq!(finals(&p), vec![3.75, 11.25, 5.0]);
        assert_eq!(p.rows()[2].apportionment.unwrap().proportion, None);
    }

    #[test]
    fn unresolved_outlier_keeps_its_value() {
        let mut p = Panel::new(vec![row("E1", 2002, 3.0), outlier(row("E2", 2002, 8.0), None)]);
        apportion_partitions(&mut p).unwrap();
        assert_eq!(finals(&p), vec![3.0, 8.0]);
    }

    #[test]
    fn zero_non_outlier_totals_are_all_reported() {
        let mut p = Panel::new(vec![
            row("E1", 2003, 0.0),
            outlier(row("E2", 2003, 8.0), Some(5.0)),
            row("E1", 2002, 0.0),
            outlier(row("E2", 2002, 8.0), Some(5.0)),
            row("E1", 2004, 1.0),
            outlier(row("E2", 2004, 8.0), Some(5.0)),
        ]);
        match apportion_partitions(&mut p) {
            Err(PipelineError::Degenerate { groups, .. }) => {
                let years: Vec<i32> = groups.iter().map(|k| k.year).collect();
                assert_eq!(years, vec![2002, 2003]);
            }
            other => panic!("expected degenerate error, got {other:?}"),
        }
    }

    fn traced(mut r: SeriesRow, group_total: f64, adjusted_value: f64) -> SeriesRow {
        r.apportionment = Some(Apportionment {
            group_total,
            non_outlier_total: None,
            proportion: None,
            adjusted_total: 0.0,
            adjusted_value,
            negative: None,
            rollback_value: None,
            final_value: adjusted_value,
        });
        r
    }

    fn with_adjusted(values: &[f64]) -> Panel {
        let total: f64 = values.iter().sum();
        values
            .iter()
            .enumerate()
            .map(|(k, v)| traced(row(&format!("E{k}"), 2010, *v), total, *v))
            .collect()
    }

    #[test]
    fn negatives_are_renormalized() {
        let mut p = with_adjusted(&[-0.5, 5.5, -1.0, 6.0]);
        assert_eq!(eliminate_partition_negatives(&mut p, NegativeStrategy::Renormalize).unwrap(), 1);
        let f = finals(&p);
        assert!(f.iter().all(|v| *v >= 0.0));
        assert!((f.iter().sum::<f64>() - 10.0).abs() < 1e-9);
        assert!((f[1] - 6.5 / 14.0 * 10.0).abs() < 1e-12);
        let t = p.rows()[0].apportionment.unwrap().negative.unwrap();
        assert_eq!((t.min_adjusted, t.offset, t.over_adjusted), (-1.0, 1.0, 0.5));
    }

    #[test]
    fn negative_group_total_is_fatal() {
        let mut p = with_adjusted(&[-5.0, 1.0, 2.0]);
        match eliminate_partition_negatives(&mut p, NegativeStrategy::Renormalize) {
            Err(PipelineError::Invariant(InvariantViolation::NegativeValues { keys, .. })) => {
                assert_eq!(keys.len(), 1)
            }
            other => panic!("expected negative value violation, got {other:?}"),
        }
    }

    #[test]
    fn partitions_without_negatives_pass_through() {
        let mut p = with_adjusted(&[1.0, 2.0]);
        assert_eq!(eliminate_partition_negatives(&mut p, NegativeStrategy::SubtractAverage).unwrap(), 0);
        assert_eq!(finals(&p), vec![1.0, 2.0]);
    }

    #[test]
    fn rollback_years_follow_the_anchor_share() {
        // (entity, year, constrained, post-negative value, rollback)
        let data = [
            ("E1", 2014, 5.0, 6.0, true),
            ("E2", 2014, 15.0, 14.0, true),
            ("E1", 2015, 15.0, 14.0, true),
            ("E2", 2015, 15.0, 16.0, true),
            ("E1", 2016, 16.0, 17.0, true),
            ("E2", 2016, 24.0, 23.0, true),
            ("E1", 2017, 15.0, 16.0, false),
            ("E2", 2017, 35.0, 34.0, false),
        ];
        let mut p: Panel = data
            .iter()
            .map(|&(e, y, con, adj, rb)| {
                let mut r = traced(row(e, y, con), 0.0, adj);
                r.rollback_flag = rb;
                r
            })
            .collect();
        let totals = [20.0, 20.0, 30.0, 30.0, 40.0, 40.0, 50.0, 50.0];
        for (r, t) in p.rows_mut().iter_mut().zip(totals) {
            if let Some(a) = r.apportionment.as_mut() {
                a.group_total = t;
            }
        }

        assert_eq!(reapportion_rollback(&mut p).unwrap(), 6);
        let expected = [8.5, 11.5, 12.75, 17.25, 17.0, 23.0, 16.0, 34.0];
        for (got, want) in finals(&p).iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert_eq!(p.rows()[6].apportionment.unwrap().rollback_value, None);
    }

    #[test]
    fn no_rollback_rows_is_a_no_op() {
        let mut p = with_adjusted(&[1.0, 2.0]);
        assert_eq!(reapportion_rollback(&mut p).unwrap(), 0);
        assert_eq!(finals(&p), vec![1.0, 2.0]);
    }

    #[test]
    fn allocator_errors_keep_their_cause() {
        let key = PartitionKey { group: "E01".parse().unwrap(), transaction: None, year: 2002 };
        let e = internal(STAGE_NEGATIVES, &key, AllocError::LengthMismatch { expected: 3, got: 2 });
        match e {
            PipelineError::Invariant(InvariantViolation::Allocation { stage, key: k, reason }) => {
                assert_eq!(stage, STAGE_NEGATIVES);
                assert_eq!(k, key);
                assert_eq!(reason, AllocError::LengthMismatch { expected: 3, got: 2 }.to_string());
            }
            other => panic!("expected allocation violation, got {other:?}"),
        }
    }
}
