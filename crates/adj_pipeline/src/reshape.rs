//! Long and wide output tables built from a `Panel`.
//!
//! Contract:
//! - Long tables: one row per `(entity, transaction, year)` in panel order, every diagnostic column.
//! - Wide tables: one row per series (and measure), year columns ascending,
//!   rows sorted by `(entity, transaction)`.
//! - `transaction_code` and the name columns appear only when some row carries them.
//! - Numbers use `f64`'s shortest round-trip `Display`; undefined values are empty cells.

use std::collections::BTreeMap;

use adj_core::{Metric, Panel, SeriesKey, SeriesRow};
use adj_io::table::Table;

use crate::columns;

// ---- Cell formatting ----

fn num(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn year(v: Option<i32>) -> String {
    v.map(|y| y.to_string()).unwrap_or_default()
}

fn flag(b: bool) -> String {
    if b { "true" } else { "false" }.to_string()
}

// ---- Identifier layout ----

#[derive(Clone, Copy)]
struct IdLayout {
    names: bool,
    transaction: bool,
}

impl IdLayout {
    fn of(panel: &Panel) -> Self {
        let rows = panel.rows();
        Self {
            names: rows.iter().any(|r| r.entity_name.is_some() || r.group_name.is_some()),
            transaction: rows.iter().any(|r| r.transaction.is_some()),
        }
    }

    fn headers(self) -> Vec<String> {
        let mut h = vec![columns::ENTITY_CODE];
        if self.names {
            h.push(columns::ENTITY_NAME);
        }
        h.push(columns::GROUP_CODE);
        if self.names {
            h.push(columns::GROUP_NAME);
        }
        if self.transaction {
            h.push(columns::TRANSACTION_CODE);
        }
        h.into_iter().map(String::from).collect()
    }

    fn cells(self, r: &SeriesRow) -> Vec<String> {
        let mut c = vec![r.entity.to_string()];
        if self.names {
            c.push(r.entity_name.clone().unwrap_or_default());
        }
        c.push(r.group.to_string());
        if self.names {
            c.push(r.group_name.clone().unwrap_or_default());
        }
        if self.transaction {
            c.push(r.transaction.as_ref().map(ToString::to_string).unwrap_or_default());
        }
        c
    }
}

fn with_headers(ids: IdLayout, extra: &[&str]) -> Vec<String> {
    let mut h = ids.headers();
    h.extend(extra.iter().map(|s| s.to_string()));
    h
}

fn build(headers: Vec<String>, rows: Vec<Vec<String>>) -> Table {
    // Every row is built from the same header list.
    let mut t = Table::new(headers);
    for row in rows {
        let _ = t.push_row(row);
    }
    t
}

// ---- Wide pivot ----

/// One wide line contributed by a row: ordinal within the series, extra cells, value.
type WideCell = (u8, Vec<String>, Option<f64>);

fn pivot_wide<F>(panel: &Panel, ids: IdLayout, extra: &[&str], cells: F) -> Table
where
    F: Fn(&SeriesRow) -> Vec<WideCell>,
{
    let years: Vec<i32> = panel.years().into_iter().collect();
    let mut lines: BTreeMap<(SeriesKey, u8), (Vec<String>, BTreeMap<i32, String>)> = BTreeMap::new();
    for r in panel.rows() {
        for (ordinal, extras, value) in cells(r) {
            let line = lines.entry((r.series_key(), ordinal)).or_insert_with(|| {
                let mut head = ids.cells(r);
                head.extend(extras);
                (head, BTreeMap::new())
            });
            line.1.insert(r.year, num(value));
        }
    }

    let mut headers = with_headers(ids, extra);
    headers.extend(years.iter().map(ToString::to_string));
    let rows = lines
        .into_values()
        .map(|(mut head, by_year)| {
            head.extend(years.iter().map(|y| by_year.get(y).cloned().unwrap_or_default()));
            head
        })
        .collect();
    build(headers, rows)
}

fn concat(mut a: Table, b: Table) -> Table {
    for row in b.rows() {
        let _ = a.push_row(row.clone());
    }
    a
}

// ---- Preprocess ----

const MEASURE_UNCONSTRAINED: &str = "unconstrained";
const MEASURE_CONSTRAINED: &str = "constrained";
const MEAN_FLAG: &str = "MEAN";

/// Long scores table: ratios, every detector column and the master flags.
pub fn preprocess_interim(panel: &Panel) -> Table {
    let ids = IdLayout::of(panel);
    let mut extra: Vec<String> = vec![
        columns::YEAR.into(),
        "raw_value".into(),
        "forward_ratio".into(),
        "backward_ratio".into(),
        "rollback_flag".into(),
    ];
    for m in Metric::ALL {
        let p = m.prefix();
        for suffix in ["zscore", "z_flag", "q1", "q3", "iqr", "lower_bound", "upper_bound", "iqr_flag"] {
            extra.push(format!("{p}_{suffix}"));
        }
    }
    extra.extend([columns::MASTER_Z_FLAG, columns::MASTER_IQR_FLAG, columns::MASTER_FLAG].map(String::from));

    let mut headers = ids.headers();
    headers.extend(extra);

    let rows = panel
        .rows()
        .iter()
        .map(|r| {
            let mut c = ids.cells(r);
            c.extend([
                r.year.to_string(),
                num(r.raw_value),
                num(r.forward_ratio),
                num(r.backward_ratio),
                flag(r.rollback_flag),
            ]);
            for m in Metric::ALL {
                let s = r.scores.get(m);
                let b = s.bounds;
                c.extend([
                    num(s.zscore),
                    flag(s.z_flag),
                    num(b.map(|b| b.q1)),
                    num(b.map(|b| b.q3)),
                    num(b.map(|b| b.iqr)),
                    num(b.map(|b| b.lower)),
                    num(b.map(|b| b.upper)),
                    flag(s.iqr_flag),
                ]);
            }
            c.extend([flag(r.master.z), flag(r.master.iqr), flag(r.master.any)]);
            c
        })
        .collect();
    build(headers, rows)
}

/// Wide review table: the outlier variant (raw and constrained values per series)
/// followed by the mean variant (group mean and constrained mean, `master_flag = MEAN`).
pub fn preprocess_wide(panel: &Panel) -> Table {
    let ids = IdLayout::of(panel);
    let extra = [columns::MEASURE, columns::MASTER_Z_FLAG, columns::MASTER_IQR_FLAG, columns::MASTER_FLAG];

    let outlier = pivot_wide(panel, ids, &extra, |r| {
        let flags = |measure: &str| {
            vec![measure.to_string(), flag(r.master.z), flag(r.master.iqr), flag(r.master.any)]
        };
        vec![
            (0, flags(MEASURE_UNCONSTRAINED), r.raw_value),
            (1, flags(MEASURE_CONSTRAINED), r.constrained_value),
        ]
    });
    let mean = pivot_wide(panel, ids, &extra, |r| {
        let c = r.constraint.unwrap_or_default();
        let flags = |measure: &str| {
            vec![measure.to_string(), flag(r.master.z), flag(r.master.iqr), MEAN_FLAG.to_string()]
        };
        vec![
            (0, flags(MEASURE_UNCONSTRAINED), c.group_mean),
            (1, flags(MEASURE_CONSTRAINED), c.constrained_mean),
        ]
    });
    concat(outlier, mean)
}

// ---- Adjust ----

const ADJUST_INTERIM_COLUMNS: [&str; 25] = [
    "year",
    "raw_value",
    "constrained_value",
    "forward_ratio",
    "backward_ratio",
    "rollback_flag",
    "years_to_adjust",
    "is_outlier",
    "prev_safe_year",
    "next_safe_year",
    "reference_year",
    "impute_method",
    "imputed_value",
    "group_total",
    "non_outlier_total",
    "proportion",
    "adjusted_total",
    "adjusted_value",
    "min_adjusted",
    "negative_offset",
    "over_adjusted",
    "readjusted_value",
    "rollback_value",
    "final_value",
    "delta",
];

/// Long QA table of every imputation and apportionment intermediate.
pub fn adjust_interim(panel: &Panel) -> Table {
    let ids = IdLayout::of(panel);
    let headers = with_headers(ids, &ADJUST_INTERIM_COLUMNS);
    let rows = panel
        .rows()
        .iter()
        .map(|r| {
            let i = r.imputation;
            let a = r.apportionment;
            let n = a.and_then(|a| a.negative);
            let final_value = a.map(|a| a.final_value);
            let delta = final_value.zip(r.constrained_value).map(|(f, c)| f - c);
            let mut c = ids.cells(r);
            c.extend([
                r.year.to_string(),
                num(r.raw_value),
                num(r.constrained_value),
                num(r.forward_ratio),
                num(r.backward_ratio),
                flag(r.rollback_flag),
                r.years_to_adjust.to_string(),
                flag(r.is_outlier_year()),
                year(i.and_then(|i| i.prev_safe_year)),
                year(i.and_then(|i| i.next_safe_year)),
                year(i.and_then(|i| i.reference_year)),
                i.map(|i| i.method.as_str().to_string()).unwrap_or_default(),
                num(i.and_then(|i| i.imputed_value)),
                num(a.map(|a| a.group_total)),
                num(a.and_then(|a| a.non_outlier_total)),
                num(a.and_then(|a| a.proportion)),
                num(a.map(|a| a.adjusted_total)),
                num(a.map(|a| a.adjusted_value)),
                num(n.map(|n| n.min_adjusted)),
                num(n.map(|n| n.offset)),
                num(n.map(|n| n.over_adjusted)),
                num(n.map(|n| n.readjusted)),
                num(a.and_then(|a| a.rollback_value)),
                num(final_value),
                num(delta),
            ]);
            c
        })
        .collect();
    build(headers, rows)
}

/// Final wide table: one row per series, year cells carry the final value.
pub fn adjust_wide(panel: &Panel) -> Table {
    pivot_wide(panel, IdLayout::of(panel), &[], |r| vec![(0, Vec::new(), r.apportionment.map(|a| a.final_value))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use adj_core::{Apportionment, Constraint};

    fn row(e: &str, year: i32, raw: f64) -> SeriesRow {
        let mut r = SeriesRow::new(e.parse().unwrap(), "G1".parse().unwrap(), year);
        r.raw_value = Some(raw);
        r
    }

    fn body(t: &Table) -> Vec<Vec<&str>> {
        t.rows().iter().map(|r| r.iter().map(String::as_str).collect()).collect()
    }

    #[test]
    fn preprocess_wide_has_outlier_then_mean_variant() {
        let mut rows = vec![row("E2", 2011, 4.0), row("E1", 2010, 1.0), row("E1", 2011, 2.0), row("E2", 2010, 3.0)];
        for r in &mut rows {
            r.constrained_value = r.raw_value.map(|v| v * 2.0);
            r.constraint = Some(Constraint {
                group_mean: Some(2.5),
                reference_total: None,
                rate: None,
                constrained_mean: Some(5.0),
            });
        }
        for r in rows.iter_mut().filter(|r| r.entity.as_str() == "E2") {
            r.master.iqr = true;
            r.master.any = true;
        }
        let t = preprocess_wide(&Panel::new(rows));

        assert_eq!(
            t.headers(),
            ["entity_code", "group_code", "measure", "master_z_flag", "master_iqr_flag", "master_flag", "2010", "2011"]
        );
        let b = body(&t);
        assert_eq!(b.len(), 8);
        assert_eq!(b[0], vec!["E1", "G1", "unconstrained", "false", "false", "false", "1", "2"]);
        assert_eq!(b[1], vec!["E1", "G1", "constrained", "false", "false", "false", "2", "4"]);
        assert_eq!(b[2][2..6], ["unconstrained", "false", "true", "true"]);
        assert_eq!(b[4], vec!["E1", "G1", "unconstrained", "false", "false", "MEAN", "2.5", "2.5"]);
        assert_eq!(b[7][5..], ["MEAN", "5", "5"]);
    }

    #[test]
    fn interim_columns_follow_metric_order() {
        let t = preprocess_interim(&Panel::new(vec![row("E1", 2010, 1.0)]));
        let h = t.headers();
        assert_eq!(h[2..5], ["year", "raw_value", "forward_ratio"]);
        assert!(h.iter().position(|c| c == "bkwd_zscore") < h.iter().position(|c| c == "raw_zscore"));
        assert_eq!(h.last().map(String::as_str), Some("master_flag"));
        assert_eq!(t.rows()[0].len(), h.len());
    }

    #[test]
    fn adjust_wide_carries_final_values() {
        let mut rows = vec![row("E1", 2010, 1.0), row("E1", 2011, 1.0)];
        rows[0].transaction = Some("D623".parse().unwrap());
        rows[1].transaction = Some("D623".parse().unwrap());
        rows[0].apportionment = Some(Apportionment {
            group_total: 1.0,
            non_outlier_total: Some(1.0),
            proportion: Some(1.0),
            adjusted_total: 1.0,
            adjusted_value: 1.5,
            negative: None,
            rollback_value: None,
            final_value: 1.5,
        });
        let t = adjust_wide(&Panel::new(rows));
        assert_eq!(t.headers(), ["entity_code", "group_code", "transaction_code", "2010", "2011"]);
        assert_eq!(body(&t), vec![vec!["E1", "G1", "D623", "1.5", ""]]);
    }

    #[test]
    fn adjust_interim_rows_match_headers() {
        let t = adjust_interim(&Panel::new(vec![row("E1", 2010, 1.0)]));
        assert_eq!(t.headers().len(), 2 + ADJUST_INTERIM_COLUMNS.len());
        assert_eq!(t.rows()[0].len(), t.headers().len());
        assert_eq!(t.cell(0, t.column_index("is_outlier").unwrap()), Some("false"));
        assert_eq!(t.cell(0, t.column_index("final_value").unwrap()), None);
    }
}
