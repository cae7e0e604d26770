//! RELEASE phase: checks, then suppression of disclosive cells.
//!
//! Contract:
//! - Any error in the validation report aborts with `PipelineError::Validate`.
//! - A rule matches rows whose `transaction_code` equals `rule.transaction` and whose
//!   `group_code` starts with any of `rule.group_prefixes`; matching year cells become `X`.
//! - `rule.years` limits the replaced columns; absent means every year column.
//! - Output rows are sorted by `(entity, transaction)`.

use adj_core::GroupCode;
use adj_io::config::{ReleaseSettings, SuppressionRule};
use adj_io::table::Table;
use tracing::{info, warn};

use crate::build_run_record::StageCounts;
use crate::validate::{validate_release_table, ValidationReport};
use crate::{columns, PipelineError};

pub const SUPPRESSED: &str = "X";

#[derive(Debug, Clone)]
pub struct ReleaseOutput {
    pub table: Table,
    pub counts: StageCounts,
    pub report: ValidationReport,
}

pub fn prepare_release(table: &Table, settings: &ReleaseSettings) -> Result<ReleaseOutput, PipelineError> {
    let report = validate_release_table(table);
    for w in report.warnings() {
        warn!(code = w.code, location = %w.where_, "{}", w.message);
    }
    if !report.pass {
        return Err(PipelineError::Validate(report));
    }

    let mut out = sorted_by_series(table)?;
    let suppressed = apply_suppression(&mut out, &settings.suppression)?;
    info!(rows = out.len(), cells = suppressed, rules = settings.suppression.len(), "release table prepared");

    let counts = StageCounts {
        rows: out.len(),
        series: out.len(),
        suppressed_cells: suppressed,
        ..StageCounts::default()
    };
    Ok(ReleaseOutput { table: out, counts, report })
}

fn sorted_by_series(table: &Table) -> Result<Table, PipelineError> {
    let e = table.require_column(columns::ENTITY_CODE)?;
    let t = table.column_index(columns::TRANSACTION_CODE);
    let mut rows = table.rows().to_vec();
    rows.sort_by(|a, b| {
        let key = |r: &Vec<String>| (r[e].clone(), t.map(|t| r[t].clone()));
        key(a).cmp(&key(b))
    });
    Ok(Table::from_rows(table.headers().to_vec(), rows)?)
}

/// Replace matching year cells with the suppression marker. Returns the number of cells replaced.
pub fn apply_suppression(table: &mut Table, rules: &[SuppressionRule]) -> Result<usize, PipelineError> {
    if rules.is_empty() {
        return Ok(0);
    }
    let g = table.require_column(columns::GROUP_CODE)?;
    let t = table.require_column(columns::TRANSACTION_CODE)?;
    let year_columns = table.year_columns();

    let mut replaced = 0usize;
    for rule in rules {
        let targets: Vec<usize> = year_columns
            .iter()
            .filter(|(_, y)| rule.years.as_ref().map_or(true, |ys| ys.contains(y)))
            .map(|(c, _)| *c)
            .collect();
        let rows: Vec<usize> = (0..table.len())
            .filter(|&r| table.cell(r, t) == Some(rule.transaction.as_str()))
            .filter(|&r| {
                table
                    .cell(r, g)
                    .and_then(|s| s.parse::<GroupCode>().ok())
                    .is_some_and(|code| code.starts_with_any(&rule.group_prefixes))
            })
            .collect();
        for &r in &rows {
            for &c in &targets {
                table.set_cell(r, c, SUPPRESSED.to_string());
                replaced += 1;
            }
        }
        info!(transaction = %rule.transaction, rows = rows.len(), "suppression rule applied");
    }
    Ok(replaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADJUSTED: &str = "entity_code,group_code,transaction_code,2010,2011\n\
        E2,TLC4,D623,5,6\n\
        E1,TLC3,D623,1,2\n\
        E1,TLC3,D624,3,4\n\
        E3,TLD1,D623,7,8\n";

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes()).unwrap()
    }

    fn rule(years: Option<Vec<i32>>) -> SuppressionRule {
        SuppressionRule { transaction: "D623".into(), group_prefixes: vec!["TLC".into()], years }
    }

    #[test]
    fn suppresses_matching_rows_and_sorts() {
        let settings = ReleaseSettings { suppression: vec![rule(None)] };
        let out = prepare_release(&table(ADJUSTED), &settings).unwrap();
        let rows: Vec<Vec<&str>> =
            out.table.rows().iter().map(|r| r.iter().map(String::as_str).collect()).collect();
        assert_eq!(rows[0], vec!["E1", "TLC3", "D623", "X", "X"]);
        assert_eq!(rows[1], vec!["E1", "TLC3", "D624", "3", "4"]);
        assert_eq!(rows[2], vec!["E2", "TLC4", "D623", "X", "X"]);
        assert_eq!(rows[3], vec!["E3", "TLD1", "D623", "7", "8"]);
        assert_eq!(out.counts.suppressed_cells, 4);
    }

    #[test]
    fn years_limit_the_suppressed_columns() {
        let mut t = table(ADJUSTED);
        assert_eq!(apply_suppression(&mut t, &[rule(Some(vec![2011]))]).unwrap(), 2);
        assert_eq!(t.cell(0, 3), Some("5"));
        assert_eq!(t.cell(0, 4), Some("X"));
    }

    #[test]
    fn failed_checks_abort() {
        let dup = "entity_code,group_code,2010\nE1,G1,1\nE1,G1,2\n";
        match prepare_release(&table(dup), &ReleaseSettings::default()) {
            Err(PipelineError::Validate(r)) => assert_eq!(r.errors().next().unwrap().code, "entity_unique"),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
