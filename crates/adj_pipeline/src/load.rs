//! LOAD stage: wide tables → long `Panel`, reference totals, analyst selection join.
//!
//! Contract:
//! - Id columns are `entity_code`, `group_code` (required) and the optional
//!   `entity_name`, `group_name`, `transaction_code`; year columns are every
//!   header shaped like a year. Other columns are ignored.
//! - One wide row per `(entity, transaction)`; duplicates are a shape error.
//! - Rows outside `[start_year, end_year]` are dropped.
//! - The selection join is checked both ways: every selection must match at
//!   least one series, and no series may match more than one selection.

use std::collections::{BTreeMap, BTreeSet};

use adj_core::{
    parse_flag, EntityCode, GroupCode, Panel, Params, SeriesKey, SeriesRow, TransactionCode, YearSet,
};
use adj_io::contract::is_nan_marker;
use adj_io::table::Table;
use tracing::{debug, info, warn};

use crate::columns as col;
use crate::PipelineError;

/// Which `SeriesRow` field the year cells feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSlot {
    Raw,
    Constrained,
}

/// Resolved id column positions of one wide table.
#[derive(Clone, Copy, Debug)]
pub struct IdColumns {
    pub entity: usize,
    pub group: usize,
    pub entity_name: Option<usize>,
    pub group_name: Option<usize>,
    pub transaction: Option<usize>,
}

impl IdColumns {
    pub fn resolve(table: &Table) -> Result<Self, PipelineError> {
        Ok(Self {
            entity: table.require_column(col::ENTITY_CODE)?,
            group: table.require_column(col::GROUP_CODE)?,
            entity_name: table.column_index(col::ENTITY_NAME),
            group_name: table.column_index(col::GROUP_NAME),
            transaction: table.column_index(col::TRANSACTION_CODE),
        })
    }
}

fn shape(msg: impl Into<String>) -> PipelineError {
    PipelineError::InputShape(msg.into())
}

fn required_cell<'t>(table: &'t Table, row: usize, c: usize) -> Result<&'t str, PipelineError> {
    table
        .cell(row, c)
        .ok_or_else(|| shape(format!("row {}: empty `{}`", row + 1, table.headers()[c])))
}

fn parse_code<T>(table: &Table, row: usize, c: usize) -> Result<T, PipelineError>
where
    T: std::str::FromStr<Err = adj_core::CoreError>,
{
    required_cell(table, row, c)?
        .parse()
        .map_err(|e| shape(format!("row {}: `{}`: {e}", row + 1, table.headers()[c])))
}

fn parse_optional_code<T>(table: &Table, row: usize, c: Option<usize>) -> Result<Option<T>, PipelineError>
where
    T: std::str::FromStr<Err = adj_core::CoreError>,
{
    match c {
        Some(c) if table.cell(row, c).is_some() => parse_code(table, row, c).map(Some),
        _ => Ok(None),
    }
}

/// Parse a numeric cell; empty or `NaN` means missing, infinities are rejected.
pub fn parse_value(table: &Table, row: usize, c: usize) -> Result<Option<f64>, PipelineError> {
    match table.cell(row, c) {
        None => Ok(None),
        Some(s) if is_nan_marker(s) => Ok(None),
        Some(s) => match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(shape(format!(
                "row {}: `{}`: {s:?} is not a finite number",
                row + 1,
                table.headers()[c]
            ))),
        },
    }
}

/// Identity of one wide row.
#[derive(Clone, Debug)]
struct WideIds {
    entity: EntityCode,
    group: GroupCode,
    transaction: Option<TransactionCode>,
    entity_name: Option<String>,
    group_name: Option<String>,
}

fn wide_ids(table: &Table, row: usize, ids: &IdColumns) -> Result<WideIds, PipelineError> {
    Ok(WideIds {
        entity: parse_code(table, row, ids.entity)?,
        group: parse_code(table, row, ids.group)?,
        transaction: parse_optional_code(table, row, ids.transaction)?,
        entity_name: ids.entity_name.and_then(|c| table.cell(row, c)).map(str::to_string),
        group_name: ids.group_name.and_then(|c| table.cell(row, c)).map(str::to_string),
    })
}

/// Reshape a wide table long: one `SeriesRow` per `(entity, transaction, year)`.
pub fn melt(table: &Table, slot: ValueSlot) -> Result<Vec<SeriesRow>, PipelineError> {
    let ids = IdColumns::resolve(table)?;
    let years = table.year_columns();
    if years.is_empty() {
        return Err(shape("table has no year columns"));
    }

    let mut seen: BTreeSet<SeriesKey> = BTreeSet::new();
    let mut out = Vec::with_capacity(table.len() * years.len());
    for r in 0..table.len() {
        let w = wide_ids(table, r, &ids)?;
        let key = SeriesKey { entity: w.entity.clone(), transaction: w.transaction.clone() };
        if !seen.insert(key.clone()) {
            return Err(shape(format!("duplicate series {key} at row {}", r + 1)));
        }
        for &(c, year) in &years {
            let mut row = SeriesRow::new(w.entity.clone(), w.group.clone(), year);
            row.transaction = w.transaction.clone();
            row.entity_name = w.entity_name.clone();
            row.group_name = w.group_name.clone();
            let v = parse_value(table, r, c)?;
            match slot {
                ValueSlot::Raw => row.raw_value = v,
                ValueSlot::Constrained => row.constrained_value = v,
            }
            out.push(row);
        }
    }
    Ok(out)
}

/// Melt, filter to the configured years and sort ascending by series.
pub fn panel_from_wide(table: &Table, slot: ValueSlot, params: &Params) -> Result<Panel, PipelineError> {
    let mut panel = Panel::new(melt(table, slot)?);
    let dropped = panel.retain_years(params.year_range());
    panel.sort_by_series(true);
    info!(rows = panel.len(), series = panel.series_count(), dropped, "reshaped long");
    Ok(panel)
}

// ---------------------------- Reference totals ----------------------------

/// Group-level reference totals keyed by `(group, transaction, year)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceTotals(BTreeMap<(GroupCode, Option<TransactionCode>, i32), f64>);

impl ReferenceTotals {
    /// Exact transaction match first, then a transaction-agnostic total.
    pub fn get(&self, group: &GroupCode, transaction: Option<&TransactionCode>, year: i32) -> Option<f64> {
        let exact = self.0.get(&(group.clone(), transaction.cloned(), year)).copied();
        exact.or_else(|| self.0.get(&(group.clone(), None, year)).copied())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read a wide reference table (`group_code`, optional `transaction_code`, years).
pub fn reference_totals(table: &Table) -> Result<ReferenceTotals, PipelineError> {
    let group = table.require_column(col::GROUP_CODE)?;
    let transaction = table.column_index(col::TRANSACTION_CODE);
    let years = table.year_columns();
    if years.is_empty() {
        return Err(shape("reference totals have no year columns"));
    }

    let mut out = BTreeMap::new();
    for r in 0..table.len() {
        let g: GroupCode = parse_code(table, r, group)?;
        let t: Option<TransactionCode> = parse_optional_code(table, r, transaction)?;
        for &(c, year) in &years {
            if let Some(v) = parse_value(table, r, c)? {
                if out.insert((g.clone(), t.clone(), year), v).is_some() {
                    return Err(shape(format!("duplicate reference total for {g} {year}")));
                }
            }
        }
    }
    debug!(totals = out.len(), "reference totals read");
    Ok(ReferenceTotals(out))
}

// ---------------------------- Selection ----------------------------

/// One analyst decision to adjust a series.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub row: usize,
    pub entity: EntityCode,
    pub group: GroupCode,
    /// `None` applies the selection to every transaction of the entity.
    pub transaction: Option<TransactionCode>,
    pub years: YearSet,
}

impl Selection {
    fn matches(&self, entity: &EntityCode, group: &GroupCode, transaction: Option<&TransactionCode>) -> bool {
        &self.entity == entity
            && &self.group == group
            && self.transaction.as_ref().map_or(true, |t| Some(t) == transaction)
    }
}

/// Canonicalize `adjust` and `years_to_adjust`, keep `adjust == true` rows.
pub fn read_selection(table: &Table, params: &Params) -> Result<Vec<Selection>, PipelineError> {
    let entity = table.require_column(col::ENTITY_CODE)?;
    let group = table.require_column(col::GROUP_CODE)?;
    let transaction = table.column_index(col::TRANSACTION_CODE);
    let adjust = table.require_column(col::ADJUST)?;
    let years = table.require_column(col::YEARS_TO_ADJUST)?;
    let range = params.year_range();

    let mut out = Vec::new();
    let mut empty: Vec<String> = Vec::new();
    for r in 0..table.len() {
        let flag = parse_flag(table.cell(r, adjust).unwrap_or(""))
            .map_err(|e| shape(format!("selection row {}: {e}", r + 1)))?;
        if !flag {
            continue;
        }
        let e: EntityCode = parse_code(table, r, entity)?;
        let mut ys = YearSet::parse(table.cell(r, years))
            .map_err(|err| shape(format!("selection row {} ({e}): {err}", r + 1)))?;
        let dropped = ys.retain_within(range);
        if !dropped.is_empty() {
            warn!(entity = %e, ?dropped, "years_to_adjust outside {range} dropped");
        }
        if ys.is_empty() {
            empty.push(e.to_string());
            continue;
        }
        out.push(Selection {
            row: r + 1,
            entity: e,
            group: parse_code(table, r, group)?,
            transaction: parse_optional_code(table, r, transaction)?,
            years: ys,
        });
    }

    if !empty.is_empty() {
        return Err(shape(format!(
            "adjust selected without years_to_adjust in {range} for entities: [{}]",
            empty.join(", ")
        )));
    }
    info!(selected = out.len(), rows = table.len(), "selection canonicalized");
    Ok(out)
}

/// Attach selections to a wide table's series, checking join cardinality.
///
/// Returns `years_to_adjust` per series of `table`.
pub fn join_selection(
    name: &str,
    table: &Table,
    selections: &[Selection],
) -> Result<BTreeMap<SeriesKey, YearSet>, PipelineError> {
    let ids = IdColumns::resolve(table)?;
    let mut matched = vec![false; selections.len()];
    let mut out = BTreeMap::new();
    let mut joined_rows = 0usize;

    for r in 0..table.len() {
        let w = wide_ids(table, r, &ids)?;
        let hits: Vec<usize> = selections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.matches(&w.entity, &w.group, w.transaction.as_ref()))
            .map(|(i, _)| i)
            .collect();
        joined_rows += hits.len().max(1);
        for &i in &hits {
            matched[i] = true;
        }
        if let Some(&i) = hits.first() {
            out.insert(
                SeriesKey { entity: w.entity, transaction: w.transaction },
                selections[i].years.clone(),
            );
        }
    }

    let unmatched: Vec<String> = selections
        .iter()
        .zip(&matched)
        .filter(|(_, m)| !**m)
        .map(|(s, _)| format!("{} in {}", s.entity, s.group))
        .collect();
    if !unmatched.is_empty() {
        return Err(shape(format!(
            "{name}: {} of {} selections matched; unmatched: [{}]",
            selections.len() - unmatched.len(),
            selections.len(),
            unmatched.join(", ")
        )));
    }
    if joined_rows != table.len() {
        return Err(shape(format!(
            "{name}: joined row count {joined_rows} differs from {} table rows (duplicate selections)",
            table.len()
        )));
    }
    debug!(table = name, series = out.len(), "selection joined");
    Ok(out)
}

type MergeKey = (SeriesKey, GroupCode, i32);

fn merge_key(r: &SeriesRow) -> MergeKey {
    (r.series_key(), r.group.clone(), r.year)
}

/// Build the adjust-phase panel: selection joined onto the constrained and
/// unconstrained tables, merged long, filtered to the configured years.
pub fn adjust_panel(
    selection: &Table,
    constrained: &Table,
    unconstrained: &Table,
    params: &Params,
) -> Result<Panel, PipelineError> {
    let selections = read_selection(selection, params)?;
    let con_years = join_selection("constrained", constrained, &selections)?;
    let uncon_years = join_selection("unconstrained", unconstrained, &selections)?;
    if con_years != uncon_years {
        return Err(shape("selection joins differently onto constrained and unconstrained tables"));
    }

    let mut raw: BTreeMap<MergeKey, Option<f64>> = melt(unconstrained, ValueSlot::Raw)?
        .into_iter()
        .map(|r| (merge_key(&r), r.raw_value))
        .collect();

    let range = params.year_range();
    let mut rows = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for mut row in melt(constrained, ValueSlot::Constrained)? {
        let key = merge_key(&row);
        let raw_value = raw
            .remove(&key)
            .ok_or_else(|| shape(format!("{} {} has no unconstrained row", row.series_key(), row.year)))?;
        if !range.contains(row.year) {
            continue;
        }
        if row.constrained_value.is_none() {
            missing.push(format!("{} {}", row.series_key(), row.year));
        }
        row.raw_value = raw_value;
        if let Some(ys) = con_years.get(&row.series_key()) {
            row.years_to_adjust = ys.clone();
        }
        rows.push(row);
    }
    if let Some(((k, _, y), _)) = raw.into_iter().next() {
        return Err(shape(format!("{k} {y} has no constrained row")));
    }
    if !missing.is_empty() {
        return Err(shape(format!("missing constrained values: [{}]", missing.join(", "))));
    }

    let mut panel = Panel::new(rows);
    panel.sort_by_series(true);
    info!(
        rows = panel.len(),
        series = panel.series_count(),
        selected = con_years.len(),
        "adjust panel assembled"
    );
    Ok(panel)
}
