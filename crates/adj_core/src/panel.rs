//! Long-format row model.
//!
//! One [`SeriesRow`] per (entity, transaction, year). Stages enrich rows in
//! place: ratios and flags first, then scores, then imputation and
//! apportionment traces. Nothing written by an earlier stage is overwritten
//! by a later one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::tokens::{EntityCode, GroupCode, TransactionCode};
use crate::years::{YearRange, YearSet};

// ----------------------------------- Keys -----------------------------------

/// Identity of one time series.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeriesKey {
    pub entity: EntityCode,
    pub transaction: Option<TransactionCode>,
}

/// Sum-invariant partition: `(group, transaction, year)`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartitionKey {
    pub group: GroupCode,
    pub transaction: Option<TransactionCode>,
    pub year: i32,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.transaction {
            Some(t) => write!(f, "{}/{}", self.entity, t),
            None => write!(f, "{}", self.entity),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.transaction {
            Some(t) => write!(f, "({}, {}, {})", self.group, t, self.year),
            None => write!(f, "({}, {})", self.group, self.year),
        }
    }
}

// ---------------------------------- Metrics ----------------------------------

/// Series scored by the outlier detectors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Metric {
    Raw,
    Forward,
    Backward,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Backward, Metric::Forward, Metric::Raw];

    /// Column-name prefix (`raw_zscore`, `frwd_iqr`, `z_bkwd_flag`, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            Metric::Raw => "raw",
            Metric::Forward => "frwd",
            Metric::Backward => "bkwd",
        }
    }
}

/// Quartile bounds of one series; constant across the series' rows.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Detector output for one metric on one row.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricScores {
    pub zscore: Option<f64>,
    pub z_flag: bool,
    pub bounds: Option<IqrBounds>,
    pub iqr_flag: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Scores {
    pub raw: MetricScores,
    pub forward: MetricScores,
    pub backward: MetricScores,
}

impl Scores {
    pub fn get(&self, m: Metric) -> &MetricScores {
        match m {
            Metric::Raw => &self.raw,
            Metric::Forward => &self.forward,
            Metric::Backward => &self.backward,
        }
    }

    pub fn get_mut(&mut self, m: Metric) -> &mut MetricScores {
        match m {
            Metric::Raw => &mut self.raw,
            Metric::Forward => &mut self.forward,
            Metric::Backward => &mut self.backward,
        }
    }
}

/// Entity-level decisions, broadcast to every row of the series.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MasterFlags {
    pub z: bool,
    pub iqr: bool,
    pub any: bool,
}

// -------------------------------- Adjustment --------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ImputeMethod {
    Interpolated,
    /// Extrapolated backward from the next safe year.
    FromNext,
    /// Extrapolated forward from the previous safe year.
    FromPrevious,
    Unresolved,
}

impl ImputeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ImputeMethod::Interpolated => "interpolated",
            ImputeMethod::FromNext => "extrapolated_from_next",
            ImputeMethod::FromPrevious => "extrapolated_from_previous",
            ImputeMethod::Unresolved => "unresolved",
        }
    }
}

/// Imputation trace for an outlier-year row.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Imputation {
    pub prev_safe_year: Option<i32>,
    pub next_safe_year: Option<i32>,
    pub reference_year: Option<i32>,
    pub method: ImputeMethod,
    pub imputed_value: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NegativeTrace {
    pub min_adjusted: f64,
    pub offset: f64,
    pub over_adjusted: f64,
    pub readjusted: f64,
}

/// Apportionment trace. `final_value` is what the wide output carries.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Apportionment {
    pub group_total: f64,
    pub non_outlier_total: Option<f64>,
    pub proportion: Option<f64>,
    pub adjusted_total: f64,
    pub adjusted_value: f64,
    pub negative: Option<NegativeTrace>,
    pub rollback_value: Option<f64>,
    pub final_value: f64,
}

impl Apportionment {
    /// Value after negative elimination (or the adjusted value when skipped).
    pub fn post_negative_value(&self) -> f64 {
        self.negative.map(|n| n.readjusted).unwrap_or(self.adjusted_value)
    }
}

/// Group-mean constraining trace from the preprocess phase.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Constraint {
    pub group_mean: Option<f64>,
    pub reference_total: Option<f64>,
    pub rate: Option<f64>,
    pub constrained_mean: Option<f64>,
}

// ----------------------------------- Rows -----------------------------------

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeriesRow {
    pub entity: EntityCode,
    pub entity_name: Option<String>,
    pub group: GroupCode,
    pub group_name: Option<String>,
    pub transaction: Option<TransactionCode>,
    pub year: i32,
    pub raw_value: Option<f64>,
    pub constrained_value: Option<f64>,
    pub years_to_adjust: YearSet,
    pub forward_ratio: Option<f64>,
    pub backward_ratio: Option<f64>,
    pub rollback_flag: bool,
    pub scores: Scores,
    pub master: MasterFlags,
    pub constraint: Option<Constraint>,
    pub imputation: Option<Imputation>,
    pub apportionment: Option<Apportionment>,
}

impl SeriesRow {
    pub fn new(entity: EntityCode, group: GroupCode, year: i32) -> Self {
        Self {
            entity,
            entity_name: None,
            group,
            group_name: None,
            transaction: None,
            year,
            raw_value: None,
            constrained_value: None,
            years_to_adjust: YearSet::new(),
            forward_ratio: None,
            backward_ratio: None,
            rollback_flag: false,
            scores: Scores::default(),
            master: MasterFlags::default(),
            constraint: None,
            imputation: None,
            apportionment: None,
        }
    }

    pub fn series_key(&self) -> SeriesKey {
        SeriesKey { entity: self.entity.clone(), transaction: self.transaction.clone() }
    }

    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey { group: self.group.clone(), transaction: self.transaction.clone(), year: self.year }
    }

    /// `year ∈ years_to_adjust`.
    #[inline]
    pub fn is_outlier_year(&self) -> bool {
        self.years_to_adjust.contains(self.year)
    }
}

// ----------------------------------- Panel -----------------------------------

/// Owned long-format table passed stage to stage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Panel {
    rows: Vec<SeriesRow>,
}

impl Panel {
    pub fn new(rows: Vec<SeriesRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [SeriesRow] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<SeriesRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sort by `(entity, transaction, year)`; `ascending = false` reverses the year walk
    /// as well as the key order.
    pub fn sort_by_series(&mut self, ascending: bool) {
        self.rows.sort_by(|a, b| {
            let ord = a
                .entity
                .cmp(&b.entity)
                .then_with(|| a.transaction.cmp(&b.transaction))
                .then_with(|| a.year.cmp(&b.year));
            if ascending { ord } else { ord.reverse() }
        });
    }

    /// Row indices per series, each list in current row order.
    pub fn series_index(&self) -> BTreeMap<SeriesKey, Vec<usize>> {
        let mut out: BTreeMap<SeriesKey, Vec<usize>> = BTreeMap::new();
        for (i, r) in self.rows.iter().enumerate() {
            out.entry(r.series_key()).or_default().push(i);
        }
        out
    }

    /// Row indices per `(group, transaction, year)` partition.
    pub fn partition_index(&self) -> BTreeMap<PartitionKey, Vec<usize>> {
        let mut out: BTreeMap<PartitionKey, Vec<usize>> = BTreeMap::new();
        for (i, r) in self.rows.iter().enumerate() {
            out.entry(r.partition_key()).or_default().push(i);
        }
        out
    }

    pub fn years(&self) -> BTreeSet<i32> {
        self.rows.iter().map(|r| r.year).collect()
    }

    pub fn series_count(&self) -> usize {
        self.rows.iter().map(|r| r.series_key()).collect::<BTreeSet<_>>().len()
    }

    /// Keep rows whose year lies in `range`; returns how many were removed.
    pub fn retain_years(&mut self, range: YearRange) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| range.contains(r.year));
        before - self.rows.len()
    }
}

impl FromIterator<SeriesRow> for Panel {
    fn from_iter<I: IntoIterator<Item = SeriesRow>>(iter: I) -> Self {
        Self { rows: iter.into_iter().collect() }
    }
}
