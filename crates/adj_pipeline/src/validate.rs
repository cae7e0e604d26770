//! Structural checks on a wide table before release.
//! Deterministic: issues are sorted by (code, location, message).
//!
//! Errors:
//! - `entity_unique`: an `(entity, transaction)` pair appears on more than one row
//! - `no_missing`: empty cells, counted per column
//! - `year_columns_complete`: no year column, or a gap between the first and last year
//!
//! Warnings:
//! - `empty_table`: header only

use std::collections::BTreeMap;
use std::fmt;

use adj_io::table::Table;

use crate::columns;

/// Issue severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

/// Where the issue occurred.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Location {
    Table,
    Column(String),
    Series(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Table => write!(f, "table"),
            Location::Column(c) => write!(f, "column `{c}`"),
            Location::Series(s) => write!(f, "series {s}"),
        }
    }
}

/// One validation finding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub where_: Location,
}

impl ValidationIssue {
    fn error(code: &'static str, where_: Location, message: String) -> Self {
        Self { severity: Severity::Error, code, message, where_ }
    }
}

/// Deterministic report: pass = (no Error); ordering of issues is stable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub pass: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn from_issues(mut issues: Vec<ValidationIssue>) -> Self {
        sort_issues_stably(&mut issues);
        Self { pass: !issues.iter().any(|i| i.severity == Severity::Error), issues }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }
}

/// Top-level entry point for the release checks.
pub fn validate_release_table(table: &Table) -> ValidationReport {
    let mut issues: Vec<ValidationIssue> = Vec::new();

    if table.is_empty() {
        issues.push(ValidationIssue {
            severity: Severity::Warning,
            code: "empty_table",
            message: "table has no data rows".into(),
            where_: Location::Table,
        });
    }
    issues.extend(check_entity_unique(table));
    issues.extend(check_no_missing(table));
    issues.extend(check_year_columns(table));

    ValidationReport::from_issues(issues)
}

// ------------------------------------------------------------------------------------------------
// Checks
// ------------------------------------------------------------------------------------------------

fn check_entity_unique(table: &Table) -> Vec<ValidationIssue> {
    let Some(e) = table.column_index(columns::ENTITY_CODE) else {
        return vec![ValidationIssue::error(
            "entity_unique",
            Location::Column(columns::ENTITY_CODE.into()),
            format!("missing required column `{}`", columns::ENTITY_CODE),
        )];
    };
    let t = table.column_index(columns::TRANSACTION_CODE);

    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for row in 0..table.len() {
        let entity = table.cell(row, e).unwrap_or_default();
        let key = match t.and_then(|t| table.cell(row, t)) {
            Some(tx) => format!("{entity}/{tx}"),
            None => entity.to_string(),
        };
        *seen.entry(key).or_insert(0) += 1;
    }

    seen.into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(key, n)| {
            ValidationIssue::error("entity_unique", Location::Series(key.clone()), format!("{key} appears on {n} rows"))
        })
        .collect()
}

fn check_no_missing(table: &Table) -> Vec<ValidationIssue> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for (c, name) in table.headers().iter().enumerate() {
        let n = (0..table.len()).filter(|&r| table.cell(r, c).is_none()).count();
        if n > 0 {
            counts.push((name.clone(), n));
        }
    }
    if counts.is_empty() {
        return Vec::new();
    }
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    let detail: Vec<String> = counts.iter().map(|(c, n)| format!("{c}: {n}")).collect();
    vec![ValidationIssue::error(
        "no_missing",
        Location::Table,
        format!("{total} missing value(s) ({})", detail.join(", ")),
    )]
}

fn check_year_columns(table: &Table) -> Vec<ValidationIssue> {
    let mut years: Vec<i32> = table.year_columns().into_iter().map(|(_, y)| y).collect();
    years.sort_unstable();
    let (Some(&first), Some(&last)) = (years.first(), years.last()) else {
        return vec![ValidationIssue::error(
            "year_columns_complete",
            Location::Table,
            "no year columns found".into(),
        )];
    };
    let gaps: Vec<String> = (first..=last)
        .filter(|y| years.binary_search(y).is_err())
        .map(|y| y.to_string())
        .collect();
    if gaps.is_empty() {
        return Vec::new();
    }
    vec![ValidationIssue::error(
        "year_columns_complete",
        Location::Table,
        format!("year columns {first}..{last} are missing: {}", gaps.join(", ")),
    )]
}

fn sort_issues_stably(issues: &mut [ValidationIssue]) {
    issues.sort_by(|a, b| {
        (a.code, &a.where_, &a.message).cmp(&(b.code, &b.where_, &b.message))
    });
}
