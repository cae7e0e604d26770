//! Column contracts: the declared column set of a tabular file.
//!
//! A contract maps each engine column name to the header used in the file and
//! the type every cell must parse as:
//!
//! ```json
//! { "entity_code": { "old_name": "lsoa_code", "dtype": "str" },
//!   "2010":        { "dtype": "float" } }
//! ```
//!
//! Contract:
//! - On read: rename `old_name` → key, require every key, check each non-empty cell.
//! - On write: require every key, rename key → `old_name`.
//! - Columns outside the contract pass through untouched.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{validate_value, SchemaKind};
use crate::table::Table;
use crate::{IoError, IoResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Str,
    Int,
    Float,
    Bool,
}

impl DType {
    /// Whether a non-empty cell parses as this type.
    pub fn accepts(self, cell: &str) -> bool {
        match self {
            DType::Str => true,
            DType::Int => cell.parse::<i64>().is_ok() || integral_float(cell),
            DType::Float => is_nan_marker(cell) || cell.parse::<f64>().map_or(false, f64::is_finite),
            DType::Bool => adj_core::parse_flag(cell).is_ok(),
        }
    }
}

/// A literal `NaN` is a missing value, not a number; infinities are rejected.
pub fn is_nan_marker(cell: &str) -> bool {
    cell.trim().eq_ignore_ascii_case("nan")
}

fn integral_float(cell: &str) -> bool {
    cell.parse::<f64>().map(|f| f.is_finite() && f.fract() == 0.0).unwrap_or(false)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    #[serde(default)]
    pub old_name: Option<String>,
    pub dtype: DType,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnContract(BTreeMap<String, ColumnSpec>);

impl ColumnContract {
    pub fn new(columns: BTreeMap<String, ColumnSpec>) -> Self {
        Self(columns)
    }

    /// Read and schema-check a contract file.
    pub fn load(path: &Path) -> IoResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| IoError::Path(format!("{}: {e}", path.display())))?;
        let doc: Value = serde_json::from_slice(&bytes).map_err(|e| IoError::Json {
            pointer: "/".into(),
            msg: format!("{}: {e}", path.display()),
        })?;
        Self::from_value(doc)
    }

    pub fn from_value(doc: Value) -> IoResult<Self> {
        validate_value(SchemaKind::ColumnContract, &doc)?;
        Ok(serde_json::from_value(doc)?)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnSpec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn file_name<'a>(name: &'a str, spec: &'a ColumnSpec) -> &'a str {
        spec.old_name.as_deref().unwrap_or(name)
    }

    /// Rename file headers to engine names, then check presence and cell types.
    pub fn apply_on_read(&self, table: &mut Table) -> IoResult<()> {
        for (name, spec) in self.columns() {
            let old = Self::file_name(name, spec);
            if old != name && table.column_index(name).is_none() {
                table.rename_column(old, name);
            }
        }
        self.check(table)
    }

    /// Check presence and types, then rename engine names to file headers.
    pub fn apply_on_write(&self, table: &mut Table) -> IoResult<()> {
        self.check(table)?;
        for (name, spec) in self.columns() {
            let old = Self::file_name(name, spec);
            if old != name {
                table.rename_column(name, old);
            }
        }
        Ok(())
    }

    fn check(&self, table: &Table) -> IoResult<()> {
        let missing: Vec<&str> = self
            .columns()
            .filter(|(name, _)| table.column_index(name).is_none())
            .map(|(name, _)| name)
            .collect();
        if !missing.is_empty() {
            return Err(IoError::Contract(format!("missing columns: {}", missing.join(", "))));
        }
        for (name, spec) in self.columns() {
            let col = table.require_column(name)?;
            for row in 0..table.len() {
                if let Some(cell) = table.cell(row, col) {
                    if !spec.dtype.accepts(cell) {
                        return Err(IoError::Contract(format!(
                            "column `{name}` row {}: {cell:?} is not {:?}",
                            row + 1,
                            spec.dtype
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
