//! Loader: read each configured table, apply its column contract, and record
//! the digest of the bytes actually read. Writer: the inverse for outputs.

use std::path::Path;

use tracing::info;

use crate::config::{ResolvedConfig, ResolvedInput};
use crate::contract::ColumnContract;
use crate::hasher::sha256_hex;
use crate::table::Table;
use crate::{IoError, IoResult};

/// One table as loaded, with provenance.
#[derive(Clone, Debug)]
pub struct LoadedTable {
    pub name: String,
    pub path: String,
    pub table: Table,
    pub sha256: String,
}

/// Read `path`, hash its bytes, parse CSV, apply `contract` if given.
pub fn load_table(name: &str, path: &Path, contract: Option<&ColumnContract>) -> IoResult<LoadedTable> {
    // 1) Bytes (hashed exactly as read)
    let bytes = std::fs::read(path)
        .map_err(|e| IoError::Path(format!("{name}: {}: {e}", path.display())))?;
    let sha256 = sha256_hex(&bytes);

    // 2) Parse
    let mut table = Table::from_reader(bytes.as_slice())
        .map_err(|e| IoError::Csv(format!("{name}: {}: {e}", path.display())))?;

    // 3) Contract
    if let Some(c) = contract {
        c.apply_on_read(&mut table).map_err(|e| match e {
            IoError::Contract(msg) => IoError::Contract(format!("{name}: {msg}")),
            other => other,
        })?;
    }

    info!(
        input = name,
        path = %path.display(),
        rows = table.len(),
        columns = table.headers().len(),
        "loaded table"
    );
    Ok(LoadedTable { name: name.to_string(), path: path.display().to_string(), table, sha256 })
}

/// Load every input a resolved configuration names, in phase order.
pub fn load_inputs(cfg: &ResolvedConfig) -> IoResult<Vec<LoadedTable>> {
    cfg.inputs.iter().map(load_resolved).collect()
}

pub fn load_resolved(input: &ResolvedInput) -> IoResult<LoadedTable> {
    load_table(input.slot.as_str(), &input.path, input.contract.as_ref())
}

/// Write `table` to `path` (atomic), renaming headers through `contract` if given.
pub fn write_table(table: &Table, path: &Path, contract: Option<&ColumnContract>) -> IoResult<()> {
    let mut out = table.clone();
    if let Some(c) = contract {
        c.apply_on_write(&mut out)?;
    }
    out.write_csv(path)?;
    info!(path = %path.display(), rows = out.len(), "wrote table");
    Ok(())
}
