//! Run record: the canonical JSON QA artifact every phase writes.
//!
//! - `run_id` = SHA-256 of the canonical record with `run_id` absent.
//! - Input digests are taken over the bytes actually read.
//! - Output names are file names only, never directories, so records from
//!   different machines compare equal.

use std::path::{Path, PathBuf};

use adj_core::{Panel, Params};
use adj_io::config::ResolvedConfig;
use adj_io::loader::LoadedTable;
use serde::Serialize;
use tracing::info;

use crate::{PipelineError, ENGINE_NAME, ENGINE_VERSION};

/// Per-stage counts. Fields a phase does not produce stay zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub rows: usize,
    pub series: usize,
    pub flagged_series: usize,
    pub outlier_rows: usize,
    pub imputed_rows: usize,
    pub unresolved_rows: usize,
    pub rollback_rows: usize,
    pub negative_partitions: usize,
    pub suppressed_cells: usize,
}

impl StageCounts {
    pub fn of_panel(panel: &Panel) -> Self {
        Self { rows: panel.len(), series: panel.series_count(), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineMeta {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDigest {
    pub name: String,
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub phase: String,
    pub engine: EngineMeta,
    pub params: Params,
    pub inputs: Vec<InputDigest>,
    pub counts: StageCounts,
    pub outputs: Vec<String>,
}

/// Assemble the record and stamp its `run_id`.
pub fn build(
    resolved: &ResolvedConfig,
    inputs: &[LoadedTable],
    counts: &StageCounts,
    written: &[PathBuf],
) -> Result<RunRecord, PipelineError> {
    let mut record = RunRecord {
        run_id: None,
        phase: resolved.phase.as_str().to_string(),
        engine: EngineMeta { name: ENGINE_NAME.to_string(), version: ENGINE_VERSION.to_string() },
        params: resolved.params.clone(),
        inputs: inputs
            .iter()
            .map(|t| InputDigest { name: t.name.clone(), path: t.path.clone(), sha256: t.sha256.clone() })
            .collect(),
        counts: counts.clone(),
        outputs: written.iter().map(|p| file_name(p)).collect(),
    };
    record.run_id = Some(adj_io::hasher::sha256_canonical(&record)?);
    Ok(record)
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

/// Write `record` as canonical JSON (atomic).
pub fn write(record: &RunRecord, path: &Path) -> Result<(), PipelineError> {
    let value = serde_json::to_value(record).map_err(|e| PipelineError::Io(e.to_string()))?;
    adj_io::canonical_json::write_canonical_file(path, &value)?;
    info!(path = %path.display(), run_id = record.run_id.as_deref().unwrap_or_default(), "run record written");
    Ok(())
}
