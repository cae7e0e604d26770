//! adj_pipeline: deterministic phase orchestration for the adjustment engine.
//!
//! Phases:
//! - **preprocess**: reshape long → rate of change → rollback flag → z/IQR scores
//!   → master flag → group mean → constrain to reference totals → wide variants.
//! - **adjust**: selection join → reshape long → rate of change → rollback flag
//!   → imputation → apportionment → negatives → rollback reapportionment → wide.
//! - **release**: checks → suppression → wide.
//!
//! Stage internals are pure functions over `adj_core::Panel`; file access goes
//! through `adj_io`, math through `adj_algo`. Each phase also writes a canonical
//! JSON run record.

#![forbid(unsafe_code)]

use std::fmt;
use std::path::{Path, PathBuf};

use adj_core::PartitionKey;
use adj_io::config::{load_config, resolve_config, InputSlot, Phase, ResolvedConfig};
use adj_io::loader::{load_inputs, write_table, LoadedTable};
use adj_io::table::Table;
use tracing::info;

pub mod apportion;
pub mod build_run_record;
pub mod constrain;
pub mod impute;
pub mod load;
pub mod rate;
pub mod release;
pub mod reshape;
pub mod score;
pub mod validate;

pub use build_run_record::{RunRecord, StageCounts};
pub use validate::{Severity, ValidationIssue, ValidationReport};

/// Column names shared by every engine-side table.
pub mod columns {
    pub const ENTITY_CODE: &str = "entity_code";
    pub const ENTITY_NAME: &str = "entity_name";
    pub const GROUP_CODE: &str = "group_code";
    pub const GROUP_NAME: &str = "group_name";
    pub const TRANSACTION_CODE: &str = "transaction_code";
    pub const YEAR: &str = "year";
    pub const ADJUST: &str = "adjust";
    pub const YEARS_TO_ADJUST: &str = "years_to_adjust";
    pub const MEASURE: &str = "measure";
    pub const MASTER_Z_FLAG: &str = "master_z_flag";
    pub const MASTER_IQR_FLAG: &str = "master_iqr_flag";
    pub const MASTER_FLAG: &str = "master_flag";
}

/// Engine identity echoed into run records.
pub const ENGINE_NAME: &str = "adj_engine";
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------- Errors ----------------------------

/// Post-condition failures inside the apportionment chain.
#[derive(Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    SumMismatch { stage: &'static str, keys: Vec<PartitionKey> },
    NegativeValues { stage: &'static str, keys: Vec<PartitionKey> },
    /// The allocator rejected its inputs for one partition.
    Allocation { stage: &'static str, key: PartitionKey, reason: String },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::SumMismatch { stage, keys } => write!(
                f,
                "Sum check failed after {stage}: group totals differ beyond tolerance for groups: {}",
                render_keys(keys)
            ),
            InvariantViolation::NegativeValues { stage, keys } => write!(
                f,
                "Negative value check failed after {stage}: negative values remain for groups: {}",
                render_keys(keys)
            ),
            InvariantViolation::Allocation { stage, key, reason } => {
                write!(f, "Allocation failed during {stage} for group {key}: {reason}")
            }
        }
    }
}

/// Single error surface for the pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// Configuration, file-system or table-format failure.
    Io(String),
    /// Missing column, unparsable cell, join cardinality, bad year token.
    InputShape(String),
    /// Zero denominators in the data; `groups` is sorted.
    Degenerate { reason: String, groups: Vec<PartitionKey> },
    Invariant(InvariantViolation),
    Validate(ValidationReport),
}

pub(crate) fn render_keys(keys: &[PartitionKey]) -> String {
    let parts: Vec<String> = keys.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Io(m) => write!(f, "io: {m}"),
            PipelineError::InputShape(m) => write!(f, "input shape: {m}"),
            PipelineError::Degenerate { reason, groups } => {
                write!(f, "{reason} for groups: {}", render_keys(groups))
            }
            PipelineError::Invariant(v) => write!(f, "{v}"),
            PipelineError::Validate(r) => {
                let errors = r.errors().count();
                write!(f, "validation failed with {errors} error(s)")?;
                for i in r.errors() {
                    write!(f, "\n  {}: {}", i.code, i.message)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<adj_io::IoError> for PipelineError {
    fn from(e: adj_io::IoError) -> Self {
        use adj_io::IoError as E;
        match e {
            E::Contract(m) => PipelineError::InputShape(m),
            other => PipelineError::Io(other.to_string()),
        }
    }
}

impl From<InvariantViolation> for PipelineError {
    fn from(v: InvariantViolation) -> Self {
        PipelineError::Invariant(v)
    }
}

impl From<adj_core::CoreError> for PipelineError {
    fn from(e: adj_core::CoreError) -> Self {
        PipelineError::InputShape(e.to_string())
    }
}

// ---------------------------- Phase runner ----------------------------

/// Caller overrides applied on top of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Load and check inputs; compute and write nothing.
    pub validate_only: bool,
    pub output_dir: Option<PathBuf>,
}

/// What a phase produced.
#[derive(Debug, Clone)]
pub struct PhaseOutputs {
    pub phase: Phase,
    pub counts: StageCounts,
    /// Files written, in write order (empty for `validate_only` or `write_output = false`).
    pub written: Vec<PathBuf>,
    pub run_record: Option<RunRecord>,
}

/// Load the configuration at `config_path` and run `phase` end to end.
pub fn run_phase(config_path: &Path, phase: Phase, opts: &RunOptions) -> Result<PhaseOutputs, PipelineError> {
    let cfg = load_config(config_path)?;
    let mut resolved = resolve_config(config_path, &cfg, phase)?;
    if let Some(dir) = &opts.output_dir {
        resolved.output_dir = dir.clone();
    }
    info!(phase = phase.as_str(), config = %config_path.display(), "phase started");

    let inputs = load_inputs(&resolved)?;
    let input = |slot: InputSlot| find_input(&inputs, slot);

    let params = &resolved.params;
    let (artifacts, counts) = match phase {
        Phase::Preprocess => {
            let unconstrained = &input(InputSlot::Unconstrained)?.table;
            let reference = &input(InputSlot::ReferenceTotals)?.table;
            if opts.validate_only {
                let panel = load::panel_from_wide(unconstrained, load::ValueSlot::Raw, params)?;
                load::reference_totals(reference)?;
                (Vec::new(), StageCounts::of_panel(&panel))
            } else {
                let out = preprocess(unconstrained, reference, params)?;
                let counts = out.counts.clone();
                (
                    vec![("interim_scores.csv", out.interim), ("outliers.csv", out.wide)],
                    counts,
                )
            }
        }
        Phase::Adjust => {
            let selection = &input(InputSlot::Selection)?.table;
            let constrained = &input(InputSlot::Constrained)?.table;
            let unconstrained = &input(InputSlot::Unconstrained)?.table;
            if opts.validate_only {
                let panel = load::adjust_panel(selection, constrained, unconstrained, params)?;
                (Vec::new(), StageCounts::of_panel(&panel))
            } else {
                let out = adjust(selection, constrained, unconstrained, params)?;
                let counts = out.counts.clone();
                (vec![("interim.csv", out.interim), ("adjusted.csv", out.wide)], counts)
            }
        }
        Phase::Release => {
            let adjusted = &input(InputSlot::Adjusted)?.table;
            let out = release::prepare_release(adjusted, &resolved.release)?;
            let counts = out.counts.clone();
            if opts.validate_only {
                (Vec::new(), counts)
            } else {
                (vec![("release.csv", out.table)], counts)
            }
        }
    };

    if opts.validate_only {
        info!(phase = phase.as_str(), rows = counts.rows, "inputs valid; nothing written");
        return Ok(PhaseOutputs { phase, counts, written: Vec::new(), run_record: None });
    }

    let written = write_artifacts(&resolved, artifacts)?;
    let record = build_run_record::build(&resolved, &inputs, &counts, &written)?;
    let record_path = resolved.output_path("run_record.json");
    build_run_record::write(&record, &record_path)?;

    let mut all = written;
    all.push(record_path);
    info!(phase = phase.as_str(), files = all.len(), "phase finished");
    Ok(PhaseOutputs { phase, counts, written: all, run_record: Some(record) })
}

fn find_input(inputs: &[LoadedTable], slot: InputSlot) -> Result<&LoadedTable, PipelineError> {
    inputs
        .iter()
        .find(|t| t.name == slot.as_str())
        .ok_or_else(|| PipelineError::Io(format!("input `{}` was not loaded", slot.as_str())))
}

fn write_artifacts(
    resolved: &ResolvedConfig,
    artifacts: Vec<(&'static str, Table)>,
) -> Result<Vec<PathBuf>, PipelineError> {
    if !resolved.write_output {
        info!("write_output = false; skipping table artifacts");
        return Ok(Vec::new());
    }
    let last = artifacts.len().saturating_sub(1);
    let mut written = Vec::with_capacity(artifacts.len());
    for (i, (name, table)) in artifacts.into_iter().enumerate() {
        let path = resolved.output_path(name);
        // The output contract applies to the final artifact only.
        let contract = if i == last { resolved.output_contract.as_ref() } else { None };
        write_table(&table, &path, contract)?;
        written.push(path);
    }
    Ok(written)
}

// ---------------------------- In-memory phases ----------------------------

/// Tables produced by the preprocess phase.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub panel: adj_core::Panel,
    pub interim: Table,
    pub wide: Table,
    pub counts: StageCounts,
}

/// Score every series and constrain it to the reference totals.
pub fn preprocess(
    unconstrained: &Table,
    reference: &Table,
    params: &adj_core::Params,
) -> Result<PreprocessOutput, PipelineError> {
    let mut panel = load::panel_from_wide(unconstrained, load::ValueSlot::Raw, params)?;
    let totals = load::reference_totals(reference)?;

    rate::rate_of_change(&mut panel, adj_algo::Direction::Backward);
    rate::rate_of_change(&mut panel, adj_algo::Direction::Forward);
    let rollback_rows = rate::flag_rollback(&mut panel, params.rollback_window);

    score::score_panel(&mut panel, params);
    let flagged = score::master_flags(&mut panel, params.master_flag_threshold);
    info!(flagged_series = flagged, "master flags set");

    constrain::group_means(&mut panel);
    constrain::constrain_to_reference(&mut panel, &totals);

    let interim = reshape::preprocess_interim(&panel);
    let wide = reshape::preprocess_wide(&panel);

    let mut counts = StageCounts::of_panel(&panel);
    counts.flagged_series = flagged;
    counts.rollback_rows = rollback_rows;
    Ok(PreprocessOutput { panel, interim, wide, counts })
}

/// Tables produced by the adjust phase.
#[derive(Debug, Clone)]
pub struct AdjustOutput {
    pub panel: adj_core::Panel,
    pub interim: Table,
    pub wide: Table,
    pub counts: StageCounts,
}

/// Impute selected outlier years and reapportion every affected partition.
pub fn adjust(
    selection: &Table,
    constrained: &Table,
    unconstrained: &Table,
    params: &adj_core::Params,
) -> Result<AdjustOutput, PipelineError> {
    let mut panel = load::adjust_panel(selection, constrained, unconstrained, params)?;

    rate::rate_of_change(&mut panel, adj_algo::Direction::Backward);
    rate::rate_of_change(&mut panel, adj_algo::Direction::Forward);
    let rollback_rows = rate::flag_rollback(&mut panel, params.rollback_window);

    let imputed = impute::impute_outliers(&mut panel, params);
    let negatives = apportion::run_apportionment(&mut panel, params)?;

    panel.sort_by_series(true);
    let interim = reshape::adjust_interim(&panel);
    let wide = reshape::adjust_wide(&panel);

    let mut counts = StageCounts::of_panel(&panel);
    counts.outlier_rows = imputed.outlier_rows;
    counts.imputed_rows = imputed.imputed_rows;
    counts.unresolved_rows = imputed.unresolved_rows;
    counts.rollback_rows = rollback_rows;
    counts.negative_partitions = negatives;
    Ok(AdjustOutput { panel, interim, wide, counts })
}
