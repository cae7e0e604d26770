//! Run configuration: one JSON document per phase.
//!
//! Contract:
//! - Raw JSON is schema-validated, then deserialized with `deny_unknown_fields`,
//!   then `Params::validate` runs.
//! - Relative paths resolve against the configuration file's directory.
//! - Each phase names the inputs it requires; `resolve_config` checks they
//!   are configured and exist as files.

use std::path::{Path, PathBuf};

use adj_core::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::contract::ColumnContract;
use crate::schema::{validate_value, SchemaKind};
use crate::{IoError, IoResult};

// ------ Wire types ------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub params: Params,
    pub inputs: Inputs,
    pub output: OutputSettings,
    #[serde(default)]
    pub release: Option<ReleaseSettings>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableInput {
    pub path: String,
    #[serde(default)]
    pub contract: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inputs {
    #[serde(default)]
    pub unconstrained: Option<TableInput>,
    #[serde(default)]
    pub reference_totals: Option<TableInput>,
    #[serde(default)]
    pub selection: Option<TableInput>,
    #[serde(default)]
    pub constrained: Option<TableInput>,
    #[serde(default)]
    pub adjusted: Option<TableInput>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    pub dir: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_true")]
    pub write_output: bool,
    #[serde(default)]
    pub contract: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseSettings {
    #[serde(default)]
    pub suppression: Vec<SuppressionRule>,
}

/// Replace year cells of rows with this transaction whose group starts with a prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuppressionRule {
    pub transaction: String,
    pub group_prefixes: Vec<String>,
    #[serde(default)]
    pub years: Option<Vec<i32>>,
}

// ------ Phases ------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Preprocess,
    Adjust,
    Release,
}

/// Input slots a phase reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InputSlot {
    Unconstrained,
    ReferenceTotals,
    Selection,
    Constrained,
    Adjusted,
}

impl InputSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            InputSlot::Unconstrained => "unconstrained",
            InputSlot::ReferenceTotals => "reference_totals",
            InputSlot::Selection => "selection",
            InputSlot::Constrained => "constrained",
            InputSlot::Adjusted => "adjusted",
        }
    }
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Preprocess => "preprocess",
            Phase::Adjust => "adjust",
            Phase::Release => "release",
        }
    }

    pub fn required_inputs(self) -> &'static [InputSlot] {
        match self {
            Phase::Preprocess => &[InputSlot::Unconstrained, InputSlot::ReferenceTotals],
            Phase::Adjust => {
                &[InputSlot::Selection, InputSlot::Constrained, InputSlot::Unconstrained]
            }
            Phase::Release => &[InputSlot::Adjusted],
        }
    }
}

impl Inputs {
    pub fn get(&self, slot: InputSlot) -> Option<&TableInput> {
        match slot {
            InputSlot::Unconstrained => self.unconstrained.as_ref(),
            InputSlot::ReferenceTotals => self.reference_totals.as_ref(),
            InputSlot::Selection => self.selection.as_ref(),
            InputSlot::Constrained => self.constrained.as_ref(),
            InputSlot::Adjusted => self.adjusted.as_ref(),
        }
    }
}

// ------ Resolved form ------

#[derive(Clone, Debug)]
pub struct ResolvedInput {
    pub slot: InputSlot,
    pub path: PathBuf,
    pub contract: Option<ColumnContract>,
}

#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub phase: Phase,
    pub params: Params,
    pub inputs: Vec<ResolvedInput>,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub write_output: bool,
    pub output_contract: Option<ColumnContract>,
    pub release: ReleaseSettings,
}

impl ResolvedConfig {
    pub fn input(&self, slot: InputSlot) -> IoResult<&ResolvedInput> {
        self.inputs
            .iter()
            .find(|i| i.slot == slot)
            .ok_or_else(|| IoError::Invalid(format!("input `{}` not configured", slot.as_str())))
    }

    /// `<output_dir>/<prefix>_<name>`
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{name}", self.prefix))
    }
}

// ------ Loading ------

/// Read, schema-validate, deserialize and domain-check a run configuration.
pub fn load_config(path: &Path) -> IoResult<RunConfig> {
    let bytes = std::fs::read(path)
        .map_err(|e| IoError::Path(format!("{}: {e}", path.display())))?;
    let raw: Value = serde_json::from_slice(&bytes).map_err(|e| IoError::Json {
        pointer: "/".into(),
        msg: format!("{}: {e}", path.display()),
    })?;
    parse_config(raw)
}

pub fn parse_config(raw: Value) -> IoResult<RunConfig> {
    validate_value(SchemaKind::RunConfig, &raw)?;
    let cfg: RunConfig = serde_json::from_value(raw)?;
    cfg.params
        .validate()
        .map_err(|e| IoError::Invalid(format!("params: {e}")))?;
    Ok(cfg)
}

#[inline]
fn join_under(base: &Path, rel: &str) -> PathBuf {
    let p = Path::new(rel);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn require_file(what: &str, p: &Path) -> IoResult<()> {
    let md = std::fs::metadata(p)
        .map_err(|e| IoError::Path(format!("{what}: cannot access {}: {e}", p.display())))?;
    if !md.is_file() {
        return Err(IoError::Path(format!("{what}: not a file: {}", p.display())));
    }
    Ok(())
}

/// Resolve paths for `phase` against the directory holding `config_path`.
pub fn resolve_config(config_path: &Path, cfg: &RunConfig, phase: Phase) -> IoResult<ResolvedConfig> {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));

    let mut inputs = Vec::new();
    for &slot in phase.required_inputs() {
        let input = cfg.inputs.get(slot).ok_or_else(|| {
            IoError::Invalid(format!("{} phase requires input `{}`", phase.as_str(), slot.as_str()))
        })?;
        let path = join_under(base, &input.path);
        require_file(slot.as_str(), &path)?;
        let contract = match &input.contract {
            Some(c) => Some(ColumnContract::load(&join_under(base, c))?),
            None => None,
        };
        debug!(input = slot.as_str(), path = %path.display(), contracted = contract.is_some(), "resolved input");
        inputs.push(ResolvedInput { slot, path, contract });
    }

    let output_contract = match &cfg.output.contract {
        Some(c) => Some(ColumnContract::load(&join_under(base, c))?),
        None => None,
    };

    Ok(ResolvedConfig {
        phase,
        params: cfg.params.clone(),
        inputs,
        output_dir: join_under(base, &cfg.output.dir),
        prefix: cfg.output.prefix.clone().unwrap_or_else(|| phase.as_str().to_string()),
        write_output: cfg.output.write_output,
        output_contract,
        release: cfg.release.clone().unwrap_or_default(),
    })
}
