// crates/adj_cli/src/args.rs
//
// Offline CLI argument surface.
// - One subcommand per phase, each taking `--config <path>`.
// - Paths must be local (no scheme://); the config file must exist.
// - `--output-dir` may not exist yet; it is made absolute against the CWD.

use clap::{Parser, Subcommand};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use adj_io::config::Phase;

/// Parsed CLI arguments (raw).
#[derive(Debug, Parser, Clone)]
#[command(
    name = "adj",
    version,
    disable_help_subcommand = true,
    about = "Outlier detection and sum-preserving adjustment of household income series"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Load and check inputs only; compute and write nothing.
    #[arg(long, global = true)]
    pub validate_only: bool,

    /// Override the configured output directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only warnings and errors on stderr.
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Debug-level logging on stderr.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Score series for analyst review and constrain them to reference totals.
    Preprocess(PhaseArgs),
    /// Impute selected outlier years and reapportion group totals.
    Adjust(PhaseArgs),
    /// Check and suppress an adjusted table for publication.
    Release(PhaseArgs),
}

#[derive(Debug, clap::Args, Clone)]
pub struct PhaseArgs {
    /// Run configuration (JSON).
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,
}

impl Command {
    pub fn phase(&self) -> Phase {
        match self {
            Command::Preprocess(_) => Phase::Preprocess,
            Command::Adjust(_) => Phase::Adjust,
            Command::Release(_) => Phase::Release,
        }
    }

    pub fn config(&self) -> &Path {
        match self {
            Command::Preprocess(a) | Command::Adjust(a) | Command::Release(a) => &a.config,
        }
    }
}

/// Errors surfaced by argument validation after clap parsing.
#[derive(Debug)]
pub enum CliError {
    NonLocalPath(String),
    NotFound(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::NonLocalPath(p) => write!(f, "path must be local file (no scheme): {p}"),
            CliError::NotFound(p) => write!(f, "file not found: {p}"),
        }
    }
}
impl std::error::Error for CliError {}

/// Entry point used by main.rs
pub fn parse_and_validate() -> Result<Args, CliError> {
    validate(Args::parse())
}

fn validate(mut args: Args) -> Result<Args, CliError> {
    ensure_local_exists(args.command.config(), "--config")?;
    if let Some(dir) = &args.output_dir {
        ensure_local_path(dir)?;
    }

    let config = normalize_path(args.command.config());
    match &mut args.command {
        Command::Preprocess(a) | Command::Adjust(a) | Command::Release(a) => a.config = config,
    }
    args.output_dir = args.output_dir.take().map(|p| normalize_path(&p));
    Ok(args)
}

/// Reject any explicit URI scheme (e.g., http://, https://, file://).
#[inline]
fn has_scheme(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.contains("://") || lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("file:")
}

#[inline]
fn ensure_local_path(p: &Path) -> Result<(), CliError> {
    if let Some(s) = p.to_str() {
        if has_scheme(s) {
            return Err(CliError::NonLocalPath(s.to_string()));
        }
    }
    Ok(())
}

/// Ensure a path is local (no scheme) and exists as a regular file.
fn ensure_local_exists(p: &Path, label: &'static str) -> Result<(), CliError> {
    ensure_local_path(p)?;
    let meta = fs::metadata(p).map_err(|_| CliError::NotFound(format!("{label} {}", p.display())))?;
    if !meta.is_file() {
        return Err(CliError::NotFound(format!("{label} {}", p.display())));
    }
    Ok(())
}

/// Best-effort normalization to an absolute path.
/// If canonicalize fails (e.g., path doesn't exist yet), produce an absolute path relative to CWD.
fn normalize_path(p: &Path) -> PathBuf {
    fs::canonicalize(p).unwrap_or_else(|_| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(p)
        }
    })
}
