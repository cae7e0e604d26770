// crates/adj_cli/src/main.rs
//
// Exit codes, error mapping, logging setup and the phase run.

mod args;

mod exitcodes {
    pub const OK: u8 = 0;
    pub const USAGE: u8 = 2;
    pub const IO: u8 = 3;
    pub const INPUT_SHAPE: u8 = 4;
    pub const DEGENERATE: u8 = 5;
    pub const INVARIANT: u8 = 6;
    pub const VALIDATION: u8 = 7;
}

use std::process::ExitCode;

use adj_pipeline::{run_phase, PipelineError, RunOptions};
use args::{parse_and_validate as parse_cli, Args};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = match parse_cli() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("adj: error: {e}");
            return ExitCode::from(exitcodes::USAGE);
        }
    };
    init_logging(&args);

    match run(&args) {
        Ok(()) => ExitCode::from(exitcodes::OK),
        Err(e) => {
            error!("{e}");
            eprintln!("adj: error: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the flag-derived level.
fn init_logging(args: &Args) {
    let level = if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("adj={level},adj_pipeline={level},adj_io={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(args: &Args) -> Result<(), PipelineError> {
    let phase = args.command.phase();
    let opts = RunOptions { validate_only: args.validate_only, output_dir: args.output_dir.clone() };
    let out = run_phase(args.command.config(), phase, &opts)?;

    if args.validate_only {
        if !args.quiet {
            println!("{}: inputs OK ({} rows)", phase.as_str(), out.counts.rows);
        }
        return Ok(());
    }
    if !args.quiet {
        for p in &out.written {
            println!("{}", p.display());
        }
    }
    if let Some(id) = out.run_record.as_ref().and_then(|r| r.run_id.as_deref()) {
        let short = adj_io::hasher::short_hex(id, 12).unwrap_or_else(|_| id.to_string());
        info!(run_id = %short, "done");
    }
    Ok(())
}

fn exit_code(e: &PipelineError) -> u8 {
    use exitcodes::*;
    match e {
        PipelineError::Io(_) => IO,
        PipelineError::InputShape(_) => INPUT_SHAPE,
        PipelineError::Degenerate { .. } => DEGENERATE,
        PipelineError::Invariant(_) => INVARIANT,
        PipelineError::Validate(_) => VALIDATION,
    }
}
