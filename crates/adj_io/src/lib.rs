//! crates/adj_io/src/lib.rs
//! I/O crate: tabular files, column contracts, run configuration, canonical JSON, digests.
//!
//! - Shared error type (`IoError`) with `From` conversions used across modules.
//! - Public surface kept stable; details live in submodules.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Unified error for adj_io.
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (open, create_dir_all, rename, fsync, ...).
    #[error("io/path error: {0}")]
    Path(String),

    /// Delimited-file read/write errors.
    #[error("csv error: {0}")]
    Csv(String),

    /// JSON serialization/deserialization errors with a JSON Pointer hint.
    #[error("json error at {pointer}: {msg}")]
    Json { pointer: String, msg: String },

    /// JSON Schema validation failures (first violation reported).
    #[error("schema error at {pointer}: {msg}")]
    Schema { pointer: String, msg: String },

    /// Column contract violations: missing column, unparsable cell.
    #[error("contract violation: {0}")]
    Contract(String),

    /// Hashing-related errors.
    #[error("hash error: {0}")]
    Hash(String),

    /// Generic validation / invariants.
    #[error("invalid: {0}")]
    Invalid(String),
}

pub type IoResult<T> = Result<T, IoError>;

/* ---------------- From conversions (used by file modules) ---------------- */

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        // serde_json keeps no pointer; report at root and let callers enrich.
        IoError::Json { pointer: "/".to_string(), msg: e.to_string() }
    }
}

impl From<csv::Error> for IoError {
    fn from(e: csv::Error) -> Self {
        IoError::Csv(e.to_string())
    }
}

pub mod canonical_json;
pub mod config;
pub mod contract;
pub mod hasher;
pub mod loader;
pub mod schema;
pub mod table;

/// Lightweight re-exports: `use adj_io::prelude::*;`
pub mod prelude {
    pub use crate::{IoError, IoResult};

    pub use crate::config::{load_config, resolve_config, Phase, ResolvedConfig, RunConfig};
    pub use crate::contract::{ColumnContract, DType};
    pub use crate::loader::{load_table, write_table, LoadedTable};
    pub use crate::table::Table;

    pub use crate::canonical_json::{to_canonical_bytes, write_canonical_file};
    pub use crate::hasher::{sha256_file, sha256_hex};
}
