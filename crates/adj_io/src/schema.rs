//! Embedded JSON Schemas (draft 7) for the run configuration and column contracts.
//!
//! Validation runs on the raw `serde_json::Value` before typed deserialization,
//! so shape errors carry a JSON Pointer. Without the `schemaval` feature the
//! check is skipped and serde's `deny_unknown_fields` is the only gate.

use serde_json::Value;

use crate::{IoError, IoResult};

pub const RUN_CONFIG_SCHEMA_JSON: &str = include_str!("../schemas/run_config.schema.json");
pub const COLUMN_CONTRACT_SCHEMA_JSON: &str =
    include_str!("../schemas/column_contract.schema.json");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    RunConfig,
    ColumnContract,
}

impl SchemaKind {
    fn source(self) -> &'static str {
        match self {
            SchemaKind::RunConfig => RUN_CONFIG_SCHEMA_JSON,
            SchemaKind::ColumnContract => COLUMN_CONTRACT_SCHEMA_JSON,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SchemaKind::RunConfig => "run_config.schema.json",
            SchemaKind::ColumnContract => "column_contract.schema.json",
        }
    }
}

/// Validate `doc` against the embedded schema; reports the first violation.
#[cfg(feature = "schemaval")]
pub fn validate_value(kind: SchemaKind, doc: &Value) -> IoResult<()> {
    use jsonschema::{Draft, JSONSchema};

    let schema: Value = serde_json::from_str(kind.source())
        .map_err(|e| IoError::Invalid(format!("embedded {} is not JSON: {e}", kind.name())))?;
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|e| IoError::Invalid(format!("{} does not compile: {e}", kind.name())))?;

    if let Err(errors) = compiled.validate(doc) {
        if let Some(err) = errors.into_iter().next() {
            let ptr = err.instance_path.to_string();
            return Err(IoError::Schema {
                pointer: if ptr.is_empty() { "/".to_string() } else { ptr },
                msg: err.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(not(feature = "schemaval"))]
pub fn validate_value(kind: SchemaKind, _doc: &Value) -> IoResult<()> {
    serde_json::from_str::<Value>(kind.source())
        .map(|_| ())
        .map_err(|e| IoError::Invalid(format!("embedded {} is not JSON: {e}", kind.name())))
}
