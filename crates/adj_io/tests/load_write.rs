//! Loader/writer behaviour against real files.

use std::fs;

use adj_io::prelude::*;
use assert_json_diff::assert_json_eq;
use serde_json::{json, Value};

#[test]
fn contract_round_trip_restores_file_headers() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("constrained.csv");
    let contract = dir.path().join("contract.json");
    fs::write(&csv, "lsoa_code,lad_code,2010,2011\nE1,L1,1.0,2.0\nE2,L1,3.0,4.0\n").unwrap();
    fs::write(
        &contract,
        r#"{"entity_code":{"old_name":"lsoa_code","dtype":"str"},
            "group_code":{"old_name":"lad_code","dtype":"str"},
            "2010":{"dtype":"float"},"2011":{"dtype":"float"}}"#,
    )
    .unwrap();

    let c = ColumnContract::load(&contract).unwrap();
    let loaded = load_table("constrained", &csv, Some(&c)).unwrap();
    assert_eq!(loaded.table.headers()[0], "entity_code");
    assert_eq!(loaded.sha256, sha256_file(&csv).unwrap());

    let out = dir.path().join("out").join("copy.csv");
    write_table(&loaded.table, &out, Some(&c)).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), fs::read_to_string(&csv).unwrap());
}

#[test]
fn config_file_round_trips_through_canonical_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    fs::write(
        &path,
        r#"{"output":{"dir":"out"},"inputs":{},"params":{"end_year":2020,"start_year":2010,"master_flag_threshold":2}}"#,
    )
    .unwrap();
    let cfg = load_config(&path).unwrap();

    let record = dir.path().join("record.json");
    write_canonical_file(&record, &serde_json::to_value(&cfg.params).unwrap()).unwrap();
    let back: Value = serde_json::from_str(&fs::read_to_string(&record).unwrap()).unwrap();
    assert_json_eq!(
        back,
        json!({
            "start_year": 2010,
            "end_year": 2020,
            "rollback_window": { "start": 2010, "end": 2014 },
            "zscore_threshold": 3.0,
            "iqr_multiplier": 3.0,
            "master_flag_threshold": 2,
            "extrapolation_span": 4,
            "accept_negatives": false,
            "negative_strategy": "renormalize"
        })
    );
}

#[test]
fn schema_errors_surface_before_typing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    fs::write(&path, r#"{"params":{"start_year":2010,"end_year":2020},"inputs":{},"output":{"dir":"o"},"extra":1}"#)
        .unwrap();
    assert!(matches!(load_config(&path), Err(IoError::Schema { .. })));
}
