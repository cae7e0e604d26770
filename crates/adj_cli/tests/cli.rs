//! End-to-end checks of the `adj` binary: exit codes and written files.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

const WIDE: &str = "entity_code,group_code,2000,2001,2002,2003\n\
    E1,G1,10,12,14,16\n\
    E2,G1,20,24,28,32\n\
    E3,G1,30,90,50,60\n";

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p
}

fn adjust_config(dir: &Path, selection: &str) -> PathBuf {
    write(dir, "selection.csv", selection);
    write(dir, "constrained.csv", WIDE);
    write(dir, "unconstrained.csv", WIDE);
    write(
        dir,
        "run.json",
        r#"{
            "params": { "start_year": 2000, "end_year": 2003, "rollback_window": null },
            "inputs": {
                "selection": { "path": "selection.csv" },
                "constrained": { "path": "constrained.csv" },
                "unconstrained": { "path": "unconstrained.csv" }
            },
            "output": { "dir": "out" }
        }"#,
    )
}

fn adj() -> Command {
    Command::cargo_bin("adj").unwrap()
}

#[test]
fn adjust_writes_artifacts_and_lists_them() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_config(dir.path(), "entity_code,group_code,adjust,years_to_adjust\nE3,G1,TRUE,2001\n");

    adj()
        .args(["adjust", "--config"])
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains("adjust_adjusted.csv"))
        .stdout(predicate::str::contains("adjust_run_record.json"));

    let adjusted = fs::read_to_string(dir.path().join("out/adjust_adjusted.csv")).unwrap();
    let e3: Vec<&str> = adjusted.lines().find(|l| l.starts_with("E3,")).unwrap().split(',').collect();
    assert_eq!(e3[3], "40", "{adjusted}");
}

#[test]
fn validate_only_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_config(dir.path(), "entity_code,group_code,adjust,years_to_adjust\nE3,G1,1,2001\n");
    adj()
        .args(["adjust", "--validate-only", "--config"])
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains("inputs OK"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn output_dir_override() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_config(dir.path(), "entity_code,group_code,adjust,years_to_adjust\nE3,G1,1,2001\n");
    let alt = dir.path().join("alt");
    adj()
        .args(["adjust", "--quiet", "--config"])
        .arg(&cfg)
        .arg("--output-dir")
        .arg(&alt)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert!(alt.join("adjust_interim.csv").exists());
}

#[test]
fn input_shape_error_exits_4() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_config(dir.path(), "entity_code,group_code,adjust,years_to_adjust\nE9,G1,1,2001\n");
    adj()
        .args(["adjust", "--config"])
        .arg(&cfg)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("unmatched"));
}

#[test]
fn degenerate_partition_exits_5() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_config(dir.path(), "entity_code,group_code,adjust,years_to_adjust\nE1,G1,1,2001\n");
    // Zero out every non-outlier in 2001.
    let zeroed = "entity_code,group_code,2000,2001,2002,2003\n\
        E1,G1,10,12,14,16\n\
        E2,G1,20,0,28,32\n\
        E3,G1,30,0,50,60\n";
    write(dir.path(), "constrained.csv", zeroed);
    write(dir.path(), "unconstrained.csv", zeroed);
    adj()
        .args(["adjust", "--config"])
        .arg(&cfg)
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Non-outlier total check failed"));
}

#[test]
fn partial_rollback_exits_6() {
    let dir = tempfile::tempdir().unwrap();
    // Only E1 repeats a value inside the default 2010..=2014 rollback window.
    let wide = "entity_code,group_code,2010,2011,2012,2013\nE1,G1,10,10,12,14\nE2,G1,20,22,24,26\n";
    write(dir.path(), "constrained.csv", wide);
    write(dir.path(), "unconstrained.csv", wide);
    write(dir.path(), "selection.csv", "entity_code,group_code,adjust,years_to_adjust\nE2,G1,,\n");
    let cfg = write(
        dir.path(),
        "run.json",
        r#"{
            "params": { "start_year": 2010, "end_year": 2013 },
            "inputs": {
                "selection": { "path": "selection.csv" },
                "constrained": { "path": "constrained.csv" },
                "unconstrained": { "path": "unconstrained.csv" }
            },
            "output": { "dir": "out" }
        }"#,
    );
    adj()
        .args(["adjust", "--config"])
        .arg(&cfg)
        .assert()
        .code(6)
        .stderr(predicate::str::contains("Sum check failed after rollback reapportionment"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn release_validation_failure_exits_7() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "adjusted.csv", "entity_code,group_code,2000\nE1,G1,\n");
    let cfg = write(
        dir.path(),
        "run.json",
        r#"{ "params": { "start_year": 2000, "end_year": 2000 },
             "inputs": { "adjusted": { "path": "adjusted.csv" } },
             "output": { "dir": "out" } }"#,
    );
    adj()
        .args(["release", "--config"])
        .arg(&cfg)
        .assert()
        .code(7)
        .stderr(predicate::str::contains("no_missing"));
}

#[test]
fn bad_config_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "run.json", r#"{ "params": { "start_year": 2000 } }"#);
    adj().args(["release", "--config"]).arg(&cfg).assert().code(3);
}

#[test]
fn usage_errors_exit_2() {
    adj().arg("adjust").assert().code(2);
    adj().args(["adjust", "--config", "missing.json"]).assert().code(2);
}
