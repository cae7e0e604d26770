//! Phase runs against files on disk.

use std::fs;
use std::path::{Path, PathBuf};

use adj_io::config::Phase;
use adj_io::table::Table;
use adj_pipeline::{run_phase, PipelineError, RunOptions};
use assert_json_diff::assert_json_include;
use serde_json::{json, Value};

const UNCONSTRAINED: &str = "entity_code,group_code,2000,2001,2002,2003\n\
    E1,G1,10,12,14,16\n\
    E2,G1,20,24,28,32\n\
    E3,G1,30,90,50,60\n";

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p
}

fn config(dir: &Path, inputs: Value, extra: Value) -> PathBuf {
    let mut cfg = json!({
        "params": { "start_year": 2000, "end_year": 2003, "rollback_window": null },
        "inputs": inputs,
        "output": { "dir": "out", "prefix": "gdhi" }
    });
    if let (Some(obj), Some(more)) = (cfg.as_object_mut(), extra.as_object()) {
        for (k, v) in more {
            obj.insert(k.clone(), v.clone());
        }
    }
    write(dir, "run.json", &cfg.to_string())
}

fn read(p: &Path) -> Table {
    Table::read_csv(p).unwrap()
}

fn number(t: &Table, row: usize, header: &str) -> f64 {
    let c = t.column_index(header).unwrap();
    t.cell(row, c).unwrap().parse().unwrap()
}

fn adjust_fixture(dir: &Path, selection: &str) -> PathBuf {
    write(dir, "selection.csv", selection);
    write(dir, "constrained.csv", UNCONSTRAINED);
    write(dir, "unconstrained.csv", UNCONSTRAINED);
    config(
        dir,
        json!({
            "selection": { "path": "selection.csv" },
            "constrained": { "path": "constrained.csv" },
            "unconstrained": { "path": "unconstrained.csv" }
        }),
        json!({}),
    )
}

#[test]
fn adjust_imputes_and_preserves_group_totals() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_fixture(
        dir.path(),
        "entity_code,group_code,adjust,years_to_adjust\nE1,G1,,\nE3,G1,TRUE,2001\n",
    );

    let out = run_phase(&cfg, Phase::Adjust, &RunOptions::default()).unwrap();
    let names: Vec<String> = out
        .written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["gdhi_interim.csv", "gdhi_adjusted.csv", "gdhi_run_record.json"]);

    let adjusted = read(&dir.path().join("out/gdhi_adjusted.csv"));
    assert_eq!(adjusted.len(), 3);
    // E3 2001 interpolated between 30 and 50.
    assert_eq!(number(&adjusted, 2, "2001"), 40.0);
    for year in ["2000", "2001", "2002", "2003"] {
        let sum: f64 = (0..3).map(|r| number(&adjusted, r, year)).sum();
        let before: f64 = [10.0, 20.0, 30.0, 12.0, 24.0, 90.0, 14.0, 28.0, 50.0, 16.0, 32.0, 60.0]
            .chunks(3)
            .nth(year.parse::<usize>().unwrap() - 2000)
            .unwrap()
            .iter()
            .sum();
        assert!((sum - before).abs() < 1e-6, "{year}: {sum} != {before}");
    }
    // The 50 removed from E3 is split 1:2 over E1 and E2.
    assert!((number(&adjusted, 0, "2001") - (12.0 + 50.0 / 3.0)).abs() < 1e-9);

    let record: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/gdhi_run_record.json")).unwrap()).unwrap();
    assert_json_include!(
        actual: record,
        expected: json!({
            "phase": "adjust",
            "counts": { "rows": 12, "series": 3, "outlier_rows": 1, "imputed_rows": 1, "unresolved_rows": 0 },
            "outputs": ["gdhi_interim.csv", "gdhi_adjusted.csv"]
        })
    );
    assert_eq!(record["inputs"].as_array().map(Vec::len), Some(3));
}

#[test]
fn adjust_reapportions_rollback_years_inside_the_default_window() {
    let dir = tempfile::tempdir().unwrap();
    // 2010..=2012 were copied from one year in the unconstrained source.
    write(
        dir.path(),
        "unconstrained.csv",
        "entity_code,group_code,2010,2011,2012,2013,2014,2015,2016\n\
         E1,G1,10,10,10,12,14,16,18\n\
         E2,G1,20,20,20,24,28,32,36\n\
         E3,G1,30,30,30,36,42,90,54\n",
    );
    write(
        dir.path(),
        "constrained.csv",
        "entity_code,group_code,2010,2011,2012,2013,2014,2015,2016\n\
         E1,G1,11,9,10,12,14,16,18\n\
         E2,G1,19,21,20,24,28,32,36\n\
         E3,G1,30,30,30,36,42,90,54\n",
    );
    write(dir.path(), "selection.csv", "entity_code,group_code,adjust,years_to_adjust\nE3,G1,TRUE,2015\n");
    let cfg = write(
        dir.path(),
        "run.json",
        &json!({
            "params": { "start_year": 2010, "end_year": 2016 },
            "inputs": {
                "selection": { "path": "selection.csv" },
                "constrained": { "path": "constrained.csv" },
                "unconstrained": { "path": "unconstrained.csv" }
            },
            "output": { "dir": "out" }
        })
        .to_string(),
    );

    let out = run_phase(&cfg, Phase::Adjust, &RunOptions::default()).unwrap();
    assert_eq!(out.counts.rollback_rows, 9);
    assert_eq!(out.counts.imputed_rows, 1);

    let adjusted = read(&dir.path().join("out/adjust_adjusted.csv"));
    let close = |got: f64, want: f64| assert!((got - want).abs() < 1e-9, "{got} != {want}");
    // Rollback years take the 1:2:3 split of the latest rollback year.
    for year in ["2010", "2011", "2012"] {
        close(number(&adjusted, 0, year), 10.0);
        close(number(&adjusted, 1, year), 20.0);
        close(number(&adjusted, 2, year), 30.0);
    }
    // E3 2015 interpolated between 42 and 54; the 42 removed goes 1:2 to E1 and E2.
    close(number(&adjusted, 2, "2015"), 48.0);
    close(number(&adjusted, 0, "2015"), 30.0);
    close(number(&adjusted, 1, "2015"), 60.0);
    for (year, total) in [("2010", 60.0), ("2013", 72.0), ("2015", 138.0), ("2016", 108.0)] {
        close((0..3).map(|r| number(&adjusted, r, year)).sum(), total);
    }
}

#[test]
fn partial_rollback_in_a_partition_breaks_the_sum_check() {
    let dir = tempfile::tempdir().unwrap();
    let wide = "entity_code,group_code,2010,2011,2012,2013\nE1,G1,10,10,12,14\nE2,G1,20,22,24,26\n";
    write(dir.path(), "unconstrained.csv", wide);
    write(dir.path(), "constrained.csv", wide);
    write(dir.path(), "selection.csv", "entity_code,group_code,adjust,years_to_adjust\nE2,G1,,\n");
    let cfg = write(
        dir.path(),
        "run.json",
        &json!({
            "params": { "start_year": 2010, "end_year": 2013 },
            "inputs": {
                "selection": { "path": "selection.csv" },
                "constrained": { "path": "constrained.csv" },
                "unconstrained": { "path": "unconstrained.csv" }
            },
            "output": { "dir": "out" }
        })
        .to_string(),
    );
    match run_phase(&cfg, Phase::Adjust, &RunOptions::default()) {
        Err(PipelineError::Invariant(v)) => {
            let msg = v.to_string();
            assert!(msg.starts_with("Sum check failed after rollback reapportionment"), "{msg}");
            assert!(msg.contains("(G1, 2010)"), "{msg}");
        }
        other => panic!("expected invariant violation, got {other:?}"),
    }
    assert!(!dir.path().join("out").exists());
}

#[test]
fn adjust_is_byte_for_byte_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_fixture(dir.path(), "entity_code,group_code,adjust,years_to_adjust\nE3,G1,yes,2001\n");
    run_phase(&cfg, Phase::Adjust, &RunOptions::default()).unwrap();
    let first = fs::read(dir.path().join("out/gdhi_interim.csv")).unwrap();
    let record = fs::read(dir.path().join("out/gdhi_run_record.json")).unwrap();
    run_phase(&cfg, Phase::Adjust, &RunOptions::default()).unwrap();
    assert_eq!(first, fs::read(dir.path().join("out/gdhi_interim.csv")).unwrap());
    assert_eq!(record, fs::read(dir.path().join("out/gdhi_run_record.json")).unwrap());
}

#[test]
fn selection_without_years_is_a_shape_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_fixture(dir.path(), "entity_code,group_code,adjust,years_to_adjust\nE3,G1,y,1990\n");
    match run_phase(&cfg, Phase::Adjust, &RunOptions::default()) {
        Err(PipelineError::InputShape(m)) => assert!(m.contains("[E3]"), "{m}"),
        other => panic!("expected input shape error, got {other:?}"),
    }
}

#[test]
fn validate_only_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = adjust_fixture(dir.path(), "entity_code,group_code,adjust,years_to_adjust\nE3,G1,1,2001\n");
    let opts = RunOptions { validate_only: true, ..RunOptions::default() };
    let out = run_phase(&cfg, Phase::Adjust, &opts).unwrap();
    assert!(out.written.is_empty());
    assert!(out.run_record.is_none());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn preprocess_writes_scores_and_both_variants() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "unconstrained.csv", UNCONSTRAINED);
    write(dir.path(), "totals.csv", "group_code,2000,2001,2002,2003\nG1,120,252,184,216\n");
    let cfg = config(
        dir.path(),
        json!({
            "unconstrained": { "path": "unconstrained.csv" },
            "reference_totals": { "path": "totals.csv" }
        }),
        json!({}),
    );
    let alt = dir.path().join("elsewhere");
    let opts = RunOptions { output_dir: Some(alt.clone()), ..RunOptions::default() };
    let out = run_phase(&cfg, Phase::Preprocess, &opts).unwrap();
    assert_eq!(out.counts.rows, 12);
    assert_eq!(out.counts.series, 3);

    let interim = read(&alt.join("gdhi_interim_scores.csv"));
    assert_eq!(interim.len(), 12);
    assert!(interim.column_index("raw_iqr_flag").is_some());

    let wide = read(&alt.join("gdhi_outliers.csv"));
    assert_eq!(wide.len(), 12);
    let flag = wide.column_index("master_flag").unwrap();
    let means = (0..wide.len()).filter(|&r| wide.cell(r, flag) == Some("MEAN")).count();
    assert_eq!(means, 6);
    assert!(alt.join("gdhi_run_record.json").exists());
}

#[test]
fn release_suppresses_configured_cells() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "adjusted.csv",
        "entity_code,group_code,transaction_code,2000,2001\nE2,S12,D623,1,2\nE1,E06,D623,3,4\n",
    );
    let cfg = config(
        dir.path(),
        json!({ "adjusted": { "path": "adjusted.csv" } }),
        json!({ "release": { "suppression": [ { "transaction": "D623", "group_prefixes": ["S"], "years": [2001] } ] } }),
    );
    let out = run_phase(&cfg, Phase::Release, &RunOptions::default()).unwrap();
    assert_eq!(out.counts.suppressed_cells, 1);
    let text = fs::read_to_string(dir.path().join("out/gdhi_release.csv")).unwrap();
    assert_eq!(
        text,
        "entity_code,group_code,transaction_code,2000,2001\nE1,E06,D623,3,4\nE2,S12,D623,1,X\n"
    );
}

#[test]
fn release_with_duplicate_series_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "adjusted.csv", "entity_code,group_code,2000\nE1,G1,1\nE1,G1,2\n");
    let cfg = config(dir.path(), json!({ "adjusted": { "path": "adjusted.csv" } }), json!({}));
    let err = run_phase(&cfg, Phase::Release, &RunOptions::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Validate(_)));
    assert!(err.to_string().contains("entity_unique"), "{err}");
}
