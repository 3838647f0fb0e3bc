//! Tests for the `build` CLI command

use std::path::Path;

use crate::common::{
    assert_contains, assert_json_type, assert_valid_json, read_index, read_table, TestSnapshot,
};

fn build_args<'a>(outputs: &'a [String; 3], as_of: &'a str) -> Vec<&'a str> {
    vec![
        "build",
        "--snapshot",
        "snapshot.db",
        "--table-out",
        &outputs[0],
        "--index-out",
        &outputs[1],
        "--as-of",
        as_of,
    ]
}

fn outputs(snap: &TestSnapshot) -> [String; 3] {
    [
        snap.out("out/wow_portfolios.db"),
        snap.out("out/landlord_index.jsonl"),
        snap.out("out/portfolios.json"),
    ]
}

#[test]
fn test_build_text_output() {
    let snap = TestSnapshot::cloud_city();
    let out = outputs(&snap);
    let output = snap.run_cli_success(&build_args(&out, "2024-06-01"));

    assert_contains(&output, "PORTFOLIO BUILD");
    assert_contains(&output, "contacts: 4");
    assert_contains(&output, "portfolios: 3 (0 degenerate splits)");
    assert_contains(&output, "index_records: 3");

    let rows = read_table(Path::new(&out[0]));
    assert_eq!(rows.len(), 3);
    assert_eq!(read_index(Path::new(&out[1])).len(), 3);
    assert!(!Path::new(&out[2]).exists());
}

#[test]
fn test_build_json_output_and_json_export() {
    let snap = TestSnapshot::cloud_city();
    let out = outputs(&snap);
    let mut args = build_args(&out, "2024-06-01");
    args.extend(["--json-out", out[2].as_str(), "-f", "json"]);

    let output = snap.run_cli_success(&args);
    let json = assert_valid_json(&output, "build json");
    assert_json_type(&json, "build");
    assert_eq!(json["stats"]["portfolios"], 3);
    assert_eq!(json["stats"]["rows_read"], 4);
    assert_eq!(json["publish"]["attempts"], 1);
    assert_eq!(json["publish"]["table"]["rows_inserted"], 3);

    let exported = std::fs::read_to_string(&out[2]).unwrap();
    let exported = assert_valid_json(&exported, "portfolios json");
    assert_eq!(exported.as_array().unwrap().len(), 3);
}

#[test]
fn test_build_flags_override_config_file() {
    let snap = TestSnapshot::cloud_city();
    snap.add_file("portfoliograph.toml", "[search_index]\nmax_record_len = 2000\n");
    let out = outputs(&snap);
    let mut args = build_args(&out, "2024-06-01");
    args.extend(["--max-record-len", "12", "-f", "json"]);

    let json = assert_valid_json(&snap.run_cli_success(&args), "build json");
    // "LANDLORDO CALRISSIAN, LOBOT JONES" is split into two records.
    assert_eq!(json["stats"]["index_records"], 4);
}

#[test]
fn test_missing_snapshot_exits_upstream() {
    let snap = TestSnapshot::new();
    let (code, stderr) = snap.run_cli_failure(&[
        "build",
        "--snapshot",
        "absent.db",
        "--table-out",
        "wow.db",
        "--index-out",
        "index.jsonl",
    ]);
    assert_eq!(code, Some(3));
    assert_contains(&stderr, "Upstream unavailable");
    assert!(!snap.path().join("wow.db").exists());
    assert!(!snap.path().join("index.jsonl").exists());
}

#[test]
fn test_invalid_config_exits_config_error() {
    let snap = TestSnapshot::cloud_city();
    let config = snap.add_file("bad.toml", "[split]\nmax_size = 0\n");
    let config = config.to_string_lossy().to_string();
    let out = outputs(&snap);
    let mut args = build_args(&out, "2024-06-01");
    args.extend(["--config", config.as_str()]);

    let (code, stderr) = snap.run_cli_failure(&args);
    assert_eq!(code, Some(2));
    assert_contains(&stderr, "max_size");
}

#[test]
fn test_invalid_as_of_exits_config_error() {
    let snap = TestSnapshot::cloud_city();
    let out = outputs(&snap);
    let (code, stderr) = snap.run_cli_failure(&build_args(&out, "June 1st"));
    assert_contains(&stderr, "Invalid --as-of date");
    assert_eq!(code, Some(2));
}
