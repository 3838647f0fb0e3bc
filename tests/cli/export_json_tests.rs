//! Tests for the `export-json` CLI command

use crate::common::{assert_contains, assert_json_type, assert_valid_json, TestSnapshot};

#[test]
fn test_export_json_to_stdout() {
    let snap = TestSnapshot::cloud_city();
    let output = snap.run_cli_success(&[
        "export-json",
        "--snapshot",
        "snapshot.db",
        "--as-of",
        "2024-06-01",
    ]);

    assert!(output.starts_with("[\n"));
    let json = assert_valid_json(&output, "export-json stdout");
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["orig_id"], 1);
    assert_eq!(rows[0]["portfolio_id"], "1");
    assert_eq!(rows[0]["bbls"][0], "3000010001");
    assert_eq!(rows[0]["graph"]["nodes"][0]["value"]["Name"], "LOBOT JONES");

    // Nothing is published.
    assert!(!snap.path().join("wow_portfolios.db").exists());
}

#[test]
fn test_export_json_to_file() {
    let snap = TestSnapshot::cloud_city();
    let path = snap.out("portfolios.json");
    let output = snap.run_cli_success(&[
        "export-json",
        "--snapshot",
        "snapshot.db",
        "--as-of",
        "2024-06-01",
        "--output",
        &path,
        "-f",
        "json",
    ]);
    let json = assert_valid_json(&output, "export-json summary");
    assert_json_type(&json, "export_json");
    assert_eq!(json["portfolios"], 3);

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(assert_valid_json(&written, "file").as_array().unwrap().len(), 3);
}

#[test]
fn test_export_json_text_summary() {
    let snap = TestSnapshot::cloud_city();
    let path = snap.out("portfolios.json");
    let output = snap.run_cli_success(&[
        "export-json",
        "--snapshot",
        "snapshot.db",
        "--output",
        &path,
        "--as-of",
        "2024-06-01",
    ]);
    assert_contains(&output, "Wrote 3 portfolios");
}
