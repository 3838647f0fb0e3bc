//! Tests for the `config` CLI command

use crate::common::{assert_contains, assert_valid_json, TestSnapshot};

#[test]
fn test_config_show_defaults() {
    let snap = TestSnapshot::new();
    let output = snap.run_cli_success(&["config", "show"]);
    assert_contains(&output, "[split]");
    assert_contains(&output, "max_size = 300");
    assert_contains(&output, "resolution = 0.1");
}

#[test]
fn test_config_show_reads_default_file() {
    let snap = TestSnapshot::new();
    snap.add_file(
        "portfoliograph.toml",
        "[split]\nmax_size = 120\n\n[extract]\naddress_standardization = \"street_suffixes\"\n",
    );
    let output = snap.run_cli_success(&["config", "show", "-f", "json"]);
    let json = assert_valid_json(&output, "config show json");
    assert_eq!(json["split"]["max_size"], 120);
    assert_eq!(json["extract"]["address_standardization"], "street_suffixes");
    assert_eq!(json["search_index"]["publish_retries"], 3);
}

#[test]
fn test_config_show_missing_named_file() {
    let snap = TestSnapshot::new();
    let (code, stderr) = snap.run_cli_failure(&["config", "show", "--config", "nope.toml"]);
    assert_eq!(code, Some(2));
    assert_contains(&stderr, "Config file not found");
}
