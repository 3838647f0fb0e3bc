//! Custom assertions for integration tests

use std::collections::BTreeSet;
use std::path::Path;

use portfoliograph::{JsonLinesIndex, PortfolioRow, SearchIndexRecord};
use rusqlite::Connection;
use serde_json::Value;

/// Assert that output is valid JSON and return parsed value
pub fn assert_valid_json(output: &str, context: &str) -> Value {
    serde_json::from_str(output).unwrap_or_else(|e| {
        panic!(
            "Expected valid JSON ({}): {}\nOutput:\n{}",
            context, e, output
        )
    })
}

/// Assert that JSON output has expected type
pub fn assert_json_type(json: &Value, expected_type: &str) {
    let actual_type = json["_type"]
        .as_str()
        .unwrap_or_else(|| panic!("JSON missing '_type' field"));
    assert_eq!(
        actual_type, expected_type,
        "Expected JSON type '{}' but got '{}'",
        expected_type, actual_type
    );
}

/// Assert that output contains a substring
pub fn assert_contains(output: &str, expected: &str) {
    assert!(
        output.contains(expected),
        "Expected output to contain '{}'\nOutput:\n{}",
        expected,
        output
    );
}

/// Read every row of a published portfolio table, ordered by portfolio id
pub fn read_table(path: &Path) -> Vec<PortfolioRow> {
    let conn = Connection::open(path).expect("Failed to open portfolio table");
    let mut stmt = conn
        .prepare(
            "SELECT orig_id, portfolio_id, bbls, landlord_names, graph
             FROM wow_portfolios ORDER BY portfolio_id",
        )
        .expect("Failed to prepare table read");
    stmt.query_map([], |row| {
        let bbls: String = row.get(2)?;
        let names: String = row.get(3)?;
        let graph: String = row.get(4)?;
        Ok(PortfolioRow {
            orig_id: row.get::<_, i64>(0)? as u32,
            portfolio_id: row.get(1)?,
            bbls: serde_json::from_str(&bbls).expect("bbls JSON"),
            landlord_names: serde_json::from_str(&names).expect("names JSON"),
            graph: serde_json::from_str(&graph).expect("graph JSON"),
        })
    })
    .expect("Failed to read table")
    .collect::<Result<Vec<_>, _>>()
    .expect("Failed to read row")
}

/// Read a published search index feed
pub fn read_index(path: &Path) -> Vec<SearchIndexRecord> {
    JsonLinesIndex::new(path)
        .read_records()
        .expect("Failed to read search index feed")
}

/// The row whose BBLs include `bbl`
pub fn row_with_bbl<'a>(rows: &'a [PortfolioRow], bbl: &str) -> &'a PortfolioRow {
    rows.iter()
        .find(|r| r.bbls.iter().any(|b| b.as_str() == bbl))
        .unwrap_or_else(|| panic!("No portfolio contains BBL {}", bbl))
}

/// Assert portfolio ids are unique
pub fn assert_unique_portfolio_ids(rows: &[PortfolioRow]) {
    let ids: BTreeSet<&str> = rows.iter().map(|r| r.portfolio_id.as_str()).collect();
    assert_eq!(ids.len(), rows.len(), "Duplicate portfolio ids in {:?}", rows);
}
