//! CLI command integration tests
//!
//! Each test runs the built binary against a temp snapshot and checks its
//! output, exit code and published artifacts.

pub mod build_tests;
pub mod config_tests;
pub mod export_json_tests;
