//! Common test utilities and fixtures for portfoliograph integration tests
//!
//! This module provides:
//! - `TestSnapshot` builder for NYCDB-shaped SQLite snapshots
//! - Custom assertions for validating CLI output and published artifacts

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod assertions;
pub mod test_snapshot;

pub use assertions::*;
pub use test_snapshot::{Contact, TestSnapshot};
