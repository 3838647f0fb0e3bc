//! Batch pipeline: snapshot rows in, portfolio table and search index out.
//!
//! [`Pipeline::run`] is pure with respect to its inputs. It reads one
//! snapshot, standardizes, extracts, builds the identity graph, splits it into
//! portfolios and renders both output artifacts in memory. Nothing is
//! published until [`Pipeline::publish`], so a batch that fails anywhere
//! upstream leaves the previously published artifacts untouched.

use std::collections::BTreeSet;

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PortfolioError, Result};
use crate::export::{PortfolioRow, PortfolioTableSink, TableExportStats};
use crate::extract::{extract_contacts, ExtractOptions};
use crate::graph::OwnerGraph;
use crate::search_index::{records_for, IndexPublishStats, SearchIndexRecord, SearchIndexSink};
use crate::source::ContactSource;
use crate::split::{split_portfolios, SplitOptions};
use crate::standardize::{standardize_rows, AddressStandardizer};

/// Pipeline phases reported to a progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Fetching,
    Standardizing,
    Extracting,
    BuildingGraph,
    Splitting,
    Rendering,
    PublishingTable,
    PublishingIndex,
}

impl PipelinePhase {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Fetching => "Fetching registration contacts",
            Self::Standardizing => "Standardizing business addresses",
            Self::Extracting => "Extracting owner contacts",
            Self::BuildingGraph => "Building identity graph",
            Self::Splitting => "Splitting portfolios",
            Self::Rendering => "Rendering portfolio rows",
            Self::PublishingTable => "Publishing portfolio table",
            Self::PublishingIndex => "Publishing search index",
        }
    }
}

/// Progress callback type for phase reporting
pub type ProgressCallback = Box<dyn Fn(PipelinePhase) + Send + Sync>;

/// Counts for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub rows_read: usize,
    pub non_owner_dropped: usize,
    pub expired_dropped: usize,
    pub superseded_dropped: usize,
    pub malformed_dropped: usize,
    pub contacts_kept: usize,
    pub nodes: usize,
    pub edges: usize,
    pub components: usize,
    pub oversized_components: usize,
    pub portfolios: usize,
    pub degenerate_splits: usize,
    pub index_records: usize,
    /// Digest of the identity graph; equal across runs over the same snapshot
    pub graph_fingerprint: String,
}

/// Everything one run produces, ready to publish
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioBatch {
    pub rows: Vec<PortfolioRow>,
    pub index_records: Vec<SearchIndexRecord>,
    pub stats: BatchStats,
}

/// Outcome of a successful publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub table: TableExportStats,
    pub index: IndexPublishStats,
    pub attempts: u32,
}

pub struct Pipeline {
    config: PipelineConfig,
    as_of: NaiveDate,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    /// Pipeline with the expiration window measured from today
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            as_of: Local::now().date_naive(),
            progress: None,
        }
    }

    /// Measure the expiration window from `as_of` instead of today
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    fn report(&self, phase: PipelinePhase) {
        debug!(phase = phase.description(), "Pipeline phase");
        if let Some(ref cb) = self.progress {
            cb(phase);
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        let extract = &self.config.extract;
        ExtractOptions {
            allowed_types: extract.allowed_contact_types.iter().copied().collect(),
            max_expiration_age: self
                .config
                .max_expiration_age_days()
                .map(|days| Duration::days(i64::from(days))),
            as_of: self.as_of,
        }
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            max_size: self.config.split.max_size,
            resolution: self.config.split.resolution,
        }
    }

    /// Run the batch up to, but not including, publishing
    pub fn run(
        &self,
        source: &mut dyn ContactSource,
        standardizer: &dyn AddressStandardizer,
    ) -> Result<PortfolioBatch> {
        self.report(PipelinePhase::Fetching);
        let rows = source.fetch_rows()?;

        self.report(PipelinePhase::Standardizing);
        let rows = standardize_rows(rows, standardizer)?;

        self.report(PipelinePhase::Extracting);
        let (contacts, extract_stats) = extract_contacts(&rows, &self.extract_options());

        self.report(PipelinePhase::BuildingGraph);
        let graph = OwnerGraph::build(&contacts);

        self.report(PipelinePhase::Splitting);
        let (portfolios, split_stats) = split_portfolios(&graph, &self.split_options());

        self.report(PipelinePhase::Rendering);
        let rows: Vec<PortfolioRow> = portfolios
            .iter()
            .map(|p| PortfolioRow::from_component(&graph, p))
            .collect();
        let index_records = self.index_records(&rows);

        let stats = BatchStats {
            rows_read: extract_stats.rows_read,
            non_owner_dropped: extract_stats.not_owner_type,
            expired_dropped: extract_stats.expired,
            superseded_dropped: extract_stats.superseded,
            malformed_dropped: extract_stats.malformed,
            contacts_kept: extract_stats.contacts,
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            components: split_stats.components,
            oversized_components: split_stats.oversized_components,
            portfolios: split_stats.portfolios,
            degenerate_splits: split_stats.degenerate_splits,
            index_records: index_records.len(),
            graph_fingerprint: graph.fingerprint(),
        };

        info!(
            rows_read = stats.rows_read,
            contacts = stats.contacts_kept,
            portfolios = stats.portfolios,
            index_records = stats.index_records,
            fingerprint = %stats.graph_fingerprint,
            "Batch complete"
        );

        Ok(PortfolioBatch {
            rows,
            index_records,
            stats,
        })
    }

    /// Index records for every row, first occurrence of each object id kept
    fn index_records(&self, rows: &[PortfolioRow]) -> Vec<SearchIndexRecord> {
        let max_len = self.config.search_index.max_record_len;
        let mut seen = BTreeSet::new();
        let mut records = Vec::new();
        for record in rows.iter().flat_map(|row| records_for(row, max_len)) {
            if seen.insert(record.object_id.clone()) {
                records.push(record);
            } else {
                debug!(object_id = %record.object_id, "Skipping duplicate index record");
            }
        }
        records
    }

    /// Replace the portfolio table and the search index together
    ///
    /// Both artifacts are staged before either goes live, so a failed
    /// publish leaves both previously published artifacts in place. The
    /// whole phase is retried when the index rejects the publish, up to
    /// `search_index.publish_retries` attempts in total; any other failure
    /// ends the publish immediately.
    pub fn publish(
        &self,
        batch: &PortfolioBatch,
        table: &dyn PortfolioTableSink,
        index: &mut dyn SearchIndexSink,
    ) -> Result<PublishReport> {
        let attempts = self.config.search_index.publish_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.publish_once(batch, table, index) {
                Ok((table, index)) => {
                    info!(
                        rows = table.rows_inserted,
                        records = index.records_published,
                        attempts = attempt,
                        "Published portfolio table and search index"
                    );
                    return Ok(PublishReport {
                        table,
                        index,
                        attempts: attempt,
                    });
                }
                Err(PortfolioError::IndexPublishFailure { message }) if attempt < attempts => {
                    warn!(attempt, max_attempts = attempts, %message, "Index publish failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn publish_once(
        &self,
        batch: &PortfolioBatch,
        table: &dyn PortfolioTableSink,
        index: &mut dyn SearchIndexSink,
    ) -> Result<(TableExportStats, IndexPublishStats)> {
        let published = self
            .stage_both(batch, table, index)
            .and_then(|staged| Self::commit_both(table, index).map(|_| staged));
        table.discard();
        index.discard();
        published
    }

    fn stage_both(
        &self,
        batch: &PortfolioBatch,
        table: &dyn PortfolioTableSink,
        index: &mut dyn SearchIndexSink,
    ) -> Result<(TableExportStats, IndexPublishStats)> {
        self.report(PipelinePhase::PublishingTable);
        let table_stats = table.stage(&batch.rows)?;
        self.report(PipelinePhase::PublishingIndex);
        let index_stats = index.stage(&batch.index_records)?;
        Ok((table_stats, index_stats))
    }

    /// Swap in the table, then the index; a failed index swap puts the
    /// previous table back
    fn commit_both(table: &dyn PortfolioTableSink, index: &mut dyn SearchIndexSink) -> Result<()> {
        table.commit()?;
        if let Err(e) = index.commit() {
            if let Err(restore) = table.rollback() {
                error!(error = %restore, "Failed to restore previous portfolio table");
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RawContactRow, VecSource};
    use crate::standardize::Passthrough;
    use std::cell::Cell;
    use std::sync::{Arc, Mutex};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn raw(reg: i64, bbl: &str, first: &str, last: &str, house: &str) -> RawContactRow {
        RawContactRow {
            registration_id: reg,
            registration_contact_id: reg * 10,
            bbl: bbl.to_string(),
            contact_type: "IndividualOwner".into(),
            firstname: Some(first.into()),
            lastname: Some(last.into()),
            business_house_number: Some(house.into()),
            business_street_name: Some("BESPIN AVE".into()),
            business_city: Some("BROOKLYN".into()),
            business_state: Some("NY".into()),
            registration_end_date: Some(date("2025-01-01")),
            ..Default::default()
        }
    }

    fn source() -> VecSource {
        VecSource::new(vec![
            raw(1, "3000010001", "LOBOT", "JONES", "5"),
            raw(2, "3000010002", "LANDLORDO", "CALRISSIAN", "5"),
            raw(3, "1000010001", "HAN", "SOLO", "1"),
        ])
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default()).with_as_of(date("2024-06-01"))
    }

    #[derive(Default)]
    struct MemoryTable {
        live: Mutex<Vec<PortfolioRow>>,
        staged: Mutex<Option<Vec<PortfolioRow>>>,
        previous: Mutex<Option<Vec<PortfolioRow>>>,
    }

    impl PortfolioTableSink for MemoryTable {
        fn stage(&self, rows: &[PortfolioRow]) -> Result<TableExportStats> {
            *self.staged.lock().unwrap() = Some(rows.to_vec());
            Ok(TableExportStats {
                rows_inserted: rows.len(),
                bbl_links_inserted: 0,
                duration_ms: 0,
                output_path: "memory".into(),
                file_size_bytes: 0,
            })
        }

        fn commit(&self) -> Result<()> {
            let staged = self.staged.lock().unwrap().take().unwrap_or_default();
            let old = std::mem::replace(&mut *self.live.lock().unwrap(), staged);
            *self.previous.lock().unwrap() = Some(old);
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            if let Some(old) = self.previous.lock().unwrap().take() {
                *self.live.lock().unwrap() = old;
            }
            Ok(())
        }

        fn discard(&self) {
            *self.staged.lock().unwrap() = None;
            *self.previous.lock().unwrap() = None;
        }
    }

    /// Rejects the first `failures` stages, and every commit when
    /// `reject_commit` is set
    #[derive(Default)]
    struct FlakyIndex {
        failures: Cell<u32>,
        reject_commit: bool,
        staged: Option<Vec<SearchIndexRecord>>,
        published: Vec<SearchIndexRecord>,
    }

    impl FlakyIndex {
        fn failing(failures: u32) -> Self {
            Self {
                failures: Cell::new(failures),
                ..Default::default()
            }
        }
    }

    impl SearchIndexSink for FlakyIndex {
        fn stage(&mut self, records: &[SearchIndexRecord]) -> Result<IndexPublishStats> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(PortfolioError::IndexPublishFailure {
                    message: "503 from index".into(),
                });
            }
            self.staged = Some(records.to_vec());
            Ok(IndexPublishStats {
                records_published: records.len(),
                output_path: "memory".into(),
            })
        }

        fn commit(&mut self) -> Result<()> {
            if self.reject_commit {
                return Err(PortfolioError::IndexPublishFailure {
                    message: "move rejected".into(),
                });
            }
            self.published = self.staged.take().unwrap_or_default();
            Ok(())
        }

        fn discard(&mut self) {
            self.staged = None;
        }
    }

    #[test]
    fn test_run_produces_rows_and_records() {
        let batch = pipeline().run(&mut source(), &Passthrough).unwrap();
        assert_eq!(batch.stats.rows_read, 3);
        assert_eq!(batch.stats.contacts_kept, 3);
        assert_eq!(batch.stats.portfolios, 2);
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].landlord_names, vec!["LANDLORDO CALRISSIAN", "LOBOT JONES"]);
        assert_eq!(batch.index_records.len(), 2);
        assert_eq!(batch.index_records[1].landlord_names, "HAN SOLO");
    }

    #[test]
    fn test_run_is_idempotent() {
        let p = pipeline();
        let a = p.run(&mut source(), &Passthrough).unwrap();
        let b = p.run(&mut source(), &Passthrough).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.stats.graph_fingerprint, b.stats.graph_fingerprint);
    }

    #[test]
    fn test_config_drives_extraction_window() {
        let mut config = PipelineConfig::default();
        config.extract.max_expiration_age_days = Some(0);
        let p = Pipeline::new(config).with_as_of(date("2030-01-01"));
        assert_eq!(p.extract_options().max_expiration_age, None);
        let batch = p.run(&mut source(), &Passthrough).unwrap();
        assert_eq!(batch.stats.expired_dropped, 0);
        assert_eq!(batch.stats.contacts_kept, 3);

        let expired = Pipeline::new(PipelineConfig::default())
            .with_as_of(date("2030-01-01"))
            .run(&mut source(), &Passthrough)
            .unwrap();
        assert_eq!(expired.stats.expired_dropped, 3);
        assert!(expired.rows.is_empty());
    }

    #[test]
    fn test_publish_retries_index_failures() {
        let p = pipeline();
        let batch = p.run(&mut source(), &Passthrough).unwrap();
        let table = MemoryTable::default();
        let mut index = FlakyIndex::failing(2);

        let report = p.publish(&batch, &table, &mut index).unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(index.published, batch.index_records);
        assert_eq!(*table.live.lock().unwrap(), batch.rows);
        assert!(table.staged.lock().unwrap().is_none());
    }

    #[test]
    fn test_publish_gives_up_after_configured_attempts() {
        let p = pipeline();
        let batch = p.run(&mut source(), &Passthrough).unwrap();
        let table = MemoryTable::default();
        let mut index = FlakyIndex::failing(5);
        let err = p.publish(&batch, &table, &mut index).unwrap_err();
        assert!(matches!(err, PortfolioError::IndexPublishFailure { .. }));
        assert_eq!(index.failures.get(), 2);
        assert!(index.published.is_empty());
        assert!(table.live.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_index_publish_keeps_previous_table() {
        let p = pipeline();
        let first = p.run(&mut source(), &Passthrough).unwrap();
        let table = MemoryTable::default();
        let mut index = FlakyIndex::default();
        p.publish(&first, &table, &mut index).unwrap();

        let second = p
            .run(
                &mut VecSource::new(vec![raw(9, "4000010001", "BOBA", "FETT", "9")]),
                &Passthrough,
            )
            .unwrap();
        index.failures.set(u32::MAX);
        p.publish(&second, &table, &mut index).unwrap_err();
        assert_eq!(*table.live.lock().unwrap(), first.rows);
        assert_eq!(index.published, first.index_records);

        // A rejected swap of the index puts the previous table back.
        index.failures.set(0);
        index.reject_commit = true;
        p.publish(&second, &table, &mut index).unwrap_err();
        assert_eq!(*table.live.lock().unwrap(), first.rows);
        assert_eq!(index.published, first.index_records);
    }

    #[test]
    fn test_upstream_failure_fails_batch() {
        struct Down;
        impl ContactSource for Down {
            fn fetch_rows(&mut self) -> Result<Vec<RawContactRow>> {
                Err(PortfolioError::upstream("connection refused"))
            }
        }
        let err = pipeline().run(&mut Down, &Passthrough).unwrap_err();
        assert!(matches!(err, PortfolioError::UpstreamUnavailable { .. }));
    }

    #[test]
    fn test_progress_reports_each_phase() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let p = pipeline().with_progress(Box::new(move |phase| sink.lock().unwrap().push(phase)));
        p.run(&mut source(), &Passthrough).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&PipelinePhase::Fetching));
        assert_eq!(seen.last(), Some(&PipelinePhase::Rendering));
        assert_eq!(seen.len(), 6);
    }
}
