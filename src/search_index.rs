//! Landlord search index feed.
//!
//! One record per portfolio, keyed by the portfolio's smallest BBL, with the
//! landlord names joined into a single searchable string. Records whose
//! joined names would exceed the index's per-record limit are split into
//! several records sharing the same `portfolio_bbl`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PortfolioError, Result};
use crate::export::PortfolioRow;
use crate::fs_utils::{atomic_rename, ensure_parent_dir, remove_sidecars, temp_path_for};
use crate::schema::{fnv1a_hash, Bbl};

/// Separator between names in `landlord_names`
pub const NAME_SEPARATOR: &str = ", ";

/// One search index object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexRecord {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub portfolio_bbl: Bbl,
    pub landlord_names: String,
}

impl SearchIndexRecord {
    pub fn new(portfolio_bbl: Bbl, landlord_names: String) -> Self {
        Self {
            object_id: object_id(&portfolio_bbl, &landlord_names),
            portfolio_bbl,
            landlord_names,
        }
    }
}

/// Content-derived object id
///
/// FNV-1a 64 of the sorted-key JSON encoding of
/// `{"landlord_names": .., "portfolio_bbl": ..}`, as 16 hex digits. The same
/// record content always gets the same id, across runs and platforms.
pub fn object_id(portfolio_bbl: &Bbl, landlord_names: &str) -> String {
    let mut content: BTreeMap<&str, &str> = BTreeMap::new();
    content.insert("landlord_names", landlord_names);
    content.insert("portfolio_bbl", portfolio_bbl.as_str());
    // A map of strings always encodes.
    let encoded = serde_json::to_string(&content).unwrap_or_default();
    format!("{:016x}", fnv1a_hash(&encoded))
}

/// Split `names` into `chunks` contiguous, roughly equal slices
///
/// The first `len % chunks` slices hold one extra name. Never returns more
/// slices than there are names; an empty list yields one empty slice.
pub fn chunk_names(names: &[String], chunks: usize) -> Vec<&[String]> {
    let chunks = chunks.clamp(1, names.len().max(1));
    let base = names.len() / chunks;
    let extra = names.len() % chunks;

    let mut out = Vec::with_capacity(chunks);
    let mut start = 0;
    for i in 0..chunks {
        let len = base + usize::from(i < extra);
        out.push(&names[start..start + len]);
        start += len;
    }
    out
}

/// Index records for one portfolio row
///
/// Rows with no BBLs emit nothing. When the joined names are longer than
/// `max_len` characters the sorted name list is split into
/// `ceil(len / max_len)` chunks; a chunk holding one very long name may still
/// exceed `max_len`.
pub fn records_for(row: &PortfolioRow, max_len: usize) -> Vec<SearchIndexRecord> {
    let Some(portfolio_bbl) = row.bbls.iter().min() else {
        return Vec::new();
    };

    let joined = row.landlord_names.join(NAME_SEPARATOR);
    let len = joined.chars().count();
    if len <= max_len {
        return vec![SearchIndexRecord::new(portfolio_bbl.clone(), joined)];
    }

    let chunks = len.div_ceil(max_len.max(1));
    chunk_names(&row.landlord_names, chunks)
        .into_iter()
        .map(|names| SearchIndexRecord::new(portfolio_bbl.clone(), names.join(NAME_SEPARATOR)))
        .collect()
}

/// Index publish statistics
#[derive(Debug, Clone, Serialize)]
pub struct IndexPublishStats {
    pub records_published: usize,
    pub output_path: String,
}

/// Destination of the search index feed
///
/// Like the portfolio table, publishing is staged first and committed once
/// every artifact of the batch has been staged.
pub trait SearchIndexSink {
    /// Upload `records` as the replacement index; the live index is untouched
    fn stage(&mut self, records: &[SearchIndexRecord]) -> Result<IndexPublishStats>;

    /// Atomically replace every object in the live index with the staged ones
    fn commit(&mut self) -> Result<()>;

    /// Drop anything staged
    fn discard(&mut self);

    /// Stage and commit in one step
    fn replace_all(&mut self, records: &[SearchIndexRecord]) -> Result<IndexPublishStats> {
        let stats = self
            .stage(records)
            .and_then(|stats| self.commit().map(|_| stats));
        self.discard();
        stats
    }
}

/// Newline-delimited JSON feed, one record per line
pub struct JsonLinesIndex {
    path: PathBuf,
}

impl JsonLinesIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_to(&self, tmp: &Path, records: &[SearchIndexRecord]) -> Result<()> {
        let mut writer = BufWriter::new(fs::File::create(tmp)?);
        for record in records {
            serde_json::to_writer(&mut writer, record)
                .map_err(|e| PortfolioError::export(format!("JSON encode failed: {}", e)))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read back a published feed
    pub fn read_records(&self) -> Result<Vec<SearchIndexRecord>> {
        fs::read_to_string(&self.path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| PortfolioError::export(format!("JSON decode failed: {}", e)))
            })
            .collect()
    }
}

impl JsonLinesIndex {
    fn publish_failure(&self, e: impl std::fmt::Display) -> PortfolioError {
        PortfolioError::IndexPublishFailure {
            message: format!("{}: {}", self.path.display(), e),
        }
    }
}

impl SearchIndexSink for JsonLinesIndex {
    fn stage(&mut self, records: &[SearchIndexRecord]) -> Result<IndexPublishStats> {
        ensure_parent_dir(&self.path).map_err(|e| self.publish_failure(e))?;
        let tmp = temp_path_for(&self.path);
        if let Err(e) = self.write_to(&tmp, records) {
            let _ = fs::remove_file(&tmp);
            return Err(self.publish_failure(e));
        }
        Ok(IndexPublishStats {
            records_published: records.len(),
            output_path: self.path.display().to_string(),
        })
    }

    fn commit(&mut self) -> Result<()> {
        atomic_rename(&temp_path_for(&self.path), &self.path)
            .map_err(|e| self.publish_failure(e))?;
        info!(path = %self.path.display(), "Replaced search index feed");
        Ok(())
    }

    fn discard(&mut self) {
        if let Err(e) = remove_sidecars(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to clean up staged feed");
        }
    }
}
