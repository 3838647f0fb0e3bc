//! Portfolio table export.
//!
//! Each terminal portfolio becomes one [`PortfolioRow`]. Rows are written to
//! a SQLite table (the registry read by the landlord lookup site) and can be
//! dumped as a JSON array for offline inspection. Both writers build the
//! complete artifact beside the target and rename it into place, so a
//! published table is always fully replaced, never patched.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use petgraph::graph::NodeIndex;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{PortfolioError, Result};
use crate::fs_utils::{
    atomic_rename, ensure_parent_dir, remove_sidecars, restore_backup, swap_in_with_backup,
    temp_path_for,
};
use crate::graph::OwnerGraph;
use crate::schema::Bbl;
use crate::split::PortfolioComponent;

/// One row of the published portfolio table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRow {
    /// Connected component id, shared by every community split from it
    pub orig_id: u32,
    /// Unique id, e.g. `"7"` or `"7.2"`
    pub portfolio_id: String,
    /// Sorted, unique
    pub bbls: Vec<Bbl>,
    /// Sorted, unique canonical names
    pub landlord_names: Vec<String>,
    /// Node-link graph for the portfolio visualization
    pub graph: Value,
}

impl PortfolioRow {
    pub fn from_component(graph: &OwnerGraph, component: &PortfolioComponent) -> Self {
        Self {
            orig_id: component.orig_id,
            portfolio_id: component.portfolio_id.to_string(),
            bbls: component.bbls.iter().cloned().collect(),
            landlord_names: component.landlord_names.iter().cloned().collect(),
            graph: graph_json(graph, &component.nodes),
        }
    }
}

/// Node-link JSON for the subgraph induced by `nodes`
///
/// Node ids are 1-based in node-index order; edges are listed by ascending
/// endpoint ids and carry the number of registration contacts behind them:
///
/// ```json
/// {"nodes": [{"id": 1, "value": {"Name": "LOBOT JONES"}}, ...],
///  "edges": [{"from": 1, "to": 2, "reg_contacts": 3}, ...]}
/// ```
pub fn graph_json(graph: &OwnerGraph, nodes: &[NodeIndex]) -> Value {
    let members: BTreeSet<NodeIndex> = nodes.iter().copied().collect();
    let ids: BTreeMap<NodeIndex, usize> = members
        .iter()
        .enumerate()
        .map(|(i, idx)| (*idx, i + 1))
        .collect();

    let node_values: Vec<Value> = members
        .iter()
        .map(|idx| json!({ "id": ids[idx], "value": graph.node(*idx).key }))
        .collect();

    let edge_values: Vec<Value> = graph
        .edges_within(&members)
        .into_iter()
        .map(|(a, b, evidence)| {
            json!({
                "from": ids[&a],
                "to": ids[&b],
                "reg_contacts": evidence.registrations.len(),
            })
        })
        .collect();

    json!({ "nodes": node_values, "edges": edge_values })
}

/// Table export statistics
#[derive(Debug, Clone, Serialize)]
pub struct TableExportStats {
    pub rows_inserted: usize,
    pub bbl_links_inserted: usize,
    pub duration_ms: u64,
    pub output_path: String,
    pub file_size_bytes: u64,
}

/// Destination of the portfolio table
///
/// Publishing is two-phase. [`stage`](Self::stage) builds the replacement
/// without touching the live table and [`commit`](Self::commit) swaps it in.
/// After a commit, [`rollback`](Self::rollback) puts the previous table back
/// until [`discard`](Self::discard) drops it.
pub trait PortfolioTableSink {
    /// Build the replacement table for `rows`; the live table is untouched
    fn stage(&self, rows: &[PortfolioRow]) -> Result<TableExportStats>;

    /// Make the staged table live
    fn commit(&self) -> Result<()>;

    /// Restore the table that was live before the last commit
    fn rollback(&self) -> Result<()>;

    /// Drop any staged table and any table kept for rollback
    fn discard(&self);

    /// Stage and commit in one step
    fn replace_all(&self, rows: &[PortfolioRow]) -> Result<TableExportStats> {
        let stats = self.stage(rows).and_then(|stats| self.commit().map(|_| stats));
        self.discard();
        stats
    }
}

/// SQLite portfolio table, replaced wholesale on every publish
pub struct SqlitePortfolioTable {
    path: PathBuf,
    batch_size: usize,
}

impl SqlitePortfolioTable {
    /// Table at `path` with the default batch size (5000)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch_size: 5000,
        }
    }

    /// Set the number of rows per insert transaction
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE schema_info (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            INSERT INTO schema_info VALUES ('version', '1.0');
            INSERT INTO schema_info VALUES ('created_at', datetime('now'));
            INSERT INTO schema_info VALUES ('generator', 'portfoliograph');

            -- One row per terminal portfolio; arrays and graph are JSON text
            CREATE TABLE wow_portfolios (
                orig_id INTEGER NOT NULL,
                portfolio_id TEXT PRIMARY KEY,
                bbls TEXT NOT NULL,
                landlord_names TEXT NOT NULL,
                graph TEXT NOT NULL
            );

            -- BBL to portfolio lookup
            CREATE TABLE wow_portfolio_bbls (
                bbl TEXT NOT NULL,
                portfolio_id TEXT NOT NULL,
                PRIMARY KEY (bbl, portfolio_id)
            );
            "#,
        )
        .map_err(|e| PortfolioError::export(format!("Failed to create schema: {}", e)))
    }

    fn create_indexes(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE INDEX idx_wow_portfolios_orig_id ON wow_portfolios(orig_id);
            CREATE INDEX idx_wow_portfolio_bbls_portfolio ON wow_portfolio_bbls(portfolio_id);
            "#,
        )
        .map_err(|e| PortfolioError::export(format!("Failed to create indexes: {}", e)))
    }

    /// Insert one batch of rows in a single transaction; returns BBL links
    fn flush_batch(conn: &mut Connection, batch: &[PortfolioRow]) -> Result<usize> {
        let tx = conn
            .transaction()
            .map_err(|e| PortfolioError::export(format!("Transaction failed: {}", e)))?;
        let mut links = 0;

        {
            let mut row_stmt = tx
                .prepare_cached(
                    "INSERT INTO wow_portfolios
                     (orig_id, portfolio_id, bbls, landlord_names, graph)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| PortfolioError::export(format!("Prepare failed: {}", e)))?;
            let mut link_stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO wow_portfolio_bbls (bbl, portfolio_id) VALUES (?1, ?2)",
                )
                .map_err(|e| PortfolioError::export(format!("Prepare failed: {}", e)))?;

            for row in batch {
                row_stmt
                    .execute(params![
                        row.orig_id as i64,
                        row.portfolio_id,
                        to_json_text(&row.bbls)?,
                        to_json_text(&row.landlord_names)?,
                        to_json_text(&row.graph)?,
                    ])
                    .map_err(|e| {
                        PortfolioError::export(format!(
                            "Insert of portfolio {} failed: {}",
                            row.portfolio_id, e
                        ))
                    })?;

                for bbl in &row.bbls {
                    links += link_stmt
                        .execute(params![bbl.as_str(), row.portfolio_id])
                        .map_err(|e| PortfolioError::export(format!("Insert failed: {}", e)))?;
                }
            }
        }

        tx.commit()
            .map_err(|e| PortfolioError::export(format!("Commit failed: {}", e)))?;
        Ok(links)
    }

    fn write_to(&self, tmp: &Path, rows: &[PortfolioRow]) -> Result<(usize, usize)> {
        let mut conn = Connection::open(tmp).map_err(|e| {
            PortfolioError::export(format!("Failed to create SQLite database: {}", e))
        })?;

        Self::create_schema(&conn)?;

        let mut inserted = 0;
        let mut links = 0;
        for batch in rows.chunks(self.batch_size) {
            links += Self::flush_batch(&mut conn, batch)?;
            inserted += batch.len();
            debug!(inserted, total = rows.len(), "Inserted portfolio batch");
        }

        Self::create_indexes(&conn)?;
        conn.close()
            .map_err(|(_, e)| PortfolioError::export(format!("Close failed: {}", e)))?;
        Ok((inserted, links))
    }

    /// Portfolios containing `bbl`, from the published table
    pub fn portfolios_for_bbl(&self, bbl: &Bbl) -> Result<Vec<PortfolioRow>> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| PortfolioError::export(format!("Failed to open table: {}", e)))?;
        let mut stmt = conn
            .prepare(
                "SELECT p.orig_id, p.portfolio_id, p.bbls, p.landlord_names, p.graph
                 FROM wow_portfolio_bbls b
                 JOIN wow_portfolios p ON p.portfolio_id = b.portfolio_id
                 WHERE b.bbl = ?1
                 ORDER BY p.portfolio_id",
            )
            .map_err(|e| PortfolioError::export(format!("Prepare failed: {}", e)))?;

        let raw = stmt
            .query_map(params![bbl.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| PortfolioError::export(format!("Query failed: {}", e)))?;

        let mut rows = Vec::new();
        for entry in raw {
            let (orig_id, portfolio_id, bbls, names, graph) =
                entry.map_err(|e| PortfolioError::export(format!("Row read failed: {}", e)))?;
            rows.push(PortfolioRow {
                orig_id: orig_id as u32,
                portfolio_id,
                bbls: from_json_text(&bbls)?,
                landlord_names: from_json_text(&names)?,
                graph: from_json_text(&graph)?,
            });
        }
        Ok(rows)
    }
}

impl PortfolioTableSink for SqlitePortfolioTable {
    fn stage(&self, rows: &[PortfolioRow]) -> Result<TableExportStats> {
        let start = Instant::now();
        ensure_parent_dir(&self.path)?;

        let tmp = temp_path_for(&self.path);
        if tmp.exists() {
            fs::remove_file(&tmp)?;
        }

        let (rows_inserted, bbl_links_inserted) = match self.write_to(&tmp, rows) {
            Ok(counts) => counts,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };

        let file_size_bytes = fs::metadata(&tmp).map(|m| m.len()).unwrap_or(0);
        let stats = TableExportStats {
            rows_inserted,
            bbl_links_inserted,
            duration_ms: start.elapsed().as_millis() as u64,
            output_path: self.path.display().to_string(),
            file_size_bytes,
        };
        debug!(
            rows = stats.rows_inserted,
            path = %stats.output_path,
            duration_ms = stats.duration_ms,
            "Staged portfolio table"
        );
        Ok(stats)
    }

    fn commit(&self) -> Result<()> {
        swap_in_with_backup(&temp_path_for(&self.path), &self.path).map_err(|e| {
            PortfolioError::export(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;
        info!(path = %self.path.display(), "Replaced portfolio table");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        restore_backup(&self.path).map_err(|e| {
            PortfolioError::export(format!(
                "Failed to restore {}: {}",
                self.path.display(),
                e
            ))
        })?;
        warn!(path = %self.path.display(), "Restored previous portfolio table");
        Ok(())
    }

    fn discard(&self) {
        if let Err(e) = remove_sidecars(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to clean up staged table");
        }
    }
}

fn to_json_text<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| PortfolioError::export(format!("JSON encode failed: {}", e)))
}

fn from_json_text<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| PortfolioError::export(format!("JSON decode failed: {}", e)))
}

/// Write rows as a JSON array, one row per line after the opening bracket
pub fn write_portfolios_json<W: Write>(rows: &[PortfolioRow], mut writer: W) -> Result<()> {
    writer.write_all(b"[\n")?;
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            writer.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut writer, row)
            .map_err(|e| PortfolioError::export(format!("JSON encode failed: {}", e)))?;
    }
    writer.write_all(b"]\n")?;
    writer.flush()?;
    Ok(())
}

/// [`write_portfolios_json`] into a file, replaced atomically
pub fn write_portfolios_json_file(rows: &[PortfolioRow], path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let tmp = temp_path_for(path);
    let written = fs::File::create(&tmp)
        .map_err(PortfolioError::from)
        .and_then(|file| write_portfolios_json(rows, BufWriter::new(file)));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    atomic_rename(&tmp, path)?;
    info!(rows = rows.len(), path = %path.display(), "Wrote portfolios JSON");
    Ok(())
}
