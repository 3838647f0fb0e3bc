//! Snapshot sources: where raw registration contact rows come from.
//!
//! The pipeline depends only on the [`RawContactRow`] contract. Retries and
//! connection management belong to the backing store; any failure to read it
//! surfaces as [`PortfolioError::UpstreamUnavailable`] and fails the batch.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::error::{PortfolioError, Result};
use crate::schema::Bbl;

/// One registration contact joined to one building of its registration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawContactRow {
    pub registration_id: i64,
    pub registration_contact_id: i64,
    /// Padded BBL as the store reports it; unparseable values are dropped
    /// by the extractor
    pub bbl: String,
    pub contact_type: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub corporationname: Option<String>,
    pub business_house_number: Option<String>,
    pub business_street_name: Option<String>,
    pub business_apartment: Option<String>,
    pub business_city: Option<String>,
    pub business_state: Option<String>,
    pub business_zip: Option<String>,
    pub registration_end_date: Option<NaiveDate>,
}

impl RawContactRow {
    /// Stable key used to rejoin per-row work done out of scan order
    pub fn row_key(&self) -> (i64, i64, &str) {
        (self.registration_id, self.registration_contact_id, &self.bbl)
    }
}

/// A point-in-time snapshot of registrations and their contacts
pub trait ContactSource {
    /// Fetch every row of the snapshot in a fixed scan order
    fn fetch_rows(&mut self) -> Result<Vec<RawContactRow>>;
}

/// In-memory source
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    rows: Vec<RawContactRow>,
}

impl VecSource {
    pub fn new(rows: Vec<RawContactRow>) -> Self {
        Self { rows }
    }
}

impl ContactSource for VecSource {
    fn fetch_rows(&mut self) -> Result<Vec<RawContactRow>> {
        Ok(self.rows.clone())
    }
}

/// NYCDB-shaped SQLite snapshot with `hpd_registrations` and `hpd_contacts`
pub struct SqliteSnapshot {
    path: PathBuf,
}

const SNAPSHOT_QUERY: &str = r#"
    SELECT
        CAST(c.registrationid AS INTEGER),
        CAST(c.registrationcontactid AS INTEGER),
        CAST(r.boroid AS TEXT),
        CAST(r.block AS TEXT),
        CAST(r.lot AS TEXT),
        c.type,
        c.firstname,
        c.lastname,
        c.corporationname,
        c.businesshousenumber,
        c.businessstreetname,
        c.businessapartment,
        c.businesscity,
        c.businessstate,
        c.businesszip,
        r.registrationenddate
    FROM hpd_contacts c
    JOIN hpd_registrations r ON r.registrationid = c.registrationid
    ORDER BY
        CAST(c.registrationid AS INTEGER),
        CAST(c.registrationcontactid AS INTEGER),
        CAST(r.boroid AS INTEGER),
        CAST(r.block AS INTEGER),
        CAST(r.lot AS INTEGER)
"#;

impl SqliteSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(|e| {
            PortfolioError::upstream(format!(
                "Failed to open snapshot {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl ContactSource for SqliteSnapshot {
    fn fetch_rows(&mut self) -> Result<Vec<RawContactRow>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(SNAPSHOT_QUERY)
            .map_err(|e| PortfolioError::upstream(format!("Prepare failed: {}", e)))?;

        let mapped = stmt
            .query_map([], |row| {
                let boro: Option<String> = row.get(2)?;
                let block: Option<String> = row.get(3)?;
                let lot: Option<String> = row.get(4)?;
                let end_date: Option<String> = row.get(15)?;
                Ok(RawContactRow {
                    registration_id: row.get(0)?,
                    registration_contact_id: row.get(1)?,
                    bbl: assemble_bbl(boro.as_deref(), block.as_deref(), lot.as_deref()),
                    contact_type: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    firstname: row.get(6)?,
                    lastname: row.get(7)?,
                    corporationname: row.get(8)?,
                    business_house_number: row.get(9)?,
                    business_street_name: row.get(10)?,
                    business_apartment: row.get(11)?,
                    business_city: row.get(12)?,
                    business_state: row.get(13)?,
                    business_zip: row.get(14)?,
                    registration_end_date: end_date.as_deref().and_then(parse_registry_date),
                })
            })
            .map_err(|e| PortfolioError::upstream(format!("Snapshot query failed: {}", e)))?;

        let mut rows = Vec::new();
        for row in mapped {
            rows.push(
                row.map_err(|e| PortfolioError::upstream(format!("Snapshot row failed: {}", e)))?,
            );
        }

        info!(
            rows = rows.len(),
            snapshot = %self.path.display(),
            "Fetched registration contact rows"
        );
        Ok(rows)
    }
}

fn assemble_bbl(boro: Option<&str>, block: Option<&str>, lot: Option<&str>) -> String {
    match (boro, block, lot) {
        (Some(boro), Some(block), Some(lot)) => Bbl::from_parts(boro, block, lot)
            .map(|b| b.as_str().to_string())
            .unwrap_or_else(|| {
                debug!(boro, block, lot, "Unassemblable BBL");
                String::new()
            }),
        _ => String::new(),
    }
}

/// Parse the registry's `YYYY-MM-DD` or `MM/DD/YYYY` dates
pub fn parse_registry_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date_part = value.split(['T', ' ']).next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
        .ok()
}
