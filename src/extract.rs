//! Contact extraction: raw snapshot rows to owner/officer contact records.
//!
//! Filters run in a fixed order:
//!
//! 1. Contact type must be in the allowed owner/officer set.
//! 2. Registrations that expired before `as_of - max_expiration_age` are
//!    dropped, then each BBL keeps only its most recently expiring
//!    registration. Ties go to the greater registration id; an undated
//!    registration loses to any dated one.
//! 3. Rows with no name, an invalid BBL, or a house number + street of two
//!    characters or fewer are dropped.
//!
//! Dropped rows are not errors. The surviving rows are grouped into one
//! [`ContactRecord`] per registration contact, ordered by
//! `(registration_id, registration_contact_id)`.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::normalize::join_truthies;
use crate::schema::{Bbl, ContactRecord, ContactType};
use crate::source::RawContactRow;
use crate::standardize::address_of;

/// Extraction settings resolved for one run
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub allowed_types: BTreeSet<ContactType>,
    pub max_expiration_age: Option<Duration>,
    /// Reference date for the expiration window
    pub as_of: NaiveDate,
}

impl ExtractOptions {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            allowed_types: ContactType::ALL.into_iter().collect(),
            max_expiration_age: Some(Duration::days(365)),
            as_of,
        }
    }
}

/// Row counts per filter stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub rows_read: usize,
    pub not_owner_type: usize,
    pub expired: usize,
    pub superseded: usize,
    pub malformed: usize,
    pub contacts: usize,
}

/// Extract contact records from a snapshot's rows
pub fn extract_contacts(
    rows: &[RawContactRow],
    options: &ExtractOptions,
) -> (Vec<ContactRecord>, ExtractStats) {
    let mut stats = ExtractStats {
        rows_read: rows.len(),
        ..Default::default()
    };

    // (a) owner/officer contact types
    let typed: Vec<(&RawContactRow, ContactType)> = rows
        .iter()
        .filter_map(|row| {
            let parsed = ContactType::parse(&row.contact_type)
                .filter(|t| options.allowed_types.contains(t));
            if parsed.is_none() {
                stats.not_owner_type += 1;
            }
            parsed.map(|t| (row, t))
        })
        .collect();

    // (b) expiration window, then latest registration per BBL
    let cutoff = options.max_expiration_age.map(|age| options.as_of - age);
    let current: Vec<(&RawContactRow, ContactType)> = typed
        .into_iter()
        .filter(|(row, _)| match cutoff {
            Some(cutoff) => {
                let keep = row.registration_end_date.is_some_and(|end| end > cutoff);
                if !keep {
                    stats.expired += 1;
                }
                keep
            }
            None => true,
        })
        .collect();

    let winners = latest_registration_per_bbl(current.iter().map(|(row, _)| *row));

    let mut grouped: BTreeMap<(i64, i64), ContactRecord> = BTreeMap::new();
    for (row, contact_type) in current {
        if winners.get(row.bbl.as_str()) != Some(&row.registration_id) {
            stats.superseded += 1;
            continue;
        }

        // (c) malformed rows
        let Some(record) = to_contact_record(row, contact_type) else {
            debug!(
                registration_id = row.registration_id,
                registration_contact_id = row.registration_contact_id,
                "Dropping malformed contact row"
            );
            stats.malformed += 1;
            continue;
        };

        grouped
            .entry((record.registration_id, record.registration_contact_id))
            .and_modify(|existing| existing.bbls.extend(record.bbls.iter().cloned()))
            .or_insert(record);
    }

    let records: Vec<ContactRecord> = grouped.into_values().collect();
    stats.contacts = records.len();

    info!(
        rows = stats.rows_read,
        contacts = stats.contacts,
        not_owner_type = stats.not_owner_type,
        expired = stats.expired,
        superseded = stats.superseded,
        malformed = stats.malformed,
        "Extracted owner contacts"
    );

    (records, stats)
}

/// The winning registration id for every BBL
fn latest_registration_per_bbl<'a>(
    rows: impl Iterator<Item = &'a RawContactRow>,
) -> AHashMap<&'a str, i64> {
    let mut best: AHashMap<&'a str, (Option<NaiveDate>, i64)> = AHashMap::new();
    for row in rows {
        let candidate = (row.registration_end_date, row.registration_id);
        best.entry(row.bbl.as_str())
            .and_modify(|current| {
                if candidate > *current {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }
    best.into_iter().map(|(bbl, (_, reg))| (bbl, reg)).collect()
}

fn to_contact_record(row: &RawContactRow, contact_type: ContactType) -> Option<ContactRecord> {
    let bbl = Bbl::parse(&row.bbl)?;

    let person = join_truthies(&[row.firstname.as_deref(), row.lastname.as_deref()], " ");
    let corporation = row
        .corporationname
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if person.is_empty() && corporation.is_none() {
        return None;
    }

    let business_address = address_of(row);
    if business_address.street_line_len() <= 2 {
        return None;
    }

    Some(ContactRecord {
        registration_id: row.registration_id,
        registration_contact_id: row.registration_contact_id,
        bbls: BTreeSet::from([bbl]),
        contact_type,
        person_name: (!person.is_empty()).then_some(person),
        corporation_name: corporation.map(String::from),
        business_address,
    })
}
