//! Business address standardization, upstream of contact extraction.
//!
//! Standardization is per-row work with no cross-row dependency, so it is the
//! one stage that runs in parallel. Results are rejoined to their rows by
//! [`RawContactRow::row_key`] and written back in scan order.

use ahash::AHashMap;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::StandardizationMode;
use crate::error::Result;
use crate::normalize::str_squish;
use crate::schema::BusinessAddress;
use crate::source::RawContactRow;

/// Rewrites a business address into a standard form
pub trait AddressStandardizer: Send + Sync {
    fn standardize(&self, address: &BusinessAddress) -> Result<BusinessAddress>;
}

/// Whitespace squish only
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl AddressStandardizer for Passthrough {
    fn standardize(&self, address: &BusinessAddress) -> Result<BusinessAddress> {
        Ok(squish_fields(address))
    }
}

/// Squish plus USPS street suffix and directional abbreviations
#[derive(Debug, Clone, Copy, Default)]
pub struct StreetSuffixes;

const STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("AVENUE", "AVE"),
    ("AV", "AVE"),
    ("STREET", "ST"),
    ("STR", "ST"),
    ("ROAD", "RD"),
    ("BOULEVARD", "BLVD"),
    ("PLACE", "PL"),
    ("DRIVE", "DR"),
    ("LANE", "LN"),
    ("PARKWAY", "PKWY"),
    ("COURT", "CT"),
    ("TERRACE", "TER"),
    ("HIGHWAY", "HWY"),
    ("SQUARE", "SQ"),
    ("EAST", "E"),
    ("WEST", "W"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
];

impl StreetSuffixes {
    fn abbreviate_street(street: &str) -> String {
        street
            .split_whitespace()
            .map(|token| {
                let upper = token.to_uppercase();
                STREET_ABBREVIATIONS
                    .iter()
                    .find(|(long, _)| *long == upper)
                    .map(|(_, short)| short.to_string())
                    .unwrap_or(upper)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl AddressStandardizer for StreetSuffixes {
    fn standardize(&self, address: &BusinessAddress) -> Result<BusinessAddress> {
        let mut out = squish_fields(address);
        // An empty standardized street keeps the raw value.
        if let Some(street) = out.street_name.as_deref() {
            let abbreviated = Self::abbreviate_street(street);
            if !abbreviated.is_empty() {
                out.street_name = Some(abbreviated);
            }
        }
        Ok(out)
    }
}

/// Build the standardizer for a configured mode
pub fn standardizer_for(mode: StandardizationMode) -> Box<dyn AddressStandardizer> {
    match mode {
        StandardizationMode::Passthrough => Box::new(Passthrough),
        StandardizationMode::StreetSuffixes => Box::new(StreetSuffixes),
    }
}

fn squish_fields(address: &BusinessAddress) -> BusinessAddress {
    let squish = |field: &Option<String>| field.as_deref().map(str_squish);
    BusinessAddress {
        house_number: squish(&address.house_number),
        street_name: squish(&address.street_name),
        apartment: squish(&address.apartment),
        city: squish(&address.city),
        state: squish(&address.state),
        zip: squish(&address.zip),
    }
}

/// The business address columns of a raw row
pub fn address_of(row: &RawContactRow) -> BusinessAddress {
    BusinessAddress {
        house_number: row.business_house_number.clone(),
        street_name: row.business_street_name.clone(),
        apartment: row.business_apartment.clone(),
        city: row.business_city.clone(),
        state: row.business_state.clone(),
        zip: row.business_zip.clone(),
    }
}

/// Standardize every row's business address in parallel
///
/// Any standardizer failure fails the whole batch. The returned rows keep the
/// input order.
pub fn standardize_rows(
    mut rows: Vec<RawContactRow>,
    standardizer: &dyn AddressStandardizer,
) -> Result<Vec<RawContactRow>> {
    type Keyed = ((i64, i64, String), BusinessAddress);

    let results: Vec<Keyed> = rows
        .par_iter()
        .map(|row| -> Result<Keyed> {
            let (reg, contact, bbl) = row.row_key();
            let address = standardizer.standardize(&address_of(row))?;
            Ok(((reg, contact, bbl.to_string()), address))
        })
        .collect::<Result<Vec<Keyed>>>()?;

    // Rows repeating a key all take the first row's result.
    let mut by_key: AHashMap<(i64, i64, String), BusinessAddress> =
        AHashMap::with_capacity(results.len());
    let mut conflicting = 0usize;
    for (key, address) in results {
        match by_key.get(&key) {
            Some(first) if *first != address => conflicting += 1,
            Some(_) => {}
            None => {
                by_key.insert(key, address);
            }
        }
    }
    if conflicting > 0 {
        warn!(conflicting, "Rows sharing a key standardized differently; first result used");
    }

    let mut changed = 0usize;
    for row in rows.iter_mut() {
        let (reg, contact, bbl) = row.row_key();
        let key = (reg, contact, bbl.to_string());
        let Some(address) = by_key.get(&key).cloned() else {
            continue;
        };
        if address != address_of(row) {
            changed += 1;
        }
        row.business_house_number = address.house_number;
        row.business_street_name = address.street_name;
        row.business_apartment = address.apartment;
        row.business_city = address.city;
        row.business_state = address.state;
        row.business_zip = address.zip;
    }

    info!(rows = rows.len(), changed, "Standardized business addresses");
    Ok(rows)
}
