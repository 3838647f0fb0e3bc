//! Canonical name and business-address strings.
//!
//! Two contacts are the same identity exactly when their canonical strings are
//! equal; there is no fuzzy matching here.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::{BusinessAddress, ContactRecord};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Trim and collapse every whitespace run to a single space
pub fn str_squish(value: &str) -> String {
    WHITESPACE.replace_all(value.trim(), " ").into_owned()
}

/// Join the present parts with `sep`, skipping `None` and blank parts
///
/// ```
/// use portfoliograph::normalize::join_truthies;
///
/// assert_eq!(join_truthies(&[Some("boop"), Some("jones")], " "), "boop jones");
/// assert_eq!(join_truthies(&[Some("boop"), Some("")], " "), "boop");
/// assert_eq!(join_truthies(&[None, Some("jones")], " "), "jones");
/// assert_eq!(join_truthies(&[Some("New York"), Some("NY")], ", "), "New York, NY");
/// ```
pub fn join_truthies(parts: &[Option<&str>], sep: &str) -> String {
    parts
        .iter()
        .filter_map(|p| p.map(str::trim))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Canonical identity strings of one contact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalIdentity {
    pub name: String,
    pub business_address: String,
}

impl CanonicalIdentity {
    pub fn of(record: &ContactRecord) -> Self {
        Self {
            name: canonical_name(record),
            business_address: canonical_business_address(&record.business_address),
        }
    }
}

/// Upper-cased person name, falling back to the corporation name
pub fn canonical_name(record: &ContactRecord) -> String {
    let person = record.person_name.as_deref().map(str_squish);
    let name = match person.filter(|p| !p.is_empty()) {
        Some(person) => person,
        None => str_squish(record.corporation_name.as_deref().unwrap_or("")),
    };
    name.to_uppercase()
}

/// Upper-cased `"HOUSE STREET APT, CITY STATE"`
pub fn canonical_business_address(addr: &BusinessAddress) -> String {
    let street = join_truthies(
        &[
            addr.house_number.as_deref(),
            addr.street_name.as_deref(),
            addr.apartment.as_deref(),
        ],
        " ",
    );
    let locality = join_truthies(&[addr.city.as_deref(), addr.state.as_deref()], " ");
    let joined = join_truthies(&[Some(street.as_str()), Some(locality.as_str())], ", ");
    str_squish(&joined).to_uppercase()
}
