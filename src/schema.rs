//! Data model shared by the extractor, graph builder and exporters

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// FNV-1a constants for 64-bit hash
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Compute a stable FNV-1a hash (deterministic across runs and platforms)
///
/// Used for search index object ids and graph fingerprints.
pub fn fnv1a_hash(data: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Borough-Block-Lot: the 10-character padded identifier of one tax lot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bbl(String);

impl Bbl {
    /// Parse an already padded 10-digit BBL
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(value.to_string()))
        } else {
            None
        }
    }

    /// Assemble a BBL from the registry's boro / block / lot columns
    ///
    /// Boro is one digit (1-5), block is padded to five digits and lot to four.
    pub fn from_parts(boro: &str, block: &str, lot: &str) -> Option<Self> {
        let boro: u8 = boro.trim().parse().ok()?;
        let block: u32 = block.trim().parse().ok()?;
        let lot: u32 = lot.trim().parse().ok()?;
        if !(1..=5).contains(&boro) || block > 99_999 || lot > 9_999 {
            return None;
        }
        Some(Self(format!("{}{:05}{:04}", boro, block, lot)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Bbl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry contact roles that identify an owner or officer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContactType {
    HeadOfficer,
    IndividualOwner,
    CorporateOwner,
    JointOwner,
    Corporation,
}

impl ContactType {
    pub const ALL: [ContactType; 5] = [
        ContactType::HeadOfficer,
        ContactType::IndividualOwner,
        ContactType::CorporateOwner,
        ContactType::JointOwner,
        ContactType::Corporation,
    ];

    /// Parse the registry `type` column; agents, site managers, lessees and
    /// other non-owner roles return `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::HeadOfficer => "HeadOfficer",
            ContactType::IndividualOwner => "IndividualOwner",
            ContactType::CorporateOwner => "CorporateOwner",
            ContactType::JointOwner => "JointOwner",
            ContactType::Corporation => "Corporation",
        }
    }
}

/// Business (mailing) address of a registration contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessAddress {
    pub house_number: Option<String>,
    pub street_name: Option<String>,
    pub apartment: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl BusinessAddress {
    /// Length of the house number and street joined with a space
    pub fn street_line_len(&self) -> usize {
        let house = self.house_number.as_deref().unwrap_or("").trim();
        let street = self.street_name.as_deref().unwrap_or("").trim();
        match (house.is_empty(), street.is_empty()) {
            (true, true) => 0,
            (false, true) => house.chars().count(),
            (true, false) => street.chars().count(),
            (false, false) => house.chars().count() + 1 + street.chars().count(),
        }
    }
}

/// One owner/officer contact of a registration, after extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactRecord {
    pub registration_id: i64,
    pub registration_contact_id: i64,
    pub bbls: BTreeSet<Bbl>,
    pub contact_type: ContactType,
    /// First and last name joined, when the contact is a person
    pub person_name: Option<String>,
    pub corporation_name: Option<String>,
    pub business_address: BusinessAddress,
}

/// Evidence unit carried by graph edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RegistrationInfo {
    pub reg_id: i64,
    pub reg_contact_id: i64,
}

/// Graph node key: a canonical name or a canonical business address
///
/// Serializes as `{"Name": ".."}` / `{"BizAddr": ".."}`, the shape the
/// portfolio visualization client reads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OwnerNode {
    Name(String),
    #[serde(rename = "BizAddr")]
    BizAddress(String),
}

impl OwnerNode {
    pub fn value(&self) -> &str {
        match self {
            OwnerNode::Name(v) | OwnerNode::BizAddress(v) => v,
        }
    }

    pub fn is_name(&self) -> bool {
        matches!(self, OwnerNode::Name(_))
    }
}

/// Node payload: one canonical identity plus everything seen under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub key: OwnerNode,
    pub registration_ids: BTreeSet<i64>,
    pub bbls: BTreeSet<Bbl>,
}

impl OwnerIdentity {
    pub fn new(key: OwnerNode) -> Self {
        Self {
            key,
            registration_ids: BTreeSet::new(),
            bbls: BTreeSet::new(),
        }
    }
}

/// Edge payload: the registrations whose contacts link the two tokens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchEvidence {
    pub registrations: BTreeSet<RegistrationInfo>,
}

impl MatchEvidence {
    /// Community detection weight
    pub fn weight(&self) -> f64 {
        self.registrations.len() as f64
    }

    pub fn merge(&mut self, other: &MatchEvidence) {
        self.registrations.extend(other.registrations.iter().copied());
    }
}

/// Globally unique portfolio identifier
///
/// A connected component gets `"{root}"`; each community split from it gets
/// the parent's id with a 1-based child index appended, e.g. `"7.2"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortfolioId {
    pub root: u32,
    pub path: Vec<u32>,
}

impl PortfolioId {
    pub fn root(root: u32) -> Self {
        Self {
            root,
            path: Vec::new(),
        }
    }

    pub fn child(&self, index: u32) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        Self {
            root: self.root,
            path,
        }
    }
}

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for index in &self.path {
            write!(f, ".{}", index)?;
        }
        Ok(())
    }
}

impl Serialize for PortfolioId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
