//! Shared typed models used across the indexer and store layers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;

use crate::errors::{CosignError, CosignResult};

// ---------------------------------------------------------------------------
// Party codes
// ---------------------------------------------------------------------------

/// The four party codes counted per bill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Party {
    Democrat,
    Republican,
    Independent,
    Libertarian,
}

impl Party {
    pub fn from_code(code: char) -> Option<Party> {
        match code {
            'D' => Some(Party::Democrat),
            'R' => Some(Party::Republican),
            'I' => Some(Party::Independent),
            'L' => Some(Party::Libertarian),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Identity strings: "Name [P-ST-DD]"
// ---------------------------------------------------------------------------

/// Leading name token of a raw identity string. Two raw strings belong to the
/// same member exactly when this returns the same value for both.
pub fn member_name(raw: &str) -> &str {
    match raw.split_once(" [") {
        Some((name, _)) => name,
        None => raw,
    }
}

/// Party recorded on one appearance: the first character after `[`.
pub fn party_of(raw: &str) -> CosignResult<Party> {
    let code = raw
        .split_once('[')
        .and_then(|(_, rest)| rest.chars().next())
        .ok_or_else(|| CosignError::MalformedIdentity(raw.to_string()))?;
    Party::from_code(code).ok_or_else(|| CosignError::UnknownParty {
        code,
        identity: raw.to_string(),
    })
}

/// A raw identity string split into its name and bracketed qualifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub party: String,
    pub state: String,
    pub district: String,
}

impl Identity {
    pub fn parse(raw: &str) -> CosignResult<Identity> {
        let (name, qualifier) = raw
            .split_once(" [")
            .ok_or_else(|| CosignError::MalformedIdentity(raw.to_string()))?;
        let fields: Vec<&str> = qualifier.trim_end_matches(']').split('-').collect();
        match fields.as_slice() {
            [party, state, district] => Ok(Identity {
                name: name.to_string(),
                party: party.to_string(),
                state: state.to_string(),
                district: district.to_string(),
            }),
            _ => Err(CosignError::MalformedIdentity(raw.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Bill
// ---------------------------------------------------------------------------

/// One piece of legislation, built from a single XML document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bill {
    pub number: i64,
    pub title: String,
    pub title_lower: String,
    pub sponsors: Vec<String>,
    pub cosponsors: Vec<String>,
    pub score: i64,
    pub num_dems: i64,
    pub num_reps: i64,
    pub num_inds: i64,
    pub num_libs: i64,
    pub multi_party: bool,
    pub link: String,
    pub policy_area: Option<String>,
    pub subjects: Vec<String>,
}

impl Bill {
    /// Sponsors followed by cosponsors, duplicates included.
    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.sponsors
            .iter()
            .chain(self.cosponsors.iter())
            .map(String::as_str)
    }

    /// Recompute party counters, `score` and `multi_party` from the
    /// participant lists. Every occurrence counts, so a name listed as both
    /// sponsor and cosponsor is counted twice.
    pub fn tally_parties(&mut self) -> CosignResult<()> {
        let (mut dems, mut reps, mut inds, mut libs) = (0i64, 0i64, 0i64, 0i64);
        for raw in self.participants() {
            match party_of(raw)? {
                Party::Democrat => dems += 1,
                Party::Republican => reps += 1,
                Party::Independent => inds += 1,
                Party::Libertarian => libs += 1,
            }
        }
        self.num_dems = dems;
        self.num_reps = reps;
        self.num_inds = inds;
        self.num_libs = libs;
        self.score = dems - reps;
        self.multi_party = [dems, reps, inds, libs].iter().filter(|&&n| n > 0).count() > 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// A distinct legislator discovered across all bills.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub parties: IndexSet<String>,
    pub districts: IndexSet<String>,
    pub state: String,
    pub full_strings: IndexSet<String>,
    /// Counterpart member id (as a string) -> shared bipartisan bills.
    pub counts: BTreeMap<String, i64>,
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// Canonical key of an unordered member pair; always `low < high`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    low: i64,
    high: i64,
}

impl CellKey {
    /// Order the two ids. Returns `None` for a self-pair.
    pub fn new(a: i64, b: i64) -> Option<CellKey> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(CellKey { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(CellKey { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }

    /// The other half of the pair, if `id` is part of it.
    pub fn counterpart(&self, id: i64) -> Option<i64> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.low, self.high)
    }
}

impl FromStr for CellKey {
    type Err = CosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CosignError::Database(format!("invalid cell position {s:?}"));
        let (a, b) = s.split_once('_').ok_or_else(bad)?;
        let low: i64 = a.parse().map_err(|_| bad())?;
        let high: i64 = b.parse().map_err(|_| bad())?;
        if low >= high {
            return Err(bad());
        }
        Ok(CellKey { low, high })
    }
}

/// One entry of the bipartisan adjacency matrix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    pub position: String,
    pub count: i64,
    pub bill_numbers: Vec<i64>,
    /// Resolved on read by `Database::get_cell`; never stored.
    pub bills: Vec<Bill>,
    pub policy_areas: Vec<String>,
    pub subjects: Vec<String>,
}

impl Cell {
    pub fn key(&self) -> CosignResult<CellKey> {
        self.position.parse()
    }

    pub fn shares_any_bill(&self, bill_numbers: &[i64]) -> bool {
        self.bill_numbers.iter().any(|n| bill_numbers.contains(n))
    }
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TopicKind {
    PolicyArea,
    Subject,
}

impl TopicKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TopicKind::PolicyArea => "policyArea",
            TopicKind::Subject => "subject",
        }
    }

    /// Cell column holding tags of this kind.
    pub fn cell_column(self) -> &'static str {
        match self {
            TopicKind::PolicyArea => "policy_areas",
            TopicKind::Subject => "subjects",
        }
    }
}

impl FromStr for TopicKind {
    type Err = CosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "policyArea" => Ok(TopicKind::PolicyArea),
            "subject" => Ok(TopicKind::Subject),
            other => Err(CosignError::Database(format!("unknown topic kind {other:?}"))),
        }
    }
}

/// A policy area or subject with every bill carrying it.
#[derive(Clone, Debug, PartialEq)]
pub struct Topic {
    pub kind: TopicKind,
    pub name: String,
    pub bill_numbers: Vec<i64>,
}
