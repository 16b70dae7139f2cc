//! Bipartisan adjacency matrix construction.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::errors::{CosignError, CosignResult};
use crate::indexer::pool::{StageStats, WorkerPool};
use crate::models::{party_of, Bill, CellKey, Member, Party};
use crate::store::database::{BillFilter, Database};

/// One appearance of a member on a bill, with the party recorded there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Participant {
    pub party: Party,
    pub id: i64,
}

/// Raw identity string -> member id, built from every member's
/// `full_strings`.
#[derive(Debug, Default)]
pub struct MemberLookup {
    ids: HashMap<String, i64>,
}

impl MemberLookup {
    pub fn from_members(members: &[Member]) -> Self {
        let ids = members
            .iter()
            .flat_map(|m| m.full_strings.iter().map(move |s| (s.clone(), m.id)))
            .collect();
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Resolve every sponsor and cosponsor of `bill`, in listing order.
    pub fn resolve(&self, bill: &Bill) -> CosignResult<Vec<Participant>> {
        bill.participants()
            .map(|raw| {
                let id = *self
                    .ids
                    .get(raw)
                    .ok_or_else(|| CosignError::UnresolvedSponsor {
                        identity: raw.to_string(),
                        bill_number: bill.number,
                    })?;
                Ok(Participant {
                    party: party_of(raw)?,
                    id,
                })
            })
            .collect()
    }
}

/// Canonical keys for every pair of participants whose parties differ.
/// Self-pairs are dropped and each key appears once.
pub fn cross_party_pairs(participants: &[Participant]) -> Vec<CellKey> {
    let mut keys = BTreeSet::new();
    for (i, a) in participants.iter().enumerate() {
        for b in &participants[i + 1..] {
            if a.party == b.party {
                continue;
            }
            if let Some(key) = CellKey::new(a.id, b.id) {
                keys.insert(key);
            }
        }
    }
    keys.into_iter().collect()
}

/// Merge every bipartisan bill into the cell collection, one unit per bill.
pub fn populate_cells(db: &Database, pool: &WorkerPool) -> CosignResult<StageStats> {
    let lookup = MemberLookup::from_members(&db.members()?);
    let bills = db.bills(BillFilter::MultiParty)?;
    debug!(
        "cells: {} identity strings resolvable, {} bipartisan bills",
        lookup.len(),
        bills.len()
    );

    pool.run("cells", &bills, |bill| {
        let participants = lookup.resolve(bill)?;
        let keys = cross_party_pairs(&participants);
        debug!("Bill {} contributes {} cross-party pairs", bill.number, keys.len());
        db.merge_cells(&keys, bill.number)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::members::resolve_members;

    fn p(party: Party, id: i64) -> Participant {
        Participant { party, id }
    }

    #[test]
    fn test_pairs_skip_same_party() {
        let keys = cross_party_pairs(&[
            p(Party::Democrat, 1),
            p(Party::Democrat, 2),
            p(Party::Republican, 3),
        ]);
        let positions: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(positions, vec!["1_3", "2_3"]);
    }

    #[test]
    fn test_pairs_are_canonical_regardless_of_order() {
        let keys = cross_party_pairs(&[p(Party::Republican, 9), p(Party::Democrat, 4)]);
        assert_eq!(keys, vec![CellKey::new(4, 9).unwrap()]);
        assert!(keys.iter().all(|k| k.low() < k.high()));
    }

    #[test]
    fn test_pairs_drop_self_and_duplicates() {
        // Same member under two party labels, and listed twice.
        let keys = cross_party_pairs(&[
            p(Party::Republican, 5),
            p(Party::Independent, 5),
            p(Party::Democrat, 6),
            p(Party::Democrat, 6),
        ]);
        let positions: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(positions, vec!["5_6"]);
    }

    #[test]
    fn test_democrat_independent_only() {
        let keys = cross_party_pairs(&[
            p(Party::Democrat, 1),
            p(Party::Independent, 2),
            p(Party::Democrat, 3),
        ]);
        let positions: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(positions, vec!["1_2", "2_3"]);
    }

    #[test]
    fn test_lookup_resolves_and_reports_missing() {
        let members = resolve_members(["A [D-CA-1]", "B [R-TX-2]"]).unwrap();
        let lookup = MemberLookup::from_members(&members);
        let bill = Bill {
            number: 100,
            sponsors: vec!["A [D-CA-1]".into()],
            cosponsors: vec!["B [R-TX-2]".into()],
            ..Default::default()
        };
        let resolved = lookup.resolve(&bill).unwrap();
        assert_eq!(resolved, vec![p(Party::Democrat, 1), p(Party::Republican, 2)]);

        let stranger = Bill {
            number: 101,
            sponsors: vec!["Z [D-WA-9]".into()],
            ..Default::default()
        };
        match lookup.resolve(&stranger) {
            Err(CosignError::UnresolvedSponsor { bill_number, .. }) => {
                assert_eq!(bill_number, 101)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
