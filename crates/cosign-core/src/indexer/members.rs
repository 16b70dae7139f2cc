//! Member registry resolution from sponsor identity strings.

use std::time::Instant;

use indexmap::IndexMap;
use tracing::info;

use crate::errors::CosignResult;
use crate::indexer::pool::StageStats;
use crate::models::{member_name, Identity, Member};
use crate::store::database::Database;

/// Deduplicate identity strings into members. Ids are dense, start at 1 and
/// follow the order of `identities`.
pub fn resolve_members<'a, I>(identities: I) -> CosignResult<Vec<Member>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut registry: IndexMap<String, Member> = IndexMap::new();

    for raw in identities {
        let identity = Identity::parse(raw)?;
        let next_id = registry.len() as i64 + 1;
        match registry.get_mut(member_name(raw)) {
            Some(member) => {
                if member.full_strings.contains(raw) {
                    continue;
                }
                member.parties.insert(identity.party);
                member.districts.insert(identity.district);
                member.full_strings.insert(raw.to_string());
            }
            None => {
                let member = Member {
                    id: next_id,
                    name: identity.name,
                    parties: [identity.party].into_iter().collect(),
                    districts: [identity.district].into_iter().collect(),
                    state: identity.state,
                    full_strings: [raw.to_string()].into_iter().collect(),
                    counts: Default::default(),
                };
                registry.insert(member_name(raw).to_string(), member);
            }
        }
    }

    Ok(registry.into_values().collect())
}

/// Build the member collection from every stored bill.
pub fn populate_members(db: &Database) -> CosignResult<StageStats> {
    let started = Instant::now();
    let identities = db.sponsor_strings()?;
    let members = resolve_members(identities.iter().map(String::as_str))?;
    db.insert_members(&members)?;

    let stats = StageStats {
        stage: "members",
        units: members.len(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "members: resolved {} identity strings into {} members in {} ms",
        identities.len(),
        stats.units,
        stats.elapsed_ms
    );
    Ok(stats)
}
