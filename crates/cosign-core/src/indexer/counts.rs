//! Per-member interaction counts derived from the cell collection.

use std::collections::BTreeMap;

use crate::errors::CosignResult;
use crate::indexer::pool::{StageStats, WorkerPool};
use crate::models::Cell;
use crate::store::database::Database;

/// Counterpart id -> cell count for every cell touching `member_id`.
/// Cells that do not involve the member are ignored.
pub fn counterpart_counts<'a, I>(member_id: i64, cells: I) -> CosignResult<BTreeMap<String, i64>>
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut counts = BTreeMap::new();
    for cell in cells {
        if let Some(other) = cell.key()?.counterpart(member_id) {
            counts.insert(other.to_string(), cell.count);
        }
    }
    Ok(counts)
}

/// Cells where `member_id` is the leading or trailing half of the key.
pub fn cells_touching(db: &Database, member_id: i64) -> CosignResult<Vec<Cell>> {
    let mut cells = db.cells_matching(&format!("{member_id}_*"))?;
    cells.extend(db.cells_matching(&format!("*_{member_id}"))?);
    Ok(cells)
}

/// Recompute and overwrite `counts` on every member, one unit per member.
pub fn populate_counts(db: &Database, pool: &WorkerPool) -> CosignResult<StageStats> {
    let members = db.members()?;
    pool.run("counts", &members, |member| {
        let cells = cells_touching(db, member.id)?;
        let counts = counterpart_counts(member.id, &cells)?;
        db.set_member_counts(member.id, &counts)
    })
}
