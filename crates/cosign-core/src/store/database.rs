//! SQLite storage layer for the derived collections.
//!
//! Each public method opens its own connection, so concurrent pipeline units
//! never share one. Set-valued fields live in JSON columns and are mutated
//! with SQLite's JSON functions so every write stays a single statement.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexSet;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;

use crate::errors::{CosignError, CosignResult};
use crate::models::{Bill, Cell, CellKey, Member, Topic, TopicKind};
use crate::store::schema::{self, Collections};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const BILL_COLUMNS: &str = "number, title, title_lower, sponsors, cosponsors, score, \
     num_dems, num_reps, num_inds, num_libs, multi_party, link, policy_area, subjects";

const MEMBER_COLUMNS: &str = "id, name, parties, districts, state, full_strings, counts";

const CELL_COLUMNS: &str = "position, count, bill_numbers, policy_areas, subjects";

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if raw.len() > 2 {
                expanded.push(&raw[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

fn from_json<T: DeserializeOwned>(raw: &str) -> CosignResult<T> {
    Ok(serde_json::from_str(raw)?)
}

/// Filters accepted by [`Database::bills`].
#[derive(Clone, Debug)]
pub enum BillFilter {
    All,
    MultiParty,
    Numbers(Vec<i64>),
}

// Raw rows: JSON columns are decoded after the rusqlite row borrow ends.

struct BillRow {
    number: i64,
    title: String,
    title_lower: String,
    sponsors: String,
    cosponsors: String,
    score: i64,
    num_dems: i64,
    num_reps: i64,
    num_inds: i64,
    num_libs: i64,
    multi_party: bool,
    link: String,
    policy_area: Option<String>,
    subjects: String,
}

impl BillRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(BillRow {
            number: row.get(0)?,
            title: row.get(1)?,
            title_lower: row.get(2)?,
            sponsors: row.get(3)?,
            cosponsors: row.get(4)?,
            score: row.get(5)?,
            num_dems: row.get(6)?,
            num_reps: row.get(7)?,
            num_inds: row.get(8)?,
            num_libs: row.get(9)?,
            multi_party: row.get(10)?,
            link: row.get(11)?,
            policy_area: row.get(12)?,
            subjects: row.get(13)?,
        })
    }

    fn decode(self) -> CosignResult<Bill> {
        Ok(Bill {
            number: self.number,
            title: self.title,
            title_lower: self.title_lower,
            sponsors: from_json(&self.sponsors)?,
            cosponsors: from_json(&self.cosponsors)?,
            score: self.score,
            num_dems: self.num_dems,
            num_reps: self.num_reps,
            num_inds: self.num_inds,
            num_libs: self.num_libs,
            multi_party: self.multi_party,
            link: self.link,
            policy_area: self.policy_area,
            subjects: from_json(&self.subjects)?,
        })
    }
}

struct MemberRow {
    id: i64,
    name: String,
    parties: String,
    districts: String,
    state: String,
    full_strings: String,
    counts: String,
}

impl MemberRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(MemberRow {
            id: row.get(0)?,
            name: row.get(1)?,
            parties: row.get(2)?,
            districts: row.get(3)?,
            state: row.get(4)?,
            full_strings: row.get(5)?,
            counts: row.get(6)?,
        })
    }

    fn decode(self) -> CosignResult<Member> {
        Ok(Member {
            id: self.id,
            name: self.name,
            parties: from_json(&self.parties)?,
            districts: from_json(&self.districts)?,
            state: self.state,
            full_strings: from_json(&self.full_strings)?,
            counts: from_json(&self.counts)?,
        })
    }
}

struct CellRow {
    position: String,
    count: i64,
    bill_numbers: String,
    policy_areas: String,
    subjects: String,
}

impl CellRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(CellRow {
            position: row.get(0)?,
            count: row.get(1)?,
            bill_numbers: row.get(2)?,
            policy_areas: row.get(3)?,
            subjects: row.get(4)?,
        })
    }

    fn decode(self) -> CosignResult<Cell> {
        Ok(Cell {
            position: self.position,
            count: self.count,
            bill_numbers: from_json(&self.bill_numbers)?,
            bills: Vec::new(),
            policy_areas: from_json(&self.policy_areas)?,
            subjects: from_json(&self.subjects)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite document store for bills, members, cells and topics.
#[derive(Clone, Debug)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Create a new `Database`. The path is expanded and parent directories
    /// are created if they do not already exist.
    pub fn new(db_path: impl AsRef<Path>) -> CosignResult<Self> {
        let expanded = expand_tilde(db_path.as_ref());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            let cwd = std::env::current_dir().map_err(|e| {
                CosignError::Database(format!("cannot resolve {}: {e}", expanded.display()))
            })?;
            cwd.join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CosignError::Database(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        Ok(Self { db_path: resolved })
    }

    fn connect(&self) -> CosignResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Switch to WAL so readers never block the concurrent cell writers,
    /// then create any missing tables.
    pub fn init_schema(&self) -> CosignResult<()> {
        let conn = self.connect()?;
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
        schema::create_all(&conn)
    }

    /// Drop and recreate the selected collections.
    pub fn reset(&self, which: Collections) -> CosignResult<()> {
        let mut conn = self.connect()?;
        schema::reset_collections(&mut conn, which)
    }

    // -----------------------------------------------------------------------
    // Bills
    // -----------------------------------------------------------------------

    pub fn insert_bill(&self, bill: &Bill) -> CosignResult<()> {
        let conn = self.connect()?;
        conn.execute(
            &format!(
                "INSERT INTO bills ({BILL_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);"
            ),
            params![
                bill.number,
                bill.title,
                bill.title_lower,
                serde_json::to_string(&bill.sponsors)?,
                serde_json::to_string(&bill.cosponsors)?,
                bill.score,
                bill.num_dems,
                bill.num_reps,
                bill.num_inds,
                bill.num_libs,
                bill.multi_party,
                bill.link,
                bill.policy_area,
                serde_json::to_string(&bill.subjects)?,
            ],
        )?;
        Ok(())
    }

    /// Bills matching `filter`, ordered by number.
    pub fn bills(&self, filter: BillFilter) -> CosignResult<Vec<Bill>> {
        let conn = self.connect()?;
        let rows = match filter {
            BillFilter::All => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {BILL_COLUMNS} FROM bills ORDER BY number;"))?;
                let rows = stmt
                    .query_map([], BillRow::read)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            BillFilter::MultiParty => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {BILL_COLUMNS} FROM bills WHERE multi_party = 1 ORDER BY number;"
                ))?;
                let rows = stmt
                    .query_map([], BillRow::read)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            BillFilter::Numbers(numbers) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {BILL_COLUMNS} FROM bills \
                     WHERE number IN (SELECT value FROM json_each(?1)) ORDER BY number;"
                ))?;
                let rows = stmt
                    .query_map(params![serde_json::to_string(&numbers)?], BillRow::read)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        rows.into_iter().map(BillRow::decode).collect()
    }

    /// Case-insensitive substring search over bill titles.
    pub fn bills_by_title(&self, query: &str) -> CosignResult<Vec<Bill>> {
        let escaped = query
            .trim()
            .to_lowercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BILL_COLUMNS} FROM bills \
             WHERE title_lower LIKE ?1 ESCAPE '\\' ORDER BY number;"
        ))?;
        let rows = stmt
            .query_map(params![format!("%{escaped}%")], BillRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(BillRow::decode).collect()
    }

    /// Every sponsor/cosponsor identity string, in first-seen order over
    /// bills by ascending number (sponsors before cosponsors).
    pub fn sponsor_strings(&self) -> CosignResult<IndexSet<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT sponsors, cosponsors FROM bills ORDER BY number;")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut names = IndexSet::new();
        for (sponsors, cosponsors) in rows {
            let sponsors: Vec<String> = from_json(&sponsors)?;
            let cosponsors: Vec<String> = from_json(&cosponsors)?;
            names.extend(sponsors);
            names.extend(cosponsors);
        }
        Ok(names)
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    /// Insert the whole registry in one transaction.
    pub fn insert_members(&self, members: &[Member]) -> CosignResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO members ({MEMBER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);"
            ))?;
            for m in members {
                stmt.execute(params![
                    m.id,
                    m.name,
                    serde_json::to_string(&m.parties)?,
                    serde_json::to_string(&m.districts)?,
                    m.state,
                    serde_json::to_string(&m.full_strings)?,
                    serde_json::to_string(&m.counts)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All members, ordered by id.
    pub fn members(&self) -> CosignResult<Vec<Member>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("SELECT {MEMBER_COLUMNS} FROM members ORDER BY id;"))?;
        let rows = stmt
            .query_map([], MemberRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(MemberRow::decode).collect()
    }

    pub fn member(&self, id: i64) -> CosignResult<Option<Member>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1;"),
                params![id],
                MemberRow::read,
            )
            .optional()?;
        row.map(MemberRow::decode).transpose()
    }

    /// Replace a member's `counts` mapping.
    pub fn set_member_counts(&self, id: i64, counts: &BTreeMap<String, i64>) -> CosignResult<()> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE members SET counts = ?2 WHERE id = ?1;",
            params![id, serde_json::to_string(counts)?],
        )?;
        if changed == 0 {
            return Err(CosignError::Database(format!("no member with id {id}")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cells
    // -----------------------------------------------------------------------

    /// Merge one bill into each cell in `keys`. Every key is a single
    /// upsert statement: create if absent, bump `count`, append the bill.
    pub fn merge_cells(&self, keys: &[CellKey], bill_number: i64) -> CosignResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "INSERT INTO cells (position, count, bill_numbers) VALUES (?1, 1, json_array(?2)) \
             ON CONFLICT(position) DO UPDATE SET \
                 count = count + 1, \
                 bill_numbers = json_insert(bill_numbers, '$[#]', ?2);",
        )?;
        for key in keys {
            stmt.execute(params![key.to_string(), bill_number])?;
        }
        Ok(())
    }

    pub fn merge_cell(&self, key: CellKey, bill_number: i64) -> CosignResult<()> {
        self.merge_cells(&[key], bill_number)
    }

    /// All cells, ordered by position.
    pub fn cells(&self) -> CosignResult<Vec<Cell>> {
        self.cells_matching("*")
    }

    /// Cells whose position matches a GLOB pattern such as `"12_*"` or
    /// `"*_12"`. `_` is literal under GLOB, unlike LIKE.
    pub fn cells_matching(&self, pattern: &str) -> CosignResult<Vec<Cell>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CELL_COLUMNS} FROM cells WHERE position GLOB ?1 ORDER BY position;"
        ))?;
        let rows = stmt
            .query_map(params![pattern], CellRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(CellRow::decode).collect()
    }

    /// One cell with its `bills` resolved from `bill_numbers`.
    pub fn get_cell(&self, position: &str) -> CosignResult<Option<Cell>> {
        let row = {
            let conn = self.connect()?;
            conn.query_row(
                &format!("SELECT {CELL_COLUMNS} FROM cells WHERE position = ?1;"),
                params![position],
                CellRow::read,
            )
            .optional()?
        };
        let Some(row) = row else {
            return Ok(None);
        };
        let mut cell = row.decode()?;
        cell.bills = self.bills(BillFilter::Numbers(cell.bill_numbers.clone()))?;
        Ok(Some(cell))
    }

    /// Add `name` to the tag list of each cell in `positions` unless already
    /// present. Returns how many cells gained the tag.
    pub fn tag_cells(&self, kind: TopicKind, name: &str, positions: &[String]) -> CosignResult<usize> {
        if positions.is_empty() {
            return Ok(0);
        }
        let column = kind.cell_column();
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "UPDATE cells SET {column} = json_insert({column}, '$[#]', ?2) \
             WHERE position = ?1 \
             AND NOT EXISTS (SELECT 1 FROM json_each(cells.{column}) WHERE value = ?2);"
        ))?;
        let mut tagged = 0;
        for position in positions {
            tagged += stmt.execute(params![position, name])?;
        }
        Ok(tagged)
    }

    // -----------------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------------

    /// Insert a batch of topics in one transaction.
    pub fn insert_topics(&self, topics: &[Topic]) -> CosignResult<()> {
        if topics.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO topics (kind, name, bill_numbers) VALUES (?1, ?2, ?3);")?;
            for topic in topics {
                stmt.execute(params![
                    topic.kind.as_str(),
                    topic.name,
                    serde_json::to_string(&topic.bill_numbers)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Topics of one kind, in insertion order.
    pub fn topics(&self, kind: TopicKind) -> CosignResult<Vec<Topic>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT name, bill_numbers FROM topics WHERE kind = ?1 ORDER BY rowid;",
        )?;
        let rows = stmt
            .query_map(params![kind.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(name, numbers)| {
                Ok(Topic {
                    kind,
                    name,
                    bill_numbers: from_json(&numbers)?,
                })
            })
            .collect()
    }
}
