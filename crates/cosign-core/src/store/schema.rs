//! SQLite schema DDL for the derived collections.

use rusqlite::Connection;

use crate::errors::CosignResult;

/// Table DDL, one statement per collection. Executed with
/// `CREATE … IF NOT EXISTS` so they are safe to replay.
pub const BILLS_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS bills (
        number INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        title_lower TEXT NOT NULL,
        sponsors TEXT NOT NULL DEFAULT '[]',
        cosponsors TEXT NOT NULL DEFAULT '[]',
        score INTEGER NOT NULL,
        num_dems INTEGER NOT NULL,
        num_reps INTEGER NOT NULL,
        num_inds INTEGER NOT NULL,
        num_libs INTEGER NOT NULL,
        multi_party INTEGER NOT NULL,
        link TEXT NOT NULL,
        policy_area TEXT,
        subjects TEXT NOT NULL DEFAULT '[]'
    );",
    "CREATE INDEX IF NOT EXISTS idx_bills_title_lower ON bills(title_lower);",
    "CREATE INDEX IF NOT EXISTS idx_bills_multi_party ON bills(multi_party);",
];

pub const MEMBERS_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS members (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        parties TEXT NOT NULL DEFAULT '[]',
        districts TEXT NOT NULL DEFAULT '[]',
        state TEXT NOT NULL,
        full_strings TEXT NOT NULL DEFAULT '[]',
        counts TEXT NOT NULL DEFAULT '{}'
    );",
];

pub const CELLS_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cells (
        position TEXT PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0,
        bill_numbers TEXT NOT NULL DEFAULT '[]',
        policy_areas TEXT NOT NULL DEFAULT '[]',
        subjects TEXT NOT NULL DEFAULT '[]'
    );",
];

pub const TOPICS_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS topics (
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        bill_numbers TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY(kind, name)
    );",
];

/// Which collections `Database::reset` should drop and recreate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Collections {
    pub bills: bool,
    pub members: bool,
    pub cells: bool,
    pub topics: bool,
}

impl Collections {
    pub const ALL: Collections = Collections {
        bills: true,
        members: true,
        cells: true,
        topics: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.bills || self.members || self.cells || self.topics)
    }
}

pub fn create_all(conn: &Connection) -> CosignResult<()> {
    for stmt in BILLS_DDL
        .iter()
        .chain(MEMBERS_DDL)
        .chain(CELLS_DDL)
        .chain(TOPICS_DDL)
    {
        conn.execute_batch(stmt)?;
    }
    Ok(())
}

/// Drop the selected tables and recreate them empty, in one transaction.
pub fn reset_collections(conn: &mut Connection, which: Collections) -> CosignResult<()> {
    let tx = conn.transaction()?;
    let plan: [(bool, &str, &[&str]); 4] = [
        (which.bills, "bills", BILLS_DDL),
        (which.members, "members", MEMBERS_DDL),
        (which.cells, "cells", CELLS_DDL),
        (which.topics, "topics", TOPICS_DDL),
    ];
    for (selected, table, ddl) in plan {
        if !selected {
            continue;
        }
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
        for stmt in ddl {
            tx.execute_batch(stmt)?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name;")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_create_all_is_replayable() {
        let conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        create_all(&conn).unwrap();
        assert_eq!(table_names(&conn), vec!["bills", "cells", "members", "topics"]);
    }

    #[test]
    fn test_reset_only_touches_selected() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        conn.execute(
            "INSERT INTO cells(position, count) VALUES ('1_2', 3);",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO topics(kind, name) VALUES ('subject', 'Health');",
            [],
        )
        .unwrap();

        let which = Collections {
            cells: true,
            ..Default::default()
        };
        reset_collections(&mut conn, which).unwrap();

        let cells: i64 = conn
            .query_row("SELECT COUNT(*) FROM cells;", [], |r| r.get(0))
            .unwrap();
        let topics: i64 = conn
            .query_row("SELECT COUNT(*) FROM topics;", [], |r| r.get(0))
            .unwrap();
        assert_eq!(cells, 0);
        assert_eq!(topics, 1);
    }

    #[test]
    fn test_collections_is_empty() {
        assert!(Collections::default().is_empty());
        assert!(!Collections::ALL.is_empty());
    }
}
