//! Stage orchestration: bills -> members -> cells -> counts, then topics.
//!
//! Stages run strictly one after another because each reads the previous
//! stage's committed output. Inside a stage, units fan out over the shared
//! [`WorkerPool`]. Any unit error aborts the run.

use std::time::Instant;

use tracing::info;

use crate::config::PipelineConfig;
use crate::errors::CosignResult;
use crate::indexer::cells::populate_cells;
use crate::indexer::counts::populate_counts;
use crate::indexer::members::populate_members;
use crate::indexer::parser::populate_bills;
use crate::indexer::pool::{StageStats, WorkerPool};
use crate::indexer::topics::populate_topics;
use crate::store::database::Database;

/// Which stages a run executes. `cells` also recomputes member counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stages {
    pub bills: bool,
    pub members: bool,
    pub cells: bool,
    pub topics: bool,
}

impl Stages {
    pub const ALL: Stages = Stages {
        bills: true,
        members: true,
        cells: true,
        topics: true,
    };

    /// No stage selected means every stage.
    pub fn or_all(self) -> Stages {
        if self.bills || self.members || self.cells || self.topics {
            self
        } else {
            Stages::ALL
        }
    }
}

impl Default for Stages {
    fn default() -> Self {
        Stages::ALL
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub stages: Vec<StageStats>,
    pub elapsed_ms: u64,
}

pub fn run_pipeline(config: &PipelineConfig, stages: Stages) -> CosignResult<RunReport> {
    let db = Database::new(&config.db_path)?;
    db.init_schema()?;
    run_stages(&db, config, stages)
}

/// Run the selected stages against an already initialised database.
pub fn run_stages(
    db: &Database,
    config: &PipelineConfig,
    stages: Stages,
) -> CosignResult<RunReport> {
    let started = Instant::now();
    let pool = WorkerPool::new(config.workers);
    let mut report = RunReport::default();

    if stages.bills {
        info!("Populating bills from {}", config.bills_dir.display());
        report.stages.push(populate_bills(db, &pool, config)?);
    }
    if stages.members {
        info!("Populating members");
        report.stages.push(populate_members(db)?);
    }
    if stages.cells {
        info!("Populating cells");
        report.stages.push(populate_cells(db, &pool)?);
        info!("Populating member counts");
        report.stages.push(populate_counts(db, &pool)?);
    }
    if stages.topics {
        info!("Populating policy areas and subjects");
        report.stages.extend(populate_topics(db, &pool)?);
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        "Run finished: {} stages in {} ms",
        report.stages.len(),
        report.elapsed_ms
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use super::*;
    use crate::errors::CosignError;
    use crate::indexer::topics::tag_cells;
    use crate::models::{CellKey, TopicKind};
    use crate::store::database::BillFilter;
    use crate::store::schema::Collections;

    fn write_bill(
        dir: &Path,
        number: i64,
        sponsors: &[&str],
        cosponsors: &[&str],
        policy_area: &str,
        subjects: &[&str],
    ) {
        let names = |list: &[&str]| -> String {
            list.iter()
                .map(|n| format!("<item><fullName>Rep. {n}</fullName></item>"))
                .collect()
        };
        let subjects: String = subjects
            .iter()
            .map(|s| format!("<item><name>{s}</name></item>"))
            .collect();
        let xml = format!(
            "<billStatus><bill>\
             <billNumber>{number}</billNumber>\
             <title>Bill {number}</title>\
             <sponsors>{}</sponsors>\
             <cosponsors>{}</cosponsors>\
             <policyArea><name>{policy_area}</name></policyArea>\
             <subjects><billSubjects><legislativeSubjects>{subjects}</legislativeSubjects></billSubjects></subjects>\
             </bill></billStatus>",
            names(sponsors),
            names(cosponsors),
        );
        std::fs::write(dir.join(format!("BILLSTATUS-116hr{number}.xml")), xml).unwrap();
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: PipelineConfig,
        db: Database,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let bills_dir = dir.path().join("bills");
        std::fs::create_dir(&bills_dir).unwrap();
        let config = PipelineConfig::new(&bills_dir, dir.path().join("cosign.db")).with_workers(4);
        let db = Database::new(&config.db_path).unwrap();
        db.init_schema().unwrap();
        Fixture {
            _dir: dir,
            config,
            db,
        }
    }

    #[test]
    fn test_two_bill_scenario() {
        let f = fixture();
        write_bill(&f.config.bills_dir, 100, &["A [D-CA-1]", "B [R-TX-2]"], &[], "Health", &[]);
        write_bill(&f.config.bills_dir, 200, &["A [D-CA-1]", "C [R-NY-3]"], &[], "Health", &[]);

        run_stages(&f.db, &f.config, Stages::ALL).unwrap();

        let members = f.db.members().unwrap();
        let names: Vec<(i64, &str)> = members.iter().map(|m| (m.id, m.name.as_str())).collect();
        assert_eq!(names, vec![(1, "A"), (2, "B"), (3, "C")]);

        let cells = f.db.cells().unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].position, "1_2");
        assert_eq!(cells[0].count, 1);
        assert_eq!(cells[0].bill_numbers, vec![100]);
        assert_eq!(cells[1].position, "1_3");
        assert_eq!(cells[1].count, 1);
        assert_eq!(cells[1].bill_numbers, vec![200]);

        let a = f.db.member(1).unwrap().unwrap();
        let expected: BTreeMap<String, i64> =
            [("2".to_string(), 1), ("3".to_string(), 1)].into_iter().collect();
        assert_eq!(a.counts, expected);
        assert_eq!(cells[0].policy_areas, vec!["Health"]);
    }

    #[test]
    fn test_democrat_independent_bill() {
        let f = fixture();
        write_bill(
            &f.config.bills_dir,
            7,
            &["A [D-CA-1]"],
            &["S [I-VT-0]", "D [D-NY-4]"],
            "",
            &[],
        );
        run_stages(&f.db, &f.config, Stages::ALL).unwrap();

        let bill = &f.db.bills(BillFilter::All).unwrap()[0];
        assert!(bill.multi_party);
        assert_eq!(bill.num_reps, 0);
        assert_eq!(bill.score, bill.num_dems);
        assert_eq!(bill.score, 2);

        let positions: Vec<String> = f.db.cells().unwrap().into_iter().map(|c| c.position).collect();
        assert_eq!(positions, vec!["1_2", "2_3"]);
        assert!(f.db.topics(TopicKind::PolicyArea).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_merges_lose_no_updates() {
        let f = fixture();
        // Every bill produces the same pair, so all units contend on "1_2".
        let bill_count = 60;
        for number in 1..=bill_count {
            write_bill(
                &f.config.bills_dir,
                number,
                &["A [D-CA-1]"],
                &["B [R-TX-2]"],
                "Taxation",
                &["Income tax"],
            );
        }
        let config = f.config.clone().with_workers(16);
        run_stages(&f.db, &config, Stages::ALL).unwrap();

        let cell = f.db.get_cell("1_2").unwrap().unwrap();
        assert_eq!(cell.count, bill_count);
        let mut numbers = cell.bill_numbers.clone();
        numbers.sort();
        assert_eq!(numbers, (1..=bill_count).collect::<Vec<_>>());
        assert_eq!(cell.bills.len() as i64, bill_count);
        assert_eq!(cell.subjects, vec!["Income tax"]);

        let b = f.db.member(2).unwrap().unwrap();
        assert_eq!(b.counts.get("1"), Some(&bill_count));
    }

    #[test]
    fn test_counts_agree_with_cells() {
        let f = fixture();
        write_bill(&f.config.bills_dir, 1, &["A [D-CA-1]"], &["B [R-TX-2]", "C [I-ME-2]"], "X", &[]);
        write_bill(&f.config.bills_dir, 2, &["B [R-TX-2]"], &["C [I-ME-2]", "D [R-OH-4]"], "X", &[]);
        write_bill(&f.config.bills_dir, 3, &["D [R-OH-4]"], &["A [D-CA-1]"], "X", &[]);
        run_stages(&f.db, &f.config, Stages::ALL).unwrap();

        let cells = f.db.cells().unwrap();
        for member in f.db.members().unwrap() {
            let touching: Vec<_> = cells
                .iter()
                .filter(|c| c.key().unwrap().counterpart(member.id).is_some())
                .collect();
            assert_eq!(member.counts.len(), touching.len());
            for cell in touching {
                let other = cell.key().unwrap().counterpart(member.id).unwrap();
                assert_eq!(member.counts[&other.to_string()], cell.count);
            }
        }
        for cell in &cells {
            let key: CellKey = cell.position.parse().unwrap();
            assert!(key.low() < key.high());
        }
    }

    #[test]
    fn test_tag_backfill_rerun_does_not_duplicate() {
        let f = fixture();
        write_bill(&f.config.bills_dir, 100, &["A [D-CA-1]"], &["B [R-TX-2]"], "Health", &["Health"]);
        write_bill(&f.config.bills_dir, 200, &["A [D-CA-1]"], &["C [D-NY-3]"], "Health", &[]);
        run_stages(&f.db, &f.config, Stages::ALL).unwrap();

        let pool = WorkerPool::new(2);
        tag_cells(&f.db, &pool).unwrap();

        let cell = f.db.get_cell("1_2").unwrap().unwrap();
        assert_eq!(cell.policy_areas, vec!["Health"]);
        assert_eq!(cell.subjects, vec!["Health"]);
    }

    #[test]
    fn test_unknown_party_aborts_run() {
        let f = fixture();
        write_bill(&f.config.bills_dir, 1, &["A [D-CA-1]"], &[], "X", &[]);
        write_bill(&f.config.bills_dir, 2, &["G [G-OR-2]"], &[], "X", &[]);
        let err = run_stages(&f.db, &f.config, Stages::ALL).unwrap_err();
        assert!(matches!(err, CosignError::UnknownParty { .. }));
        assert!(f.db.members().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_document_aborts_run() {
        let f = fixture();
        write_bill(&f.config.bills_dir, 1, &["A [D-CA-1]"], &["B [R-TX-2]"], "X", &[]);
        std::fs::write(f.config.bills_dir.join("BILLSTATUS-116hr2.xml"), b"\xff\xfe<bill>").unwrap();
        let err = run_stages(&f.db, &f.config, Stages::ALL).unwrap_err();
        assert!(matches!(err, CosignError::Io(_)));
        assert!(f.db.members().unwrap().is_empty());
        assert!(f.db.cells().unwrap().is_empty());
    }

    #[test]
    fn test_missing_member_is_lookup_failure() {
        let f = fixture();
        write_bill(&f.config.bills_dir, 1, &["A [D-CA-1]"], &["B [R-TX-2]"], "X", &[]);
        let only_bills = Stages {
            bills: true,
            members: false,
            cells: false,
            topics: false,
        };
        run_stages(&f.db, &f.config, only_bills).unwrap();
        let cells_only = Stages {
            bills: false,
            members: false,
            cells: true,
            topics: false,
        };
        let err = run_stages(&f.db, &f.config, cells_only).unwrap_err();
        assert!(matches!(err, CosignError::UnresolvedSponsor { .. }));
    }

    #[test]
    fn test_reset_allows_clean_rerun() {
        let f = fixture();
        write_bill(&f.config.bills_dir, 100, &["A [D-CA-1]"], &["B [R-TX-2]"], "Health", &[]);
        run_stages(&f.db, &f.config, Stages::ALL).unwrap();
        f.db.reset(Collections::ALL).unwrap();
        let report = run_stages(&f.db, &f.config, Stages::ALL).unwrap();

        let stage_names: Vec<&str> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            stage_names,
            vec!["bills", "members", "cells", "counts", "tag-policy-areas", "tag-subjects"]
        );
        assert_eq!(f.db.get_cell("1_2").unwrap().unwrap().count, 1);
    }

    #[test]
    fn test_stages_or_all() {
        let none = Stages {
            bills: false,
            members: false,
            cells: false,
            topics: false,
        };
        assert_eq!(none.or_all(), Stages::ALL);
        let some = Stages { topics: true, ..none };
        assert_eq!(some.or_all(), some);
    }

    #[test]
    fn test_run_pipeline_initialises_database() {
        let f = fixture();
        write_bill(&f.config.bills_dir, 5, &["A [D-CA-1]"], &[], "X", &["Y"]);
        let fresh = PipelineConfig::new(&f.config.bills_dir, f._dir.path().join("fresh.db"));
        let report = run_pipeline(&fresh, Stages::ALL).unwrap();
        assert_eq!(report.stages[0].units, 1);
        let db = Database::new(&fresh.db_path).unwrap();
        assert_eq!(db.topics(TopicKind::Subject).unwrap()[0].bill_numbers, vec![5]);
    }
}
