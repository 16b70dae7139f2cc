//! Policy area and subject grouping, and the cell tag backfill.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::errors::CosignResult;
use crate::indexer::pool::{StageStats, WorkerPool};
use crate::models::{Bill, Cell, Topic, TopicKind};
use crate::store::database::{BillFilter, Database};

/// Topic -> bill numbers, in first-seen order.
#[derive(Debug, Default, PartialEq)]
pub struct TopicIndex {
    pub policy_areas: Vec<Topic>,
    pub subjects: Vec<Topic>,
}

fn into_topics(kind: TopicKind, grouped: IndexMap<String, Vec<i64>>) -> Vec<Topic> {
    grouped
        .into_iter()
        .map(|(name, bill_numbers)| Topic {
            kind,
            name,
            bill_numbers,
        })
        .collect()
}

/// Group bills by policy area and by each subject. Blank names are skipped;
/// a bill without a policy area still contributes its subjects.
pub fn group_topics(bills: &[Bill]) -> TopicIndex {
    let mut policy_areas: IndexMap<String, Vec<i64>> = IndexMap::new();
    let mut subjects: IndexMap<String, Vec<i64>> = IndexMap::new();

    for bill in bills {
        if let Some(area) = bill.policy_area.as_deref().map(str::trim) {
            if !area.is_empty() {
                policy_areas
                    .entry(area.to_string())
                    .or_default()
                    .push(bill.number);
            }
        }
        for subject in bill.subjects.iter().map(|s| s.trim()) {
            if subject.is_empty() {
                continue;
            }
            let numbers = subjects.entry(subject.to_string()).or_default();
            if numbers.last() != Some(&bill.number) {
                numbers.push(bill.number);
            }
        }
    }

    TopicIndex {
        policy_areas: into_topics(TopicKind::PolicyArea, policy_areas),
        subjects: into_topics(TopicKind::Subject, subjects),
    }
}

/// Positions of the cells sharing at least one bill with `topic`.
pub fn matching_positions(topic: &Topic, cells: &[Cell]) -> Vec<String> {
    cells
        .iter()
        .filter(|cell| cell.shares_any_bill(&topic.bill_numbers))
        .map(|cell| cell.position.clone())
        .collect()
}

/// Tag every existing cell with the stored topics: policy areas first, then
/// subjects, one unit per topic.
pub fn tag_cells(db: &Database, pool: &WorkerPool) -> CosignResult<Vec<StageStats>> {
    let cells = db.cells()?;
    let mut stats = Vec::with_capacity(2);
    for (stage, kind) in [
        ("tag-policy-areas", TopicKind::PolicyArea),
        ("tag-subjects", TopicKind::Subject),
    ] {
        let topics = db.topics(kind)?;
        stats.push(pool.run(stage, &topics, |topic| {
            let positions = matching_positions(topic, &cells);
            let tagged = db.tag_cells(kind, &topic.name, &positions)?;
            debug!(
                "Checked {} cells for {} {:?}: {} tagged",
                cells.len(),
                kind.as_str(),
                topic.name,
                tagged
            );
            Ok(())
        })?);
    }
    Ok(stats)
}

/// Persist topic groupings from all stored bills, then backfill cell tags.
pub fn populate_topics(db: &Database, pool: &WorkerPool) -> CosignResult<Vec<StageStats>> {
    let bills = db.bills(BillFilter::All)?;
    let index = group_topics(&bills);
    info!(
        "topics: {} policy areas, {} subjects across {} bills",
        index.policy_areas.len(),
        index.subjects.len(),
        bills.len()
    );
    db.insert_topics(&index.policy_areas)?;
    db.insert_topics(&index.subjects)?;
    tag_cells(db, pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(number: i64, area: Option<&str>, subjects: &[&str]) -> Bill {
        Bill {
            number,
            policy_area: area.map(str::to_string),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_group_topics_by_area_and_subject() {
        let bills = vec![
            bill(100, Some("Health"), &["Medicare", "Veterans"]),
            bill(200, Some("Health"), &["Medicare"]),
            bill(300, None, &["Veterans", " "]),
            bill(400, Some("  "), &[]),
        ];
        let index = group_topics(&bills);
        assert_eq!(index.policy_areas.len(), 1);
        assert_eq!(index.policy_areas[0].name, "Health");
        assert_eq!(index.policy_areas[0].bill_numbers, vec![100, 200]);

        let subjects: Vec<(&str, &[i64])> = index
            .subjects
            .iter()
            .map(|t| (t.name.as_str(), t.bill_numbers.as_slice()))
            .collect();
        assert_eq!(
            subjects,
            vec![("Medicare", &[100, 200][..]), ("Veterans", &[100, 300][..])]
        );
        assert!(index.subjects.iter().all(|t| t.kind == TopicKind::Subject));
    }

    #[test]
    fn test_matching_positions_intersects_bill_sets() {
        let topic = Topic {
            kind: TopicKind::Subject,
            name: "Health".into(),
            bill_numbers: vec![100, 200],
        };
        let cells = vec![
            Cell {
                position: "1_2".into(),
                bill_numbers: vec![200],
                ..Default::default()
            },
            Cell {
                position: "1_3".into(),
                bill_numbers: vec![300, 400],
                ..Default::default()
            },
        ];
        assert_eq!(matching_positions(&topic, &cells), vec!["1_2"]);
    }
}
