//! Bill status XML parsing.
//!
//! The document is streamed with `quick-xml` while a stack of open elements
//! is kept, so every extraction rule can look at its immediate parent (and
//! grandparent) tags. That scoping is what keeps nested `sponsors`,
//! `cosponsors` and `title` elements (amendments, related bills, committee
//! reports) out of the top-level bill record.

use std::path::Path;

use indexmap::IndexSet;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::errors::{CosignError, CosignResult};
use crate::indexer::filesystem::scan_bill_files;
use crate::indexer::pool::{StageStats, WorkerPool};
use crate::models::Bill;
use crate::store::database::Database;

const BILL_TAG: &str = "bill";
const HONORIFIC: &str = "Rep. ";

struct Frame {
    tag: String,
    text: String,
    children: usize,
    first_child: Option<String>,
    /// Text handed up by a child, used for legislative subject items.
    captured: Option<String>,
}

impl Frame {
    fn open(tag: String) -> Self {
        Frame {
            tag,
            text: String::new(),
            children: 0,
            first_child: None,
            captured: None,
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn tag_at(stack: &[Frame], depth_from_top: usize) -> Option<&str> {
    stack
        .len()
        .checked_sub(depth_from_top + 1)
        .map(|i| stack[i].tag.as_str())
}

#[derive(Default)]
struct BillDraft {
    number: Option<i64>,
    title: Option<String>,
    sponsors: Vec<String>,
    cosponsors: Vec<String>,
    policy_area: Option<String>,
    subjects: IndexSet<String>,
}

impl BillDraft {
    /// Apply the extraction rules to a just-closed element. `stack` holds its
    /// ancestors, innermost last.
    fn close(&mut self, frame: Frame, stack: &mut [Frame]) -> CosignResult<()> {
        let parent = tag_at(stack, 0);
        let grandparent = tag_at(stack, 1);

        match frame.tag.as_str() {
            "billNumber" if self.number.is_none() => {
                let text = frame.text.trim();
                let number: i64 = text
                    .parse()
                    .map_err(|_| CosignError::Parse(format!("invalid billNumber {text:?}")))?;
                if number <= 0 {
                    return Err(CosignError::Parse(format!("non-positive billNumber {number}")));
                }
                self.number = Some(number);
            }
            "title" if parent == Some(BILL_TAG) && self.title.is_none() => {
                self.title = Some(frame.text.trim().to_string());
            }
            "fullName" if parent == Some("item") && tag_at(stack, 2) == Some(BILL_TAG) => {
                let name = frame.text.trim().replacen(HONORIFIC, "", 1);
                match grandparent {
                    Some("sponsors") => self.sponsors.push(name),
                    Some("cosponsors") => self.cosponsors.push(name),
                    _ => {}
                }
            }
            "name" if parent == Some("policyArea") && self.policy_area.is_none() => {
                self.policy_area = Some(frame.text.trim().to_string());
            }
            "policyArea" => {
                if let Some(first) = frame.first_child.as_deref() {
                    if first != "name" {
                        return Err(CosignError::Parse(format!(
                            "expected <name> under <policyArea>, found <{first}>"
                        )));
                    }
                }
            }
            "item" if parent == Some("legislativeSubjects") => {
                if frame.children != 1 {
                    return Err(CosignError::Parse(format!(
                        "expected a single name node under a legislative subjects item, found {}",
                        frame.children
                    )));
                }
                if let Some(subject) = frame.captured {
                    self.subjects.insert(subject);
                }
            }
            _ if parent == Some("item") && grandparent == Some("legislativeSubjects") => {
                if let Some(item) = stack.last_mut() {
                    item.captured = Some(frame.text.trim().to_string());
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> CosignResult<Bill> {
        let number = self
            .number
            .ok_or_else(|| CosignError::Parse("document has no billNumber".to_string()))?;
        let title = self.title.unwrap_or_default();
        let mut bill = Bill {
            number,
            title_lower: title.to_lowercase(),
            title,
            sponsors: self.sponsors,
            cosponsors: self.cosponsors,
            policy_area: self.policy_area,
            subjects: self.subjects.into_iter().collect(),
            ..Default::default()
        };
        bill.tally_parties()?;
        Ok(bill)
    }
}

/// Parse one bill status document. The link is left empty; callers that
/// know the congress fill it in.
pub fn parse_bill_xml(source: &str) -> CosignResult<Bill> {
    let mut reader = Reader::from_str(source);
    reader.trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut draft = BillDraft::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = local_name(&e);
                note_child(&mut stack, &tag);
                stack.push(Frame::open(tag));
            }
            Event::Empty(e) => {
                let tag = local_name(&e);
                note_child(&mut stack, &tag);
                draft.close(Frame::open(tag), &mut stack)?;
            }
            Event::Text(t) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| CosignError::Parse("unbalanced closing tag".to_string()))?;
                draft.close(frame, &mut stack)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(CosignError::Parse(format!(
            "document ended inside <{}>",
            open.tag
        )));
    }
    draft.finish()
}

fn note_child(stack: &mut [Frame], tag: &str) {
    if let Some(parent) = stack.last_mut() {
        parent.children += 1;
        if parent.first_child.is_none() {
            parent.first_child = Some(tag.to_string());
        }
    }
}

/// Read and parse one document, filling in the congress.gov link.
pub fn parse_bill_file(path: &Path, config: &PipelineConfig) -> CosignResult<Bill> {
    let source = std::fs::read_to_string(path)?;
    let mut bill = parse_bill_xml(&source).map_err(|e| match e {
        CosignError::Parse(msg) => CosignError::Parse(format!("{}: {msg}", path.display())),
        other => other,
    })?;
    bill.link = config.bill_link(bill.number);
    Ok(bill)
}

/// Parse every document under `config.bills_dir` and store one bill each.
pub fn populate_bills(
    db: &Database,
    pool: &WorkerPool,
    config: &PipelineConfig,
) -> CosignResult<StageStats> {
    let files = scan_bill_files(&config.bills_dir)?;
    pool.run("bills", &files, |path| {
        let bill = parse_bill_file(path, config)?;
        debug!(
            "Parsed bill {} ({} sponsors, {} cosponsors) from {}",
            bill.number,
            bill.sponsors.len(),
            bill.cosponsors.len(),
            path.display()
        );
        db.insert_bill(&bill)
    })
}
