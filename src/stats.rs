//! Document and edit-history statistics
//!
//! Op stats bucket the edit history into segments of 100 seqs so a host can
//! chart activity over the life of a document. Authors are grouped by the
//! first character of their id when it is punctuation (bots and imports use
//! a marker prefix); everyone else falls under the empty prefix.

use crate::crdt::Operation;
use crate::document::Document;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Seqs per op stats segment
pub const OPS_PER_SEGMENT: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocStats {
    pub word_count: usize,
    pub paragraph_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpStats {
    /// Inserted chars per segment
    pub inserts: Vec<usize>,
    /// Deleted chars per segment
    pub deletes: Vec<usize>,
    pub inserts_by_prefix: BTreeMap<String, Vec<usize>>,
    pub deletes_by_prefix: BTreeMap<String, Vec<usize>>,
    /// Visible chars grouped by author prefix
    pub current_chars_by_prefix: BTreeMap<String, usize>,
    pub segments: usize,
}

impl OpStats {
    fn with_segments(segments: usize) -> Self {
        Self {
            inserts: vec![0; segments],
            deletes: vec![0; segments],
            segments,
            ..Self::default()
        }
    }

    fn add(&mut self, op: &Operation, prefix: &str) {
        match op {
            Operation::Insert(ins) => {
                let segment = (ins.id.seq / OPS_PER_SEGMENT) as usize;
                bump(&mut self.inserts, &mut self.inserts_by_prefix, self.segments, prefix, segment, ins.len());
            }
            Operation::Delete(mark) => {
                let segment = (mark.id.seq / OPS_PER_SEGMENT) as usize;
                bump(&mut self.deletes, &mut self.deletes_by_prefix, self.segments, prefix, segment, mark.span);
            }
            Operation::Multi(ops) => ops.iter().for_each(|inner| self.add(inner, prefix)),
            Operation::Rewind(rewind) => rewind.ops.iter().for_each(|inner| self.add(inner, prefix)),
            Operation::Show(_) | Operation::Format(_) | Operation::Snapshot(_) => {}
        }
    }
}

fn bump(
    totals: &mut [usize],
    by_prefix: &mut BTreeMap<String, Vec<usize>>,
    segments: usize,
    prefix: &str,
    segment: usize,
    count: usize,
) {
    if segment >= segments {
        return;
    }
    totals[segment] += count;
    by_prefix
        .entry(prefix.to_string())
        .or_insert_with(|| vec![0; segments])[segment] += count;
}

/// Grouping prefix of an author id
pub fn author_prefix(author: &str) -> &str {
    match author.chars().next() {
        Some(first) if !first.is_alphanumeric() => &author[..first.len_utf8()],
        _ => "",
    }
}

impl Document {
    /// Word and paragraph counts of the visible text
    ///
    /// Paragraphs are runs of non-blank lines.
    pub fn doc_stats(&self) -> DocStats {
        let text = self.get_text();
        let mut paragraph_count = 0;
        let mut in_paragraph = false;
        for line in text.split('\n') {
            if line.trim().is_empty() {
                in_paragraph = false;
            } else if !in_paragraph {
                paragraph_count += 1;
                in_paragraph = true;
            }
        }
        DocStats {
            word_count: text.split_whitespace().count(),
            paragraph_count,
        }
    }

    pub fn op_stats(&self) -> Result<OpStats> {
        let ops = self.op_index();
        let segments = (ops.max_seq_overall() / OPS_PER_SEGMENT) as usize + 1;
        let mut stats = OpStats::with_segments(segments);
        for (author, tree) in ops.authors() {
            let prefix = author_prefix(author);
            for op in tree.iter() {
                stats.add(op, prefix);
            }
        }
        for author in self.visible_authors()? {
            *stats
                .current_chars_by_prefix
                .entry(author_prefix(author).to_string())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentConfig;
    use crate::format::Format;

    #[test]
    fn test_doc_stats() {
        let mut doc = Document::new("a");
        assert_eq!(doc.doc_stats(), DocStats::default());
        doc.insert(0, "Hello world\nsecond line\n\n  \nlast para here").unwrap();
        assert_eq!(
            doc.doc_stats(),
            DocStats {
                word_count: 7,
                paragraph_count: 2,
            }
        );
    }

    #[test]
    fn test_op_stats_empty() {
        let doc = Document::new("a");
        let stats = doc.op_stats().unwrap();
        assert_eq!(stats, OpStats::with_segments(1));
        assert_eq!(
            serde_json::to_value(&stats).unwrap()["currentCharsByPrefix"],
            serde_json::json!({})
        );
    }

    #[test]
    fn test_op_stats_counts_inserts_and_deletes() {
        let mut doc = Document::new("a");
        doc.insert(0, "hello world").unwrap();
        doc.format(6, 5, Format::span([("b", "true")])).unwrap();
        doc.delete(0, 6).unwrap();

        let stats = doc.op_stats().unwrap();
        assert_eq!(stats.segments, 1);
        assert_eq!(stats.inserts, vec![11]);
        assert_eq!(stats.deletes, vec![6]);
        assert_eq!(stats.inserts_by_prefix[""], vec![11]);
        assert_eq!(stats.current_chars_by_prefix[""], 5);
    }

    #[test]
    fn test_op_stats_groups_by_prefix() {
        let mut human = Document::new("alice");
        let mut bot = Document::with_config(DocumentConfig::new("!ai"));
        let op = human.insert(0, "hi").unwrap();
        bot.merge_op(op).unwrap();
        let op = bot.insert(2, " there").unwrap();
        human.merge_op(op).unwrap();

        let stats = human.op_stats().unwrap();
        assert_eq!(stats.current_chars_by_prefix["!"], 6);
        assert_eq!(stats.current_chars_by_prefix[""], 2);
        assert_eq!(stats.inserts_by_prefix["!"].iter().sum::<usize>(), 6);
        assert_eq!(author_prefix("日本"), "");
        assert_eq!(author_prefix(""), "");
    }

    #[test]
    fn test_segments_follow_max_seq() {
        let mut doc = Document::new("a");
        for i in 0..120 {
            doc.insert(i, "x").unwrap();
        }
        let stats = doc.op_stats().unwrap();
        assert_eq!(stats.segments, 2);
        assert_eq!(stats.inserts, vec![100, 20]);
    }
}
