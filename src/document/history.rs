//! Undo and redo of the local author's operations
//!
//! Undo walks the local author's ops newest first and commits the inverse
//! of the first one that still changes something inside the requested
//! range. The walk position survives between undos and is dropped by the
//! next local edit. Each undo leaves a redo template behind; redo gives it
//! fresh ids and commits it.
//!
//! The inverses undo commits stay in the op log like any other local op,
//! but later walks skip them: taking back an undo is what redo is for.

use super::edit::id_runs;
use super::Document;
use crate::crdt::{FormatOp, Id, InsertOp, MarkOp, Operation};
use crate::error::Result;
use crate::format::{Format, SpanFormat, ERASE_KEY};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default)]
pub(crate) struct UndoState {
    /// Exclusive upper seq of the undo walk; `None` starts from the clock
    bound: Option<u64>,
    redo: Vec<Operation>,
    /// Seqs of the inverses committed by undo, never walked again
    inverses: BTreeSet<u64>,
}

impl UndoState {
    pub(crate) fn reset(&mut self) {
        self.bound = None;
        self.redo.clear();
    }

    fn walkable(&self, op: &Operation) -> bool {
        op.id().is_some_and(|id| !self.inverses.contains(&id.seq))
    }
}

/// Inverse and redo ops of one operation over a range
#[derive(Debug, Default)]
struct Inversion {
    undo: Vec<Operation>,
    redo: Vec<Operation>,
}

/// Mark ops over runs of `ids`, with placeholder ids
fn mark_templates(ids: Vec<Id>, delete: bool) -> Vec<Operation> {
    id_runs(ids)
        .into_iter()
        .map(|(target, span)| {
            let mark = MarkOp {
                id: target.clone(),
                target,
                span,
            };
            if delete {
                Operation::Delete(mark)
            } else {
                Operation::Show(mark)
            }
        })
        .collect()
}

impl Document {
    /// Revert the newest local op still affecting `[start, end]`
    ///
    /// Returns the committed inverse, or `None` once the local history is
    /// exhausted.
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn undo(&mut self, start: &Id, end: &Id) -> Result<Option<Operation>> {
        let (s, e) = self.tot_range(start, end)?;
        let author = self.config.author.clone();
        let mut bound = self.undo.bound.unwrap_or_else(|| self.clock.value());

        loop {
            let Some(op) = self.ops.before(&author, bound)?.cloned() else {
                self.undo.bound = Some(0);
                return Ok(None);
            };
            bound = op.id().map_or(0, |id| id.seq);
            if !self.undo.walkable(&op) {
                continue;
            }
            let inversion = self.invert(&op, s, e)?;
            let Some(inverse) = Operation::from_ops(inversion.undo) else {
                continue;
            };

            self.commit(&inverse)?;
            if let Some(id) = inverse.id() {
                self.undo.inverses.insert(id.seq);
            }
            self.undo.bound = Some(bound);
            if let Some(redo) = Operation::from_ops(inversion.redo) {
                self.undo.redo.push(redo);
            }
            debug!(undone = bound, redo_depth = self.undo.redo.len(), "undo");
            return Ok(Some(inverse));
        }
    }

    /// Re-apply the most recently undone change
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn redo(&mut self) -> Result<Option<Operation>> {
        let Some(template) = self.undo.redo.last() else {
            return Ok(None);
        };
        let mut op = template.clone();
        self.reassign_ids(&mut op);
        self.commit(&op)?;
        self.undo.redo.pop();
        self.undo.bound = None;
        debug!(redo_depth = self.undo.redo.len(), "redo");
        Ok(Some(op))
    }

    pub fn can_undo(&self) -> bool {
        let mut bound = self.undo.bound.unwrap_or_else(|| self.clock.value());
        while let Ok(Some(op)) = self.ops.before(&self.config.author, bound) {
            if self.undo.walkable(op) {
                return true;
            }
            bound = op.id().map_or(0, |id| id.seq);
        }
        false
    }

    pub fn can_redo(&self) -> bool {
        !self.undo.redo.is_empty()
    }

    fn in_range(&self, id: &Id, s: usize, e: usize) -> Result<bool> {
        let (_, tot) = self.rope.offsets(self.slot_of(id)?)?;
        Ok(s <= tot && tot <= e)
    }

    fn invert(&mut self, op: &Operation, s: usize, e: usize) -> Result<Inversion> {
        let mut out = Inversion::default();
        match op {
            Operation::Insert(ins) => {
                let ids = self.inserted_in_range(ins, s, e)?;
                out.redo = mark_templates(ids.clone(), false);
                out.undo = self.mark_ops(ids, true);
            }
            Operation::Delete(mark) | Operation::Show(mark) => {
                let deleting = matches!(op, Operation::Delete(_));
                let mut ids = Vec::new();
                for target in mark.targets() {
                    // only targets the op actually left in its state
                    if self.in_range(&target, s, e)? && self.is_deleted(&target)? == deleting {
                        ids.push(target);
                    }
                }
                out.redo = mark_templates(ids.clone(), deleting);
                out.undo = self.mark_ops(ids, !deleting);
            }
            Operation::Format(f) => out = self.invert_format(f, s, e)?,
            Operation::Multi(ops) => {
                for inner in ops.iter().rev() {
                    let part = self.invert(inner, s, e)?;
                    out.undo.extend(part.undo);
                    out.redo.splice(0..0, part.redo);
                }
            }
            Operation::Rewind(rewind) => {
                for inner in rewind.ops.iter().rev() {
                    let part = self.invert(inner, s, e)?;
                    out.undo.extend(part.undo);
                    out.redo.splice(0..0, part.redo);
                }
            }
            Operation::Snapshot(_) => {}
        }
        Ok(out)
    }

    fn inserted_in_range(&self, ins: &InsertOp, s: usize, e: usize) -> Result<Vec<Id>> {
        let mut ids = Vec::new();
        for k in 0..ins.len() {
            let id = ins.id.offset(k);
            if self.in_range(&id, s, e)? && !self.is_deleted(&id)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn invert_format(&mut self, f: &FormatOp, s: usize, e: usize) -> Result<Inversion> {
        let mut out = Inversion::default();
        if let Format::Line(_) = f.format {
            if !self.in_range(&f.start, s, e)? {
                return Ok(out);
            }
            let prev = self.formats.line_format(&f.start, |id| *id < f.id);
            out.undo.push(Operation::Format(FormatOp {
                id: self.next_id(1),
                start: f.start.clone(),
                end: f.end.clone(),
                format: Format::Line(prev),
            }));
            out.redo.push(Operation::Format(f.clone()));
            return Ok(out);
        }

        let (fs, fe) = self.tot_range(&f.start, &f.end)?;
        let (lo, hi) = (fs.max(s), fe.min(e));
        if lo > hi {
            return Ok(out);
        }
        let prev = self.span_formats_where(lo, hi, |id| *id < f.id)?;
        let mut k = 0;
        while k < prev.len() {
            let run_start = k;
            while k + 1 < prev.len() && prev[k + 1] == prev[run_start] {
                k += 1;
            }
            let mut format: SpanFormat = prev[run_start].clone();
            format.insert(ERASE_KEY.into(), "true".into());
            out.undo.push(Operation::Format(FormatOp {
                id: self.next_id(1),
                start: self.get_tot_id(lo + run_start)?,
                end: self.get_tot_id(lo + k)?,
                format: Format::Span(format),
            }));
            k += 1;
        }
        out.redo.push(Operation::Format(FormatOp {
            id: f.id.clone(),
            start: self.get_tot_id(lo)?,
            end: self.get_tot_id(hi)?,
            format: f.format.clone(),
        }));
        Ok(out)
    }

    /// Give every op in a redo template a fresh local id
    fn reassign_ids(&mut self, op: &mut Operation) {
        match op {
            Operation::Insert(ins) => ins.id = self.next_id(ins.len()),
            Operation::Delete(mark) | Operation::Show(mark) => mark.id = self.next_id(1),
            Operation::Format(f) => f.id = self.next_id(1),
            Operation::Rewind(rewind) => {
                rewind.id = self.next_id(1);
                for inner in &mut rewind.ops {
                    self.reassign_ids(inner);
                }
            }
            Operation::Multi(ops) | Operation::Snapshot(ops) => {
                for inner in ops {
                    self.reassign_ids(inner);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentConfig;
    use crate::format::LineFormat;

    fn undo_all(doc: &mut Document) -> Option<Operation> {
        let (start, end) = doc.full_range()?;
        doc.undo(&start, &end).unwrap()
    }

    #[test]
    fn test_undo_typing_restores_text() {
        let mut doc = Document::new("a");
        doc.insert(0, "base\n").unwrap();
        let before = doc.get_text();
        for (i, ch) in ["x", "y", "z"].iter().enumerate() {
            doc.insert(4 + i, ch).unwrap();
        }
        assert_eq!(doc.get_text(), "basexyz\n");
        for _ in 0..3 {
            assert!(undo_all(&mut doc).is_some());
        }
        assert_eq!(doc.get_text(), before);
        assert!(doc.can_redo());
    }

    #[test]
    fn test_fresh_document_cannot_undo() {
        let mut doc = Document::new("a");
        assert!(!doc.can_undo());
        assert!(!doc.can_redo());
        doc.insert(0, "a").unwrap();
        assert!(doc.can_undo());
        assert!(!doc.can_redo());

        assert!(undo_all(&mut doc).is_some());
        assert!(!doc.can_undo());
        assert!(undo_all(&mut doc).is_none());
        assert_eq!(doc.get_text(), "");
    }

    #[test]
    fn test_redo_reapplies_with_fresh_ids() {
        let mut doc = Document::new("a");
        doc.insert(0, "abc").unwrap();
        doc.delete(1, 1).unwrap();
        assert_eq!(doc.get_text(), "ac");

        undo_all(&mut doc).unwrap();
        assert_eq!(doc.get_text(), "abc");
        let clock = doc.clock();
        let op = doc.redo().unwrap().unwrap();
        assert_eq!(doc.get_text(), "ac");
        assert!(op.id().unwrap().seq >= clock);
        assert!(!doc.can_redo());
        assert!(doc.redo().unwrap().is_none());
    }

    #[test]
    fn test_local_edit_clears_redo() {
        let mut doc = Document::new("a");
        doc.insert(0, "ab").unwrap();
        undo_all(&mut doc).unwrap();
        assert!(doc.can_redo());
        doc.insert(0, "q").unwrap();
        assert!(!doc.can_redo());
    }

    #[test]
    fn test_undo_format_restores_previous_values() {
        let mut doc = Document::new("a");
        doc.insert(0, "abcd\n").unwrap();
        doc.format(0, 2, Format::span([("i", "true")])).unwrap();
        doc.format(1, 3, Format::span([("b", "true")])).unwrap();
        doc.format(0, 1, Format::Line(LineFormat::Header(1))).unwrap();

        undo_all(&mut doc).unwrap();
        assert_eq!(
            doc.get_full_html(false).unwrap(),
            "<p><em>a</em><strong><em>b</em></strong><strong>cd</strong></p>"
        );
        undo_all(&mut doc).unwrap();
        assert_eq!(
            doc.get_full_html(false).unwrap(),
            "<p><em>ab</em><span>cd</span></p>"
        );
    }

    #[test]
    fn test_undo_never_touches_remote_ops() {
        let mut alice = Document::new("alice");
        let mut bob = Document::with_config(DocumentConfig::new("bob"));
        let op = alice.insert(0, "hi\n").unwrap();
        bob.merge_op(op).unwrap();
        let op = bob.insert(2, " bob").unwrap();
        alice.merge_op(op).unwrap();

        assert!(undo_all(&mut alice).is_some());
        assert_eq!(alice.get_text(), " bob");
        assert!(undo_all(&mut alice).is_none());
    }

    #[test]
    fn test_undo_after_new_edit_skips_earlier_inverse() {
        let mut doc = Document::new("a");
        doc.insert(0, "x").unwrap();
        doc.insert(1, "b").unwrap();
        undo_all(&mut doc).unwrap();
        assert_eq!(doc.get_text(), "x");

        doc.insert(1, "c").unwrap();
        undo_all(&mut doc).unwrap();
        assert_eq!(doc.get_text(), "x");
        // the next own change is the original "x"; the delete of "b" was an undo
        undo_all(&mut doc).unwrap();
        assert_eq!(doc.get_text(), "");
        assert!(!doc.can_undo());
        assert!(undo_all(&mut doc).is_none());
        assert_eq!(doc.get_text(), "");
    }

    #[test]
    fn test_undo_of_redo_reverts_the_redo() {
        let mut doc = Document::new("a");
        doc.insert(0, "ab").unwrap();
        undo_all(&mut doc).unwrap();
        assert_eq!(doc.get_text(), "");
        doc.redo().unwrap().unwrap();
        assert_eq!(doc.get_text(), "ab");
        undo_all(&mut doc).unwrap();
        assert_eq!(doc.get_text(), "");
        assert!(undo_all(&mut doc).is_none());
    }

    #[test]
    fn test_undo_limited_to_range() {
        let mut doc = Document::new("a");
        doc.insert(0, "one\n").unwrap();
        doc.insert(4, "two\n").unwrap();
        let o = doc.get_vis_id(0).unwrap();
        let nl = doc.get_vis_id(3).unwrap();
        // the newest op inserted "two\n", which lies outside "one\n"
        doc.undo(&o, &nl).unwrap().unwrap();
        assert_eq!(doc.get_text(), "two\n");
    }
}
