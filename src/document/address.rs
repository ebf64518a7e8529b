//! Content addresses of ranges and rewinding a range to one

use super::view::View;
use super::Document;
use crate::crdt::{ContentAddress, FormatOp, Id, Operation, RewindOp};
use crate::error::Result;
use crate::format::{Format, SpanFormat, ERASE_KEY};
use tracing::{debug, instrument};

impl Document {
    /// Version of the inclusive total range `[start, end]`
    ///
    /// Folds in every character of the range, the delete/show markers on
    /// those characters, the line formats on their newlines and the span
    /// formats overlapping the range.
    pub fn get_address(&self, start: &Id, end: &Id) -> Result<ContentAddress> {
        let (s, e) = self.tot_range(start, end)?;
        let mut address = ContentAddress::new(start.clone(), end.clone());
        for slot in self.slots_between(s, e) {
            let node = self.fugue.node(slot)?;
            address.add(&node.id);
            for marker in self.history.markers(&node.id) {
                address.add(&marker.id);
            }
            if node.ch == '\n' {
                for op in self.formats.line_ops(&node.id) {
                    address.add(&op.id);
                }
            }
        }
        for op in self.formats.span_ops() {
            let (os, oe) = self.tot_range(&op.start, &op.end)?;
            if os <= e && oe >= s {
                address.add(&op.id);
            }
        }
        Ok(address)
    }

    /// Restore `[start, end]` to what it looked like at `target`
    ///
    /// Returns `None` when the range already matches.
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn rewind(
        &mut self,
        start: &Id,
        end: &Id,
        target: &ContentAddress,
    ) -> Result<Option<Operation>> {
        let id = self.next_id(1);
        let (s, e) = self.tot_range(start, end)?;
        let then = View::At(target);

        let mut hide = Vec::new();
        let mut show = Vec::new();
        let mut newlines = Vec::new();
        for slot in self.slots_between(s, e) {
            let was = self.visible_in(slot, then)?;
            let is = self.visible_in(slot, View::Current)?;
            let node = self.fugue.node(slot)?;
            match (was, is) {
                (false, true) => hide.push(node.id.clone()),
                (true, false) => show.push(node.id.clone()),
                _ => {}
            }
            if node.ch == '\n' {
                newlines.push(node.id.clone());
            }
        }

        let mut ops = self.mark_ops(hide, true);
        ops.extend(self.mark_ops(show, false));

        let cur = self.span_formats(s, e, View::Current)?;
        let old = self.span_formats(s, e, then)?;
        let mut k = 0;
        while k < cur.len() {
            if cur[k] == old[k] {
                k += 1;
                continue;
            }
            let run_start = k;
            while k + 1 < cur.len() && cur[k + 1] != old[k + 1] && old[k + 1] == old[run_start] {
                k += 1;
            }
            let mut format: SpanFormat = old[run_start].clone();
            format.insert(ERASE_KEY.into(), "true".into());
            ops.push(Operation::Format(FormatOp {
                id: self.next_id(1),
                start: self.get_tot_id(s + run_start)?,
                end: self.get_tot_id(s + k)?,
                format: Format::Span(format),
            }));
            k += 1;
        }

        for nl in newlines {
            let was = self.line_format_in(&nl, then);
            if was != self.line_format_in(&nl, View::Current) {
                ops.push(Operation::Format(FormatOp {
                    id: self.next_id(1),
                    start: nl.clone(),
                    end: nl,
                    format: Format::Line(was),
                }));
            }
        }

        if ops.is_empty() {
            return Ok(None);
        }
        debug!(ops = ops.len(), "rewinding range");
        let op = Operation::Rewind(RewindOp {
            id,
            address: target.clone(),
            ops,
        });
        self.commit_local(&op)?;
        Ok(Some(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentConfig;
    use crate::format::LineFormat;

    #[test]
    fn test_address_ignores_edits_outside_range() {
        let mut doc = Document::new("a");
        doc.insert(0, "abc\n").unwrap();
        let b = doc.get_vis_id(1).unwrap();
        let c = doc.get_vis_id(2).unwrap();
        let before = doc.get_address(&b, &c).unwrap();

        doc.insert(0, "x").unwrap();
        doc.format(0, 1, Format::span([("b", "true")])).unwrap();
        doc.format(4, 1, Format::Line(LineFormat::Header(1))).unwrap();
        assert_eq!(doc.get_address(&b, &c).unwrap(), before);

        doc.delete(2, 1).unwrap();
        let after = doc.get_address(&b, &c).unwrap();
        assert_ne!(after, before);
        assert!(after.contains(&Id::new("a", 7)));
    }

    #[test]
    fn test_address_includes_overlapping_formats() {
        let mut doc = Document::new("a");
        doc.insert(0, "abcd\n").unwrap();
        let a = doc.get_vis_id(0).unwrap();
        let b = doc.get_vis_id(1).unwrap();
        let before = doc.get_address(&a, &b).unwrap();
        doc.format(1, 2, Format::span([("i", "true")])).unwrap();
        assert_ne!(doc.get_address(&a, &b).unwrap(), before);
    }

    #[test]
    fn test_rewind_restores_range() {
        let mut alice = Document::new("alice");
        alice.insert(0, "hello\nworld\n").unwrap();
        let (start, end) = alice.full_range().unwrap();
        let target = alice.get_address(&start, &end).unwrap();

        alice.delete(0, 1).unwrap();
        alice.format(0, 3, Format::span([("b", "true")])).unwrap();
        alice.insert(4, "!").unwrap();
        alice.format(0, 1, Format::Line(LineFormat::Header(2))).unwrap();
        let mut bob = Document::from_ops(DocumentConfig::new("bob"), alice.to_ops().unwrap()).unwrap();

        let (start, end) = alice.full_range().unwrap();
        let op = alice.rewind(&start, &end, &target).unwrap().unwrap();
        assert!(matches!(op, Operation::Rewind(_)));
        assert_eq!(alice.get_text(), "hello\nworld\n");
        assert_eq!(
            alice.get_full_html(false).unwrap(),
            "<p><span>hello</span></p><p><span>world</span></p>"
        );

        bob.merge_op(op).unwrap();
        assert_eq!(bob.get_text(), alice.get_text());
        assert_eq!(bob.get_full_html(true).unwrap(), alice.get_full_html(true).unwrap());
        alice.validate().unwrap();
    }

    #[test]
    fn test_rewind_noop() {
        let mut doc = Document::new("a");
        doc.insert(0, "same\n").unwrap();
        let (start, end) = doc.full_range().unwrap();
        let target = doc.get_address(&start, &end).unwrap();
        doc.insert(5, "later").unwrap();
        assert!(doc.rewind(&start, &end, &target).unwrap().is_none());
    }
}
