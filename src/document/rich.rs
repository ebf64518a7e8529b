//! Editor-level edits: selection replacement, inherited formats, markdown
//! shortcuts and line-aware deletes

use super::view::View;
use super::Document;
use crate::crdt::{FormatOp, Id, Operation};
use crate::error::{Result, SyncError};
use crate::format::{intersect, Format, LineFormat, SpanFormat, ERASE_KEY};
use crate::markdown::cached_regex;
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

static BULLET: OnceLock<Option<Regex>> = OnceLock::new();
static ORDERED: OnceLock<Option<Regex>> = OnceLock::new();
static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
static QUOTE: OnceLock<Option<Regex>> = OnceLock::new();
static URL: OnceLock<Option<Regex>> = OnceLock::new();

/// Line format typed as a markdown prefix, e.g. `"- "` or `"## "`
fn shortcut(prefix: &str) -> Option<LineFormat> {
    let depth = |s: &str| {
        let indent = s.len() - s.trim_start_matches(' ').len();
        u8::try_from(indent / 2).unwrap_or(u8::MAX)
    };
    if cached_regex(&BULLET, r"^ *(-|\*) $")?.is_match(prefix) {
        return Some(LineFormat::BulletList(depth(prefix)));
    }
    if cached_regex(&ORDERED, r"^ *(\d+)\. $")?.is_match(prefix) {
        return Some(LineFormat::OrderedList(depth(prefix)));
    }
    if cached_regex(&HEADER, r"^#{1,6} $")?.is_match(prefix) {
        return Some(LineFormat::Header(prefix.trim_end().len() as u8));
    }
    if cached_regex(&QUOTE, r"^> $")?.is_match(prefix) {
        return Some(LineFormat::BlockQuote);
    }
    None
}

fn is_url(text: &str) -> bool {
    cached_regex(&URL, r"^(https?://|mailto:)[^\s<>]+$").is_some_and(|re| re.is_match(text))
}

fn is_space(segment: &str) -> bool {
    segment.chars().all(char::is_whitespace)
}

impl Document {
    /// Type `text` over the selection `[ix, ix + sel_len)`
    ///
    /// With `span_format` the new text gets exactly that format; without
    /// it the text inherits the format of the character left of the
    /// caret. Returns the op and the id of the character left of the new
    /// caret.
    pub fn rich_insert(
        &mut self,
        ix: usize,
        sel_len: usize,
        span_format: Option<SpanFormat>,
        text: &str,
    ) -> Result<(Operation, Option<Id>)> {
        if text.is_empty() {
            return Err(SyncError::InvalidArgument("cannot insert empty text".into()));
        }
        self.check_range(ix, sel_len)?;

        if sel_len > 0 && is_url(text) {
            let op = Operation::Format(FormatOp {
                start: self.get_vis_id(ix)?,
                end: self.get_vis_id(ix + sel_len - 1)?,
                id: self.next_id(1),
                format: Format::span([("a", text)]),
            });
            self.commit_local(&op)?;
            let cursor = self.get_vis_id(ix + sel_len - 1)?;
            return Ok((op, Some(cursor)));
        }

        let line = self.line_format_at(ix)?;
        if sel_len == 0 && text == " " && line == LineFormat::Plain {
            if let Some(result) = self.try_shortcut(ix)? {
                return Ok(result);
            }
        }
        if sel_len == 0 && text == "\n" && self.is_empty_line(ix) {
            if let Some(result) = self.try_exit_block(ix, &line)? {
                return Ok(result);
            }
        }

        let inherited = match span_format {
            Some(format) => Some(format),
            None => self.inherited_format(ix, sel_len)?,
        };

        let mut ops = if sel_len > 0 {
            self.delete_ops(ix, sel_len)?
        } else {
            Vec::new()
        };
        let ins = self.build_insert(ix, text)?;
        let first = ins.id.clone();
        let last = ins.id.offset(ins.len() - 1);
        ops.push(Operation::Insert(ins));

        if let Some(mut format) = inherited {
            format.insert(ERASE_KEY.into(), "true".into());
            ops.push(Operation::Format(FormatOp {
                id: self.next_id(1),
                start: first.clone(),
                end: last.clone(),
                format: Format::Span(format),
            }));
        }

        if text == "\n" && line != LineFormat::Plain {
            ops.push(self.line_op(first.clone(), line.clone()));
            if matches!(line, LineFormat::Header(_)) {
                if let Some(nl) = self.next_newline(ix + sel_len) {
                    let old = self.get_vis_id(nl)?;
                    ops.push(self.line_op(old, LineFormat::Plain));
                }
            }
        }

        let op = Operation::from_ops(ops)
            .ok_or_else(|| SyncError::Invariant("rich insert produced no ops".into()))?;
        self.commit_local(&op)?;
        Ok((op, Some(last)))
    }

    /// Delete a selection, keeping the first line's block format
    pub fn rich_delete(&mut self, ix: usize, len: usize) -> Result<(Operation, usize)> {
        let mut ops = self.delete_ops(ix, len)?;
        let first_nl = self
            .text
            .chars_at(ix)
            .take(len)
            .position(|c| c == '\n')
            .map(|k| ix + k);
        if let Some(nl) = first_nl {
            let deleted = self.get_vis_id(nl)?;
            let moved = self.formats.line_format(&deleted, |_| true);
            if let Some(survivor) = self.next_newline(ix + len) {
                let survivor = self.get_vis_id(survivor)?;
                if self.formats.line_format(&survivor, |_| true) != moved {
                    ops.push(self.line_op(survivor, moved));
                }
            }
        }
        let op = Operation::from_ops(ops)
            .ok_or_else(|| SyncError::InvalidArgument("nothing to delete".into()))?;
        self.commit_local(&op)?;
        Ok((op, ix))
    }

    /// Delete from the line start up to the caret, or the newline before
    /// the caret when it already sits at the line start
    pub fn rich_delete_line(&mut self, ix: usize) -> Result<Option<(Operation, usize)>> {
        if ix > self.len() {
            return Err(SyncError::PositionOutOfBounds {
                position: ix,
                length: self.len(),
            });
        }
        let start = self.line_start(ix);
        match (start == ix, ix) {
            (true, 0) => Ok(None),
            (true, _) => self.rich_delete(ix - 1, 1).map(Some),
            (false, _) => self.rich_delete(start, ix - start).map(Some),
        }
    }

    /// Delete one word before (or after, with `forward`) the caret
    ///
    /// Whitespace next to the caret goes with the word. At a line edge the
    /// newline is deleted instead.
    pub fn rich_delete_word(
        &mut self,
        ix: usize,
        forward: bool,
    ) -> Result<Option<(Operation, usize)>> {
        if ix > self.len() {
            return Err(SyncError::PositionOutOfBounds {
                position: ix,
                length: self.len(),
            });
        }
        if forward {
            if ix == self.len() {
                return Ok(None);
            }
            let end = self.next_newline(ix).unwrap_or(self.len());
            if end == ix {
                return self.rich_delete(ix, 1).map(Some);
            }
            let line: String = self.text.slice(ix..end).chars().collect();
            let count = word_span(line.split_word_bounds());
            self.rich_delete(ix, count).map(Some)
        } else {
            if ix == 0 {
                return Ok(None);
            }
            let start = self.line_start(ix);
            if start == ix {
                return self.rich_delete(ix - 1, 1).map(Some);
            }
            let line: String = self.text.slice(start..ix).chars().collect();
            let count = word_span(line.split_word_bounds().rev());
            self.rich_delete(ix - count, count).map(Some)
        }
    }

    /// Drop every span format in `[start, end]` and reset its lines to plain
    pub fn clear_formats(&mut self, start: &Id, end: &Id) -> Result<Operation> {
        let ops = self.clear_format_ops(start, end)?;
        let op = Operation::from_ops(ops)
            .ok_or_else(|| SyncError::Invariant("clear produced no ops".into()))?;
        self.commit_local(&op)?;
        Ok(op)
    }

    pub(crate) fn clear_format_ops(&mut self, start: &Id, end: &Id) -> Result<Vec<Operation>> {
        let (s, e) = self.tot_range(start, end)?;
        let mut newlines = Vec::new();
        for slot in self.slots_between(s, e) {
            let node = self.fugue.node(slot)?;
            if node.ch == '\n'
                && !self.rope.is_deleted(slot)
                && self.formats.line_format(&node.id, |_| true) != LineFormat::Plain
            {
                newlines.push(node.id.clone());
            }
        }

        let mut ops = vec![Operation::Format(FormatOp {
            id: self.next_id(1),
            start: start.clone(),
            end: end.clone(),
            format: Format::span([(ERASE_KEY, "true")]),
        })];
        for nl in newlines {
            ops.push(self.line_op(nl, LineFormat::Plain));
        }
        Ok(ops)
    }

    /// Span attributes shared by every visible character in `[start, end]`
    pub fn get_cur_span_format(&self, start: &Id, end: &Id) -> Result<SpanFormat> {
        let (s, e) = self.tot_range(start, end)?;
        let formats = self.span_formats(s, e, View::Current)?;
        let mut shared: Option<SpanFormat> = None;
        for (slot, format) in self.slots_between(s, e).zip(formats) {
            if self.rope.is_deleted(slot) {
                continue;
            }
            shared = Some(match shared {
                Some(acc) => intersect(&acc, &format),
                None => format,
            });
        }
        Ok(shared.unwrap_or_default())
    }

    /// Line format shared by every line touching `[start, end]`, or plain
    pub fn get_cur_line_format(&self, start: &Id, end: &Id) -> Result<LineFormat> {
        let (s, e) = self.tot_range(start, end)?;
        let (vis_start, _) = self.rope.offsets(self.tot_slot_of(s)?)?;
        let (vis_end, _) = self.rope.offsets(self.tot_slot_of(e)?)?;

        let mut terminators = Vec::new();
        let mut next = self.next_newline(vis_start);
        while let Some(nl) = next {
            terminators.push(nl);
            if nl >= vis_end {
                break;
            }
            next = self.next_newline(nl + 1);
        }

        let mut shared: Option<LineFormat> = None;
        for nl in terminators {
            let format = self.formats.line_format(&self.get_vis_id(nl)?, |_| true);
            match &shared {
                Some(existing) if *existing != format => return Ok(LineFormat::Plain),
                Some(_) => {}
                None => shared = Some(format),
            }
        }
        Ok(shared.unwrap_or_default())
    }

    fn tot_slot_of(&self, tot: usize) -> Result<usize> {
        self.rope.find_tot(tot).ok_or(SyncError::PositionOutOfBounds {
            position: tot,
            length: self.tot_len(),
        })
    }

    pub(crate) fn line_op(&mut self, newline: Id, line: LineFormat) -> Operation {
        Operation::Format(FormatOp {
            id: self.next_id(1),
            start: newline.clone(),
            end: newline,
            format: Format::Line(line),
        })
    }

    /// Turn `"- "`, `"1. "`, `"## "` or `"> "` at a line start into a line
    /// format, dropping the typed prefix
    fn try_shortcut(&mut self, ix: usize) -> Result<Option<(Operation, Option<Id>)>> {
        let start = self.line_start(ix);
        let mut prefix: String = self.text.slice(start..ix).chars().collect();
        prefix.push(' ');
        let Some(line) = shortcut(&prefix) else {
            return Ok(None);
        };

        let mut ops = if ix > start {
            self.delete_ops(start, ix - start)?
        } else {
            Vec::new()
        };
        ops.extend(self.line_format_ops(ix, 0, &line)?);
        let cursor = if start == 0 {
            None
        } else {
            Some(self.get_vis_id(start - 1)?)
        };
        let op = Operation::from_ops(ops)
            .ok_or_else(|| SyncError::Invariant("shortcut produced no ops".into()))?;
        self.commit_local(&op)?;
        Ok(Some((op, cursor)))
    }

    /// Enter on an empty list or quote line leaves the block
    fn try_exit_block(
        &mut self,
        ix: usize,
        line: &LineFormat,
    ) -> Result<Option<(Operation, Option<Id>)>> {
        let exits = line.is_list()
            || matches!(line, LineFormat::BlockQuote | LineFormat::IndentedLine(_));
        let Some(nl) = self.next_newline(ix).filter(|_| exits) else {
            return Ok(None);
        };
        let nl = self.get_vis_id(nl)?;
        let op = self.line_op(nl, LineFormat::Plain);
        self.commit_local(&op)?;
        let cursor = if ix == 0 {
            None
        } else {
            Some(self.get_vis_id(ix - 1)?)
        };
        Ok(Some((op, cursor)))
    }

    fn is_empty_line(&self, ix: usize) -> bool {
        self.line_start(ix) == ix && self.next_newline(ix) == Some(ix)
    }

    /// Format new text should carry when typed at `ix`, if it needs one
    fn inherited_format(&self, ix: usize, sel_len: usize) -> Result<Option<SpanFormat>> {
        let format_at = |vis: usize| -> Result<SpanFormat> {
            let (_, tot) = self.get_index(&self.get_vis_id(vis)?)?;
            Ok(self
                .span_formats(tot, tot, View::Current)?
                .pop()
                .unwrap_or_default())
        };
        let left = if ix > 0 { format_at(ix - 1)? } else { SpanFormat::new() };
        let right_ix = ix + sel_len;
        let right = if right_ix < self.len() {
            format_at(right_ix)?
        } else {
            SpanFormat::new()
        };
        if left.is_empty() && right.is_empty() {
            return Ok(None);
        }
        Ok(Some(left))
    }
}

/// Characters covered by the first word in `segments`, including any
/// whitespace before it
fn word_span<'a, I>(segments: I) -> usize
where
    I: Iterator<Item = &'a str>,
{
    let mut count = 0;
    for segment in segments {
        count += segment.chars().count();
        if !is_space(segment) {
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold() -> SpanFormat {
        [("b".to_string(), "true".to_string())].into_iter().collect()
    }

    #[test]
    fn test_shortcut_depth() {
        assert_eq!(shortcut("- "), Some(LineFormat::BulletList(0)));
        assert_eq!(shortcut("    1. "), Some(LineFormat::OrderedList(2)));
        assert_eq!(shortcut("### "), Some(LineFormat::Header(3)));
        let deep = format!("{}* ", " ".repeat(600));
        assert_eq!(shortcut(&deep), Some(LineFormat::BulletList(u8::MAX)));
        assert_eq!(shortcut("-x"), None);
    }

    #[test]
    fn test_rich_insert_replaces_selection() {
        let mut doc = Document::new("a");
        doc.insert(0, "hello world").unwrap();
        let (_, cursor) = doc.rich_insert(6, 5, None, "there").unwrap();
        assert_eq!(doc.get_text(), "hello there");
        assert_eq!(cursor, Some(doc.get_vis_id(10).unwrap()));
    }

    #[test]
    fn test_rich_insert_inherits_left_format() {
        let mut doc = Document::new("a");
        doc.insert(0, "ab").unwrap();
        doc.format(0, 2, Format::span([("b", "true")])).unwrap();
        doc.rich_insert(2, 0, None, "c").unwrap();

        let first = doc.get_vis_id(0).unwrap();
        let last = doc.get_vis_id(2).unwrap();
        assert_eq!(doc.get_cur_span_format(&first, &last).unwrap(), bold());
    }

    #[test]
    fn test_rich_insert_explicit_format_overrides() {
        let mut doc = Document::new("a");
        doc.insert(0, "ab").unwrap();
        doc.format(0, 2, Format::span([("b", "true")])).unwrap();
        doc.rich_insert(1, 0, Some(SpanFormat::new()), "x").unwrap();
        assert_eq!(doc.get_text(), "axb");

        let x = doc.get_vis_id(1).unwrap();
        assert!(doc.get_cur_span_format(&x, &x).unwrap().is_empty());
        let a = doc.get_vis_id(0).unwrap();
        assert_eq!(doc.get_cur_span_format(&a, &a).unwrap(), bold());
    }

    #[test]
    fn test_url_over_selection_makes_link() {
        let mut doc = Document::new("a");
        doc.insert(0, "docs").unwrap();
        doc.rich_insert(0, 4, None, "https://example.com").unwrap();
        assert_eq!(doc.get_text(), "docs");
        let a = doc.get_vis_id(0).unwrap();
        let s = doc.get_vis_id(3).unwrap();
        let format = doc.get_cur_span_format(&a, &s).unwrap();
        assert_eq!(format.get("a").map(String::as_str), Some("https://example.com"));
    }

    #[test]
    fn test_markdown_shortcuts() {
        let cases = [
            ("-", LineFormat::BulletList(0)),
            ("*", LineFormat::BulletList(0)),
            ("1.", LineFormat::OrderedList(0)),
            ("##", LineFormat::Header(2)),
            (">", LineFormat::BlockQuote),
        ];
        for (prefix, expected) in cases {
            let mut doc = Document::new("a");
            doc.insert(0, prefix).unwrap();
            let len = doc.len();
            doc.rich_insert(len, 0, None, " ").unwrap();
            assert_eq!(doc.get_text(), "\n", "prefix {:?}", prefix);
            assert_eq!(doc.line_format_at(0).unwrap(), expected, "prefix {:?}", prefix);
        }

        let mut doc = Document::new("a");
        doc.insert(0, "x-").unwrap();
        doc.rich_insert(2, 0, None, " ").unwrap();
        assert_eq!(doc.get_text(), "x- ");
    }

    #[test]
    fn test_newline_copies_list_format() {
        let mut doc = Document::new("a");
        doc.insert(0, "item\n").unwrap();
        doc.format(0, 1, Format::Line(LineFormat::BulletList(0)))
            .unwrap();
        doc.rich_insert(4, 0, None, "\n").unwrap();
        assert_eq!(doc.get_text(), "item\n\n");
        assert_eq!(doc.line_format_at(0).unwrap(), LineFormat::BulletList(0));
        assert_eq!(doc.line_format_at(5).unwrap(), LineFormat::BulletList(0));

        // enter on the empty item leaves the list
        doc.rich_insert(5, 0, None, "\n").unwrap();
        assert_eq!(doc.get_text(), "item\n\n");
        assert_eq!(doc.line_format_at(5).unwrap(), LineFormat::Plain);
    }

    #[test]
    fn test_newline_after_header_is_plain() {
        let mut doc = Document::new("a");
        doc.insert(0, "Title\n").unwrap();
        doc.format(0, 1, Format::Line(LineFormat::Header(1))).unwrap();
        doc.rich_insert(5, 0, None, "\n").unwrap();
        assert_eq!(doc.line_format_at(0).unwrap(), LineFormat::Header(1));
        assert_eq!(doc.line_format_at(6).unwrap(), LineFormat::Plain);
    }

    #[test]
    fn test_rich_delete_keeps_first_line_format() {
        let mut doc = Document::new("a");
        doc.insert(0, "ab\ncd\n").unwrap();
        doc.format(0, 1, Format::Line(LineFormat::Header(2))).unwrap();
        let (_, ix) = doc.rich_delete(1, 3).unwrap();
        assert_eq!(ix, 1);
        assert_eq!(doc.get_text(), "ad\n");
        assert_eq!(doc.line_format_at(0).unwrap(), LineFormat::Header(2));
    }

    #[test]
    fn test_rich_delete_line() {
        let mut doc = Document::new("a");
        doc.insert(0, "one\ntwo three").unwrap();
        doc.rich_delete_line(8).unwrap();
        assert_eq!(doc.get_text(), "one\nthree");
        doc.rich_delete_line(4).unwrap();
        assert_eq!(doc.get_text(), "onethree");
        assert!(doc.rich_delete_line(0).unwrap().is_none());
    }

    #[test]
    fn test_rich_delete_word() {
        let mut doc = Document::new("a");
        doc.insert(0, "hello big world").unwrap();
        doc.rich_delete_word(15, false).unwrap();
        assert_eq!(doc.get_text(), "hello big ");
        doc.rich_delete_word(10, false).unwrap();
        assert_eq!(doc.get_text(), "hello ");
        doc.rich_delete_word(0, true).unwrap();
        assert_eq!(doc.get_text(), " ");
        assert!(doc.rich_delete_word(0, false).unwrap().is_none());
    }

    #[test]
    fn test_clear_formats() {
        let mut doc = Document::new("a");
        doc.insert(0, "ab\n").unwrap();
        doc.format(0, 2, Format::span([("i", "true")])).unwrap();
        doc.format(0, 1, Format::Line(LineFormat::BlockQuote)).unwrap();
        let start = doc.get_vis_id(0).unwrap();
        let end = doc.get_vis_id(2).unwrap();
        doc.clear_formats(&start, &end).unwrap();
        assert!(doc.get_cur_span_format(&start, &end).unwrap().is_empty());
        assert_eq!(doc.line_format_at(0).unwrap(), LineFormat::Plain);
    }

    #[test]
    fn test_cur_line_format_intersection() {
        let mut doc = Document::new("a");
        doc.insert(0, "a\nb\nc\n").unwrap();
        doc.format(0, 3, Format::Line(LineFormat::BlockQuote)).unwrap();
        let a = doc.get_vis_id(0).unwrap();
        let b = doc.get_vis_id(2).unwrap();
        let c = doc.get_vis_id(4).unwrap();
        assert_eq!(doc.get_cur_line_format(&a, &b).unwrap(), LineFormat::BlockQuote);
        assert_eq!(doc.get_cur_line_format(&a, &c).unwrap(), LineFormat::Plain);
    }
}
