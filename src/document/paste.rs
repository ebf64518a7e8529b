//! Structured paste and markdown rewrites
//!
//! Both paths build every op against the document as it stands, then
//! commit them as one `Multi`: deletes of the replaced characters, the
//! inserted text, an erase over the new characters and the parsed formats.

use super::Document;
use crate::crdt::{Action, FormatOp, Id, Operation};
use crate::error::{Result, SyncError};
use crate::format::{Format, FormatSpan, SpanFormat, ERASE_KEY};
use crate::markdown::{align_whitespace, parse_html, split_markdown};
use imara_diff::{Algorithm, Diff, InternedInput};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// One clipboard entry as the host reads it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteItem {
    /// `"string"` for text entries; files and other kinds are ignored
    pub kind: String,
    pub mime: String,
    pub data: String,
}

impl PasteItem {
    pub fn text(mime: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: "string".into(),
            mime: mime.into(),
            data: data.into(),
        }
    }
}

fn find_item<'a>(items: &'a [PasteItem], mime: &str) -> Option<&'a str> {
    items
        .iter()
        .find(|item| item.kind == "string" && item.mime.starts_with(mime))
        .map(|item| item.data.as_str())
}

/// Visible offset of the caret after pasting `text` at `ix`
fn caret_after(ix: usize, text: &str) -> usize {
    let len = text.chars().count();
    if text.ends_with('\n') {
        ix + len - 1
    } else {
        ix + len
    }
}

impl Document {
    /// Paste clipboard `items` over the selection `[ix, ix + sel_len)`
    ///
    /// Prefers HTML, then markdown, then plain text, which is typed with
    /// `span_format` like [`Document::rich_insert`]. Returns the op and the
    /// new caret offset, or `None` when no item holds any text.
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn paste(
        &mut self,
        ix: usize,
        sel_len: usize,
        span_format: Option<SpanFormat>,
        items: &[PasteItem],
    ) -> Result<Option<(Operation, usize)>> {
        if let Some(html) = find_item(items, "text/html") {
            return self.paste_html(ix, sel_len, html);
        }
        if let Some(md) = find_item(items, "text/markdown") {
            let (text, spans) = split_markdown(md)?;
            return self.paste_spans(ix, sel_len, &text, &spans);
        }
        match find_item(items, "text/plain") {
            Some(text) if !text.is_empty() => {
                let (op, _) = self.rich_insert(ix, sel_len, span_format, text)?;
                Ok(Some((op, caret_after(ix, text))))
            }
            _ => Ok(None),
        }
    }

    /// Paste an HTML fragment over the selection `[ix, ix + sel_len)`
    pub fn paste_html(
        &mut self,
        ix: usize,
        sel_len: usize,
        html: &str,
    ) -> Result<Option<(Operation, usize)>> {
        let (text, spans) = parse_html(html)?;
        self.paste_spans(ix, sel_len, &text, &spans)
    }

    /// Insert formatted markdown at `ix`
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn insert_markdown(&mut self, ix: usize, md: &str) -> Result<(Operation, Vec<Action>)> {
        let (text, spans) = split_markdown(md)?;
        if text.is_empty() {
            return Err(SyncError::InvalidArgument("markdown holds no text".into()));
        }
        let op = self.build_paste(ix, 0, &text, &spans)?;
        let actions = self.commit_local(&op)?;
        Ok((op, actions))
    }

    /// Rewrite the text strictly between `before` and `after` to match
    /// `new_md`
    ///
    /// Only the characters that differ are deleted or inserted; surviving
    /// characters keep their ids. Formats over the range are cleared and
    /// replaced by the ones parsed from the markdown.
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn apply_markdown_diff(
        &mut self,
        new_md: &str,
        before: &Id,
        after: &Id,
    ) -> Result<(Operation, Vec<Action>)> {
        let (ix, len) = self.highlight_span(before, after)?;
        let old: String = self.text.slice(ix..ix + len).chars().collect();
        let mut md = new_md.to_string();
        if old.ends_with('\n') && !md.ends_with('\n') {
            md.push('\n');
        }
        let (parsed, spans) = split_markdown(&md)?;
        let (new_text, spans) = align_whitespace(&old, &parsed, spans);

        if old.is_empty() {
            if new_text.is_empty() {
                return Err(SyncError::InvalidArgument("nothing to rewrite".into()));
            }
            let op = self.build_paste(ix, 0, &new_text, &spans)?;
            let actions = self.commit_local(&op)?;
            return Ok((op, actions));
        }

        let old_chars: Vec<char> = old.chars().collect();
        let new_chars: Vec<char> = new_text.chars().collect();
        let old_ids = self.visible_ids(ix, len)?;
        let mut ops = match (old_ids.first(), old_ids.last()) {
            (Some(first), Some(last)) => self.clear_format_ops(first, last)?,
            _ => Vec::new(),
        };

        let mut input = InternedInput::default();
        input.update_before(old_chars.iter().copied());
        input.update_after(new_chars.iter().copied());
        let diff = Diff::compute(Algorithm::Myers, &input);

        let mut new_ids: Vec<Id> = Vec::with_capacity(new_chars.len());
        let mut kept = 0usize;
        for hunk in diff.hunks() {
            let removed = hunk.before.start as usize..hunk.before.end as usize;
            let added = hunk.after.start as usize..hunk.after.end as usize;
            new_ids.extend(old_ids[kept..removed.start].iter().cloned());
            kept = removed.end;
            if !removed.is_empty() {
                ops.extend(self.mark_ops(old_ids[removed.clone()].to_vec(), true));
            }
            if !added.is_empty() {
                let text: String = new_chars[added].iter().collect();
                let ins = self.build_insert(ix + removed.start, &text)?;
                new_ids.extend((0..ins.len()).map(|k| ins.id.offset(k)));
                ops.push(Operation::Insert(ins));
            }
        }
        new_ids.extend(old_ids[kept..].iter().cloned());

        if let (Some(first), Some(last)) = (new_ids.first(), new_ids.last()) {
            ops.push(Operation::Format(FormatOp {
                id: self.next_id(1),
                start: first.clone(),
                end: last.clone(),
                format: Format::span([(ERASE_KEY, "true")]),
            }));
        }
        ops.extend(self.span_format_ops(&new_ids, &new_chars, &spans)?);

        let op = Operation::from_ops(ops)
            .ok_or_else(|| SyncError::Invariant("markdown diff produced no ops".into()))?;
        debug!(old = old_chars.len(), new = new_chars.len(), "applying markdown diff");
        let actions = self.commit_local(&op)?;
        Ok((op, actions))
    }

    fn paste_spans(
        &mut self,
        ix: usize,
        sel_len: usize,
        text: &str,
        spans: &[FormatSpan],
    ) -> Result<Option<(Operation, usize)>> {
        if text.is_empty() {
            return Ok(None);
        }
        let op = self.build_paste(ix, sel_len, text, spans)?;
        self.commit_local(&op)?;
        debug!(chars = text.chars().count(), spans = spans.len(), "pasted");
        Ok(Some((op, caret_after(ix, text))))
    }

    /// Uncommitted op replacing the selection with formatted `text`
    fn build_paste(
        &mut self,
        ix: usize,
        sel_len: usize,
        text: &str,
        spans: &[FormatSpan],
    ) -> Result<Operation> {
        self.check_range(ix, sel_len)?;
        let mut ops = if sel_len > 0 {
            self.delete_ops(ix, sel_len)?
        } else {
            Vec::new()
        };
        let ins = self.build_insert(ix, text)?;
        let ids: Vec<Id> = (0..ins.len()).map(|k| ins.id.offset(k)).collect();
        let chars: Vec<char> = text.chars().collect();
        let first = ins.id.clone();
        let last = ins.id.offset(ins.len() - 1);
        ops.push(Operation::Insert(ins));
        ops.push(Operation::Format(FormatOp {
            id: self.next_id(1),
            start: first,
            end: last,
            format: Format::span([(ERASE_KEY, "true")]),
        }));
        ops.extend(self.span_format_ops(&ids, &chars, spans)?);
        Operation::from_ops(ops).ok_or_else(|| SyncError::Invariant("paste produced no ops".into()))
    }

    /// Format ops for parsed spans over characters `ids`
    ///
    /// Span ends are exclusive; point spans become line formats on the
    /// newline they sit on and are dropped anywhere else.
    fn span_format_ops(
        &mut self,
        ids: &[Id],
        chars: &[char],
        spans: &[FormatSpan],
    ) -> Result<Vec<Operation>> {
        let mut ops = Vec::new();
        for span in spans {
            let format = Format::from_map(&span.format)?;
            if span.is_point() {
                let at = span.start.min(ids.len().saturating_sub(1));
                if let (Format::Line(line), Some('\n')) = (format, chars.get(at)) {
                    ops.push(self.line_op(ids[at].clone(), line));
                }
                continue;
            }
            let end = span.end.min(ids.len());
            if end <= span.start || !format.is_span() {
                continue;
            }
            ops.push(Operation::Format(FormatOp {
                id: self.next_id(1),
                start: ids[span.start].clone(),
                end: ids[end - 1].clone(),
                format,
            }));
        }
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentConfig;
    use crate::format::LineFormat;

    #[test]
    fn test_paste_prefers_html() {
        let mut doc = Document::new("a");
        doc.insert(0, "ab").unwrap();
        let items = vec![
            PasteItem::text("text/plain", "plain"),
            PasteItem::text("text/html;charset=utf-8", "<b>bold</b>"),
        ];
        let (_, caret) = doc.paste(1, 0, None, &items).unwrap().unwrap();
        assert_eq!(caret, 5);
        assert_eq!(doc.get_text(), "aboldb");
        assert_eq!(
            doc.get_full_html(false).unwrap(),
            "<span>a</span><strong>bold</strong><span>b</span>"
        );
    }

    #[test]
    fn test_paste_markdown_and_plain() {
        let mut doc = Document::new("a");
        let items = vec![
            PasteItem::text("text/plain", "# Title"),
            PasteItem::text("text/markdown", "# Title"),
        ];
        let (_, caret) = doc.paste(0, 0, None, &items).unwrap().unwrap();
        assert_eq!(caret, 5);
        assert_eq!(doc.get_text(), "Title\n");
        let nl = doc.get_vis_id(5).unwrap();
        assert_eq!(doc.get_cur_line_format(&nl, &nl).unwrap(), LineFormat::Header(1));

        let plain = vec![PasteItem::text("text/plain", "xyz")];
        let (_, caret) = doc.paste(0, 2, None, &plain).unwrap().unwrap();
        assert_eq!(caret, 3);
        assert_eq!(doc.get_text(), "xyztle\n");
    }

    #[test]
    fn test_paste_ignores_non_text_items() {
        let mut doc = Document::new("a");
        let items = vec![PasteItem {
            kind: "file".into(),
            mime: "text/plain".into(),
            data: "x".into(),
        }];
        assert!(doc.paste(0, 0, None, &items).unwrap().is_none());
        assert!(doc.paste_html(0, 0, "<p></p>").unwrap().is_none());
        assert_eq!(doc.get_text(), "");
    }

    #[test]
    fn test_paste_is_one_atomic_op() {
        let mut alice = Document::new("alice");
        let mut bob = Document::with_config(DocumentConfig::new("bob"));
        let op = alice.insert(0, "base\n").unwrap();
        bob.merge_op(op).unwrap();

        let (op, _) = alice
            .paste_html(0, 4, "<ul><li>one</li><li><i>two</i></li></ul>")
            .unwrap()
            .unwrap();
        assert!(matches!(op, Operation::Multi(_)));
        bob.merge_op(op).unwrap();
        assert_eq!(bob.get_text(), "one\ntwo\n\n");
        assert_eq!(bob.get_full_html(true).unwrap(), alice.get_full_html(true).unwrap());
    }

    #[test]
    fn test_insert_markdown_inside_bold_run() {
        let mut doc = Document::new("a");
        doc.insert(0, "ab").unwrap();
        doc.format(0, 2, Format::span([("b", "true")])).unwrap();
        let (_, actions) = doc.insert_markdown(1, "*x*").unwrap();
        assert!(!actions.is_empty());
        assert_eq!(
            doc.get_full_html(false).unwrap(),
            "<strong>a</strong><em>x</em><strong>b</strong>"
        );
        assert!(doc.insert_markdown(0, "").is_err());
    }

    #[test]
    fn test_markdown_diff_keeps_unchanged_ids() {
        let mut doc = Document::new("a");
        doc.insert(0, "[hello world]\n").unwrap();
        let before = doc.get_vis_id(0).unwrap();
        let after = doc.get_vis_id(12).unwrap();
        let h = doc.get_vis_id(1).unwrap();

        doc.apply_markdown_diff("hello **big** world", &before, &after)
            .unwrap();
        assert_eq!(doc.get_text(), "[hello big world]\n");
        assert_eq!(doc.get_vis_id(1).unwrap(), h);
        assert_eq!(
            doc.get_full_html(false).unwrap(),
            "<p><span>[hello </span><strong>big</strong><span> world]</span></p>"
        );
    }

    #[test]
    fn test_markdown_diff_sets_line_formats() {
        let mut doc = Document::new("a");
        doc.insert(0, "x\ntitle\ny\n").unwrap();
        let before = doc.get_vis_id(1).unwrap();
        let after = doc.get_vis_id(8).unwrap();
        doc.apply_markdown_diff("## title", &before, &after).unwrap();
        assert_eq!(doc.get_text(), "x\ntitle\ny\n");
        let nl = doc.get_vis_id(7).unwrap();
        assert_eq!(doc.get_cur_line_format(&nl, &nl).unwrap(), LineFormat::Header(2));
    }
}
