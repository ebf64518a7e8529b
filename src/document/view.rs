//! Reading a range of the document, now or as of an address

use super::Document;
use crate::crdt::{ContentAddress, Id};
use crate::error::Result;
use crate::format::{apply_span, Format, LineFormat, SpanFormat};
use crate::render::{self, Mark, RenderChar};
use serde::{Deserialize, Serialize};

/// Which state of the document a read sees
#[derive(Debug, Clone, Copy)]
pub enum View<'a> {
    Current,
    /// Only ids the address contains exist
    At(&'a ContentAddress),
}

impl View<'_> {
    pub fn includes(&self, id: &Id) -> bool {
        match self {
            View::Current => true,
            View::At(address) => address.contains(id),
        }
    }
}

/// Caret positions relative to rendered inline runs
///
/// Each side names the `data-rid` of the run holding the character and
/// the offset of that character within the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(rename = "startSpanID")]
    pub start_span_id: Id,
    #[serde(rename = "startOffset")]
    pub start_offset: usize,
    #[serde(rename = "endSpanID")]
    pub end_span_id: Id,
    #[serde(rename = "endOffset")]
    pub end_offset: usize,
}

impl Document {
    pub(crate) fn visible_in(&self, slot: usize, view: View<'_>) -> Result<bool> {
        match view {
            View::Current => Ok(!self.rope.is_deleted(slot)),
            View::At(address) => {
                let id = self.id_at_slot(slot)?;
                if !address.contains(id) {
                    return Ok(false);
                }
                let latest = self
                    .history
                    .latest_matching(id, |marker| address.contains(marker));
                Ok(!latest.is_some_and(|m| m.deleted))
            }
        }
    }

    /// Resolved span format of every character in the total range `[s, e]`
    pub(crate) fn span_formats(&self, s: usize, e: usize, view: View<'_>) -> Result<Vec<SpanFormat>> {
        self.span_formats_where(s, e, |id| view.includes(id))
    }

    /// Same as [`Document::span_formats`], folding only ops passing `filter`
    pub(crate) fn span_formats_where<F>(&self, s: usize, e: usize, filter: F) -> Result<Vec<SpanFormat>>
    where
        F: Fn(&Id) -> bool,
    {
        let mut out = vec![SpanFormat::new(); e.saturating_sub(s) + 1];
        for op in self.formats.span_ops() {
            if !filter(&op.id) {
                continue;
            }
            let Format::Span(format) = &op.format else {
                continue;
            };
            let (os, oe) = self.tot_range(&op.start, &op.end)?;
            let (lo, hi) = (os.max(s), oe.min(e));
            if lo > hi {
                continue;
            }
            for state in &mut out[lo - s..=hi - s] {
                apply_span(state, format);
            }
        }
        Ok(out)
    }

    pub(crate) fn line_format_in(&self, newline: &Id, view: View<'_>) -> LineFormat {
        self.formats.line_format(newline, |id| view.includes(id))
    }

    /// Characters of `[start, end]` as seen in `to`
    ///
    /// With `from`, characters visible on only one side are kept and
    /// marked as inserted or deleted.
    pub(crate) fn render_chars(
        &self,
        start: &Id,
        end: &Id,
        from: Option<View<'_>>,
        to: View<'_>,
    ) -> Result<Vec<RenderChar>> {
        let (s, e) = self.tot_range(start, end)?;
        let to_formats = self.span_formats(s, e, to)?;
        let from_formats = match from {
            Some(view) => Some(self.span_formats(s, e, view)?),
            None => None,
        };

        let mut out = Vec::new();
        for (k, slot) in self.slots_between(s, e).enumerate() {
            let after = self.visible_in(slot, to)?;
            let before = match from {
                Some(view) => self.visible_in(slot, view)?,
                None => after,
            };
            let (mark, view, formats) = match (before, after) {
                (_, true) if from.is_none() => (Mark::Unchanged, to, &to_formats),
                (true, true) => (Mark::Unchanged, to, &to_formats),
                (false, true) => (Mark::Inserted, to, &to_formats),
                (true, false) => match (from, &from_formats) {
                    (Some(view), Some(formats)) => (Mark::Deleted, view, formats),
                    _ => continue,
                },
                (false, false) => continue,
            };
            let node = self.fugue.node(slot)?;
            let line = if node.ch == '\n' {
                self.line_format_in(&node.id, view)
            } else {
                LineFormat::Plain
            };
            out.push(RenderChar {
                id: node.id.clone(),
                ch: node.ch,
                format: formats.get(k).cloned().unwrap_or_default(),
                line,
                mark,
            });
        }
        Ok(out)
    }

    /// Visible text of `[start, end]`, optionally as of `address`
    pub fn get_plaintext(
        &self,
        start: &Id,
        end: &Id,
        address: Option<&ContentAddress>,
    ) -> Result<String> {
        let view = address.map_or(View::Current, View::At);
        Ok(render::plain_text(&self.render_chars(start, end, None, view)?))
    }

    pub fn get_html(&self, start: &Id, end: &Id, include_ids: bool) -> Result<String> {
        let chars = self.render_chars(start, end, None, View::Current)?;
        Ok(render::render_html(&chars, include_ids))
    }

    pub fn get_full_html(&self, include_ids: bool) -> Result<String> {
        match self.full_range() {
            Some((start, end)) => self.get_html(&start, &end, include_ids),
            None => Ok(String::new()),
        }
    }

    pub fn get_html_at(
        &self,
        start: &Id,
        end: &Id,
        address: &ContentAddress,
        include_ids: bool,
    ) -> Result<String> {
        let chars = self.render_chars(start, end, None, View::At(address))?;
        Ok(render::render_html(&chars, include_ids))
    }

    /// What changed in `[start, end]` since `address`
    pub fn get_html_diff(
        &self,
        start: &Id,
        end: &Id,
        address: &ContentAddress,
        include_ids: bool,
    ) -> Result<String> {
        let chars = self.render_chars(start, end, Some(View::At(address)), View::Current)?;
        Ok(render::render_html(&chars, include_ids))
    }

    pub fn get_html_diff_between(
        &self,
        start: &Id,
        end: &Id,
        from: &ContentAddress,
        to: &ContentAddress,
        include_ids: bool,
    ) -> Result<String> {
        let chars = self.render_chars(start, end, Some(View::At(from)), View::At(to))?;
        Ok(render::render_html(&chars, include_ids))
    }

    pub fn get_markdown(&self, start: &Id, end: &Id) -> Result<String> {
        let chars = self.render_chars(start, end, None, View::Current)?;
        Ok(render::render_markdown(&chars))
    }

    pub fn get_full_markdown(&self) -> Result<String> {
        match self.full_range() {
            Some((start, end)) => self.get_markdown(&start, &end),
            None => Ok(String::new()),
        }
    }

    /// Map a caret range onto rendered runs
    ///
    /// `end` is the character just after the selection; equal ids give a
    /// collapsed caret.
    pub fn get_selection(
        &self,
        start: &Id,
        end: &Id,
        address: Option<&ContentAddress>,
    ) -> Result<Selection> {
        let view = address.map_or(View::Current, View::At);
        let (start_span_id, start_offset) = self.enclosing_span(start, view)?;
        let (end_span_id, end_offset) = if start == end {
            (start_span_id.clone(), start_offset)
        } else {
            self.enclosing_span(end, view)?
        };
        Ok(Selection {
            start_span_id,
            start_offset,
            end_span_id,
            end_offset,
        })
    }

    /// Run holding `id` and the offset of `id` inside it
    ///
    /// A newline is its own anchor at offset zero, matching the id the
    /// line element carries.
    fn enclosing_span(&self, id: &Id, view: View<'_>) -> Result<(Id, usize)> {
        let slot = self.slot_of(id)?;
        if self.fugue.node(slot)?.ch == '\n' {
            return Ok((id.clone(), 0));
        }

        let is_break = |s: usize| -> Result<bool> {
            Ok(self.fugue.node(s)?.ch == '\n' && self.visible_in(s, view)?)
        };
        let mut first = slot;
        while let Some(prev) = self.rope.prev(first) {
            if is_break(prev)? {
                break;
            }
            first = prev;
        }
        let mut last = slot;
        while let Some(next) = self.rope.next(last) {
            if is_break(next)? {
                break;
            }
            last = next;
        }

        let chars = self.render_chars(self.id_at_slot(first)?, self.id_at_slot(last)?, None, view)?;
        let Some(ix) = chars.iter().position(|c| c.id == *id) else {
            return Ok((id.clone(), 0));
        };
        for run in render::runs(&chars) {
            if run.contains(&ix) {
                return Ok((chars[run.start].id.clone(), ix - run.start));
            }
        }
        Ok((id.clone(), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;

    fn ends(doc: &Document) -> (Id, Id) {
        doc.full_range().unwrap()
    }

    #[test]
    fn test_full_html() {
        let mut doc = Document::new("a");
        assert_eq!(doc.get_full_html(false).unwrap(), "");
        doc.insert(0, "Hi there\n").unwrap();
        doc.format(3, 5, Format::span([("b", "true")])).unwrap();
        assert_eq!(
            doc.get_full_html(false).unwrap(),
            "<p><span>Hi </span><strong>there</strong></p>"
        );
    }

    #[test]
    fn test_html_at_address_is_historic() {
        let mut doc = Document::new("a");
        doc.insert(0, "one\n").unwrap();
        let (start, end) = ends(&doc);
        let before = doc.get_address(&start, &end).unwrap();

        doc.insert(3, " two").unwrap();
        doc.delete(0, 1).unwrap();
        doc.format(0, 3, Format::span([("i", "true")])).unwrap();
        assert_eq!(doc.get_text(), "ne two\n");

        let (start, end) = ends(&doc);
        assert_eq!(
            doc.get_html_at(&start, &end, &before, false).unwrap(),
            "<p><span>one</span></p>"
        );
        assert_eq!(
            doc.get_plaintext(&start, &end, Some(&before)).unwrap(),
            "one\n"
        );
        assert_eq!(doc.get_plaintext(&start, &end, None).unwrap(), "ne two\n");
    }

    #[test]
    fn test_html_diff_marks_changes() {
        let mut doc = Document::new("a");
        doc.insert(0, "abc\n").unwrap();
        let (start, end) = ends(&doc);
        let before = doc.get_address(&start, &end).unwrap();

        doc.delete(0, 1).unwrap();
        doc.insert(2, "d").unwrap();
        let (start, end) = ends(&doc);
        assert_eq!(
            doc.get_html_diff(&start, &end, &before, false).unwrap(),
            "<p><del>a</del><span>bc</span><ins>d</ins></p>"
        );

        let after = doc.get_address(&start, &end).unwrap();
        assert_eq!(
            doc.get_html_diff_between(&start, &end, &after, &before, false)
                .unwrap(),
            "<p><ins>a</ins><span>bc</span><del>d</del></p>"
        );
    }

    #[test]
    fn test_markdown_output() {
        let mut doc = Document::new("a");
        doc.insert(0, "Title\nbody\n").unwrap();
        doc.format(0, 1, Format::Line(LineFormat::Header(1))).unwrap();
        doc.format(6, 4, Format::span([("b", "true")])).unwrap();
        assert_eq!(doc.get_full_markdown().unwrap(), "# Title\n\n**body**\n\n");
    }

    #[test]
    fn test_selection_maps_to_runs() {
        let mut doc = Document::new("a");
        doc.insert(0, "plain bold\n").unwrap();
        doc.format(6, 4, Format::span([("b", "true")])).unwrap();

        let p = doc.get_vis_id(1).unwrap();
        let o = doc.get_vis_id(8).unwrap();
        let sel = doc.get_selection(&p, &o, None).unwrap();
        assert_eq!(sel.start_span_id, doc.get_vis_id(0).unwrap());
        assert_eq!(sel.start_offset, 1);
        assert_eq!(sel.end_span_id, doc.get_vis_id(6).unwrap());
        assert_eq!(sel.end_offset, 2);

        let nl = doc.get_vis_id(10).unwrap();
        let caret = doc.get_selection(&nl, &nl, None).unwrap();
        assert_eq!(caret.start_span_id, nl);
        assert_eq!(caret.end_offset, 0);

        let json = serde_json::to_value(&sel).unwrap();
        assert!(json.get("startSpanID").is_some());
        assert!(json.get("endOffset").is_some());
    }
}
