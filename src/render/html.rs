//! HTML writer
//!
//! Lines become `<p>`, `<hN>` or `<li>` elements. Consecutive list, quote
//! and code lines are grouped into `<ul>`/`<ol>`, `<blockquote>` and
//! `<pre><code>` blocks; deeper list lines open a nested list inside the
//! current one. With `include_ids`, line elements carry the newline's id
//! and inline runs carry the id of their first character as `data-rid`.

use super::{escape_html, runs, split_lines, Line, Mark, RenderChar};
use crate::crdt::Id;
use crate::format::{ImageFormat, LineFormat, SpanFormat};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Ordered,
    Indent,
}

fn list_meta(format: &LineFormat) -> Option<(ListKind, u8)> {
    match format {
        LineFormat::BulletList(d) => Some((ListKind::Bullet, *d)),
        LineFormat::OrderedList(d) => Some((ListKind::Ordered, *d)),
        LineFormat::IndentedLine(d) => Some((ListKind::Indent, *d)),
        _ => None,
    }
}

fn rid(id: Option<&Id>) -> String {
    id.map(|id| format!(" data-rid=\"{}\"", id)).unwrap_or_default()
}

/// Opening and closing tags of the block a line format belongs to
fn block_tags(format: &LineFormat, first: Option<&Id>) -> Option<(String, &'static str)> {
    match format {
        LineFormat::BulletList(_) => Some(("<ul>".into(), "</ul>")),
        LineFormat::OrderedList(_) => Some(("<ol>".into(), "</ol>")),
        LineFormat::BlockQuote => Some(("<blockquote>".into(), "</blockquote>")),
        LineFormat::CodeBlock(lang) => {
            let mut open = format!("<pre><code{}", rid(first));
            if !lang.is_empty() {
                let lang = escape_html(lang);
                let _ = write!(open, " class=\"language-{}\" data-language=\"{}\"", lang, lang);
            }
            open.push('>');
            Some((open, "</code></pre>"))
        }
        _ => None,
    }
}

/// Stack of open blocks while walking lines
struct Blocks {
    open: Vec<LineFormat>,
    list_start: u8,
}

impl Blocks {
    fn push(&mut self, out: &mut String, format: &LineFormat, first: Option<&Id>) {
        if let Some((open, _)) = block_tags(format, first) {
            if self.open.is_empty() {
                self.list_start = list_meta(format).map_or(0, |(_, d)| d);
            }
            out.push_str(&open);
            self.open.push(format.clone());
        }
    }

    fn pop(&mut self, out: &mut String) {
        if let Some(format) = self.open.pop() {
            if let Some((_, close)) = block_tags(&format, None) {
                out.push_str(close);
            }
        }
    }

    fn close_all(&mut self, out: &mut String) {
        while !self.open.is_empty() {
            self.pop(out);
        }
    }

    /// Adjust the open blocks for a line with `format`
    fn enter(&mut self, out: &mut String, format: &LineFormat, first: Option<&Id>) {
        let Some(prev) = self.open.last().cloned() else {
            self.push(out, format, first);
            return;
        };
        if prev == *format {
            return;
        }
        let (Some((_, prev_depth)), Some((kind, depth))) =
            (list_meta(&prev), list_meta(format))
        else {
            self.close_all(out);
            self.push(out, format, first);
            return;
        };

        if prev_depth < depth {
            self.push(out, format, first);
            return;
        }
        let level = depth.max(self.list_start);
        while let Some((_, top_depth)) = self.open.last().and_then(list_meta) {
            if level >= top_depth.max(self.list_start) {
                break;
            }
            self.pop(out);
        }
        match self.open.last().and_then(list_meta) {
            Some((top_kind, _)) if kind != ListKind::Indent && top_kind != kind => {
                self.pop(out);
                self.push(out, format, first);
            }
            Some(_) => {}
            None => self.push(out, format, first),
        }
    }
}

fn image_tags(img: &ImageFormat, id: Option<&Id>) -> (String, &'static str) {
    let mut attrs = format!("src=\"{}\"", escape_html(&img.src));
    let mut style = Vec::new();
    if !img.width.is_empty() {
        style.push(format!("width: {};", img.width));
    }
    if !img.height.is_empty() {
        style.push(format!("height: {};", img.height));
    }
    if !style.is_empty() {
        let _ = write!(attrs, " style=\"{}\"", escape_html(&style.join(" ")));
    }
    if !img.alt.is_empty() {
        let _ = write!(attrs, " alt=\"{}\"", escape_html(&img.alt));
    }
    (
        format!("<figure><img {} /><figcaption{}>", attrs, rid(id)),
        "</figcaption></figure>",
    )
}

fn span_tags(format: &SpanFormat) -> Vec<(&'static str, String)> {
    let mut tags = Vec::new();
    if let Some(href) = format.get("a") {
        tags.push(("a", format!(" href=\"{}\"", escape_html(href))));
    }
    for (key, tag) in [("b", "strong"), ("i", "em"), ("u", "u"), ("s", "s"), ("c", "code")] {
        if format.contains_key(key) {
            tags.push((tag, String::new()));
        }
    }
    tags
}

/// One inline run wrapped in its tags, the id on the innermost one
fn write_run(out: &mut String, chars: &[RenderChar], include_ids: bool) {
    let Some(first) = chars.first() else {
        return;
    };
    let text: String = chars.iter().map(|c| c.ch).collect();
    let text = escape_html(&text).replace('\n', "<br>");

    let mut tags = match first.mark {
        Mark::Inserted => vec![("ins", String::new())],
        Mark::Deleted => vec![("del", String::new())],
        Mark::Unchanged => Vec::new(),
    };
    tags.extend(span_tags(&first.format));
    if tags.is_empty() {
        tags.push(("span", String::new()));
    }

    let id = include_ids.then_some(&first.id);
    let last = tags.len() - 1;
    for (i, (tag, attrs)) in tags.iter().enumerate() {
        let id_attr = if i == last { rid(id) } else { String::new() };
        let _ = write!(out, "<{}{}{}>", tag, id_attr, attrs);
    }
    out.push_str(&text);
    for (tag, _) in tags.iter().rev() {
        let _ = write!(out, "</{}>", tag);
    }
}

fn write_inline(out: &mut String, chars: &[RenderChar], include_ids: bool) {
    for run in runs(chars) {
        write_run(out, &chars[run], include_ids);
    }
}

fn write_line(out: &mut String, line: &Line<'_>, include_ids: bool) {
    let id = if include_ids {
        line.end.map(|c| &c.id)
    } else {
        None
    };
    let tag = match line.format() {
        LineFormat::Rule => {
            let _ = write!(out, "<hr{}/>", rid(id));
            return;
        }
        LineFormat::Image(img) => {
            let (open, close) = image_tags(img, id);
            out.push_str(&open);
            write_inline(out, line.chars, include_ids);
            out.push_str(close);
            return;
        }
        LineFormat::Header(n) => format!("h{}", (*n).clamp(1, 6)),
        LineFormat::BulletList(_) | LineFormat::OrderedList(_) => "li".to_string(),
        _ => "p".to_string(),
    };
    let _ = write!(out, "<{}{}>", tag, rid(id));
    write_inline(out, line.chars, include_ids);
    let _ = write!(out, "</{}>", tag);
}

pub fn render_html(chars: &[RenderChar], include_ids: bool) -> String {
    let mut out = String::new();
    let mut blocks = Blocks {
        open: Vec::new(),
        list_start: 0,
    };

    for line in split_lines(chars) {
        let Some(end) = line.end else {
            blocks.close_all(&mut out);
            write_inline(&mut out, line.chars, include_ids);
            continue;
        };
        let first = if include_ids { line.first_id() } else { None };
        blocks.enter(&mut out, line.format(), first);

        if let LineFormat::CodeBlock(_) = line.format() {
            let raw: String = line.chars.iter().chain(std::iter::once(end)).map(|c| c.ch).collect();
            out.push_str(&escape_html(&raw));
            continue;
        }
        write_line(&mut out, &line, include_ids);
    }
    blocks.close_all(&mut out);
    out
}
