//! Markdown bridge
//!
//! [`split_markdown`] flattens markdown into the text the document stores
//! and a list of [`FormatSpan`]s: spans for inline formats and zero-width
//! points on newlines for line formats. The parser event stream is first
//! folded into a small [`MdNode`] tree, which one exhaustive walk turns
//! into text.
//!
//! [`parse_html`] does the same for HTML pasted from the clipboard.

mod html;

pub use html::parse_html;
pub(crate) use html::unescape_entities;

use crate::error::{Result, SyncError};
use crate::format::{FormatSpan, SpanFormat};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};
use regex::Regex;
use std::sync::OnceLock;

static IMG: OnceLock<Option<Regex>> = OnceLock::new();
static ATTR: OnceLock<Option<Regex>> = OnceLock::new();
static CAPTION: OnceLock<Option<Regex>> = OnceLock::new();
static STYLE: OnceLock<Option<Regex>> = OnceLock::new();
static NUMERIC: OnceLock<Option<Regex>> = OnceLock::new();

/// Compile `pattern` once into `cell`
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MdNode {
    /// Document root, list item or any container without formats
    Block(Vec<MdNode>),
    /// Inline content split into source lines
    Paragraph(Vec<Vec<MdNode>>),
    Heading(u8, Vec<MdNode>),
    Quote(Vec<MdNode>),
    List { ordered: bool, items: Vec<MdNode> },
    Code { lang: String, text: String },
    Html(String),
    Rule,
    Emphasis(Vec<MdNode>),
    Strong(Vec<MdNode>),
    Strike(Vec<MdNode>),
    Link { dest: String, children: Vec<MdNode> },
    InlineCode(String),
    Text(String),
    SoftBreak,
    HardBreak,
}

impl MdNode {
    fn is_inline(&self) -> bool {
        matches!(
            self,
            MdNode::Emphasis(_)
                | MdNode::Strong(_)
                | MdNode::Strike(_)
                | MdNode::Link { .. }
                | MdNode::InlineCode(_)
                | MdNode::Text(_)
                | MdNode::SoftBreak
                | MdNode::HardBreak
        )
    }
}

/// Open container while folding parser events
#[derive(Debug)]
enum Frame {
    Root,
    Paragraph,
    Heading(u8),
    Quote,
    List(bool),
    Item,
    Code(String),
    Html,
    Emphasis,
    Strong,
    Strike,
    Link(String),
    /// Tags without a format of their own; children move to the parent
    Transparent,
}

fn paragraph(children: Vec<MdNode>) -> MdNode {
    let mut lines = vec![Vec::new()];
    for child in children {
        match child {
            MdNode::SoftBreak | MdNode::HardBreak => lines.push(Vec::new()),
            other => {
                if let Some(line) = lines.last_mut() {
                    line.push(other);
                }
            }
        }
    }
    if lines.len() > 1 && lines.last().is_some_and(Vec::is_empty) {
        lines.pop();
    }
    MdNode::Paragraph(lines)
}

/// Wrap runs of bare inline nodes (tight list items) into paragraphs
fn group_inline(children: Vec<MdNode>) -> Vec<MdNode> {
    let mut out = Vec::new();
    let mut run = Vec::new();
    for child in children {
        if child.is_inline() {
            run.push(child);
            continue;
        }
        if !run.is_empty() {
            out.push(paragraph(std::mem::take(&mut run)));
        }
        out.push(child);
    }
    if !run.is_empty() {
        out.push(paragraph(run));
    }
    out
}

fn raw_text(children: Vec<MdNode>) -> String {
    children
        .into_iter()
        .filter_map(|c| match c {
            MdNode::Text(t) | MdNode::Html(t) => Some(t),
            _ => None,
        })
        .collect()
}

fn parse_tree(md: &str) -> Result<MdNode> {
    let mut stack: Vec<(Frame, Vec<MdNode>)> = vec![(Frame::Root, Vec::new())];

    for event in Parser::new_ext(md, Options::ENABLE_STRIKETHROUGH) {
        let node = match event {
            Event::Start(tag) => {
                let frame = match tag {
                    Tag::Paragraph => Frame::Paragraph,
                    Tag::Heading { level, .. } => Frame::Heading(level as u8),
                    Tag::BlockQuote(_) => Frame::Quote,
                    Tag::List(start) => Frame::List(start.is_some()),
                    Tag::Item => Frame::Item,
                    Tag::CodeBlock(CodeBlockKind::Fenced(info)) => Frame::Code(
                        info.split_whitespace().next().unwrap_or_default().to_string(),
                    ),
                    Tag::CodeBlock(CodeBlockKind::Indented) => Frame::Code(String::new()),
                    Tag::HtmlBlock => Frame::Html,
                    Tag::Emphasis => Frame::Emphasis,
                    Tag::Strong => Frame::Strong,
                    Tag::Strikethrough => Frame::Strike,
                    Tag::Link { dest_url, .. } => Frame::Link(dest_url.to_string()),
                    _ => Frame::Transparent,
                };
                stack.push((frame, Vec::new()));
                continue;
            }
            Event::End(_) => {
                let (frame, children) = stack
                    .pop()
                    .ok_or_else(|| SyncError::Parse("unbalanced markdown events".into()))?;
                let node = match frame {
                    Frame::Root => {
                        return Err(SyncError::Parse("unbalanced markdown events".into()))
                    }
                    Frame::Paragraph => paragraph(children),
                    Frame::Heading(level) => MdNode::Heading(level, children),
                    Frame::Quote => MdNode::Quote(group_inline(children)),
                    Frame::List(ordered) => MdNode::List {
                        ordered,
                        items: children,
                    },
                    Frame::Item => MdNode::Block(group_inline(children)),
                    Frame::Code(lang) => MdNode::Code {
                        lang,
                        text: raw_text(children),
                    },
                    Frame::Html => MdNode::Html(raw_text(children)),
                    Frame::Emphasis => MdNode::Emphasis(children),
                    Frame::Strong => MdNode::Strong(children),
                    Frame::Strike => MdNode::Strike(children),
                    Frame::Link(dest) => MdNode::Link { dest, children },
                    Frame::Transparent => {
                        if let Some((_, parent)) = stack.last_mut() {
                            parent.extend(children);
                        }
                        continue;
                    }
                };
                node
            }
            Event::Text(text) => MdNode::Text(text.to_string()),
            Event::Code(code) => MdNode::InlineCode(code.to_string()),
            Event::Html(html) => MdNode::Html(html.to_string()),
            Event::SoftBreak => MdNode::SoftBreak,
            Event::HardBreak => MdNode::HardBreak,
            Event::Rule => MdNode::Rule,
            // inline html, footnotes, task markers and math carry no text
            _ => continue,
        };
        if let Some((_, children)) = stack.last_mut() {
            children.push(node);
        }
    }

    match stack.pop() {
        Some((Frame::Root, children)) if stack.is_empty() => Ok(MdNode::Block(children)),
        _ => Err(SyncError::Parse("unbalanced markdown events".into())),
    }
}

#[derive(Debug, Default)]
struct Flatten {
    text: String,
    len: usize,
    spans: Vec<FormatSpan>,
    lists: Vec<bool>,
    quote: usize,
}

impl Flatten {
    fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
        self.len += s.chars().count();
    }

    /// Newline carrying a point format
    fn newline_with(&mut self, key: &str, value: String) {
        self.push_str("\n");
        self.spans
            .push(FormatSpan::new(self.len - 1, self.len - 1, key, value));
    }

    fn wrap(&mut self, children: &[MdNode], key: &str, value: &str) -> Result<()> {
        let start = self.len;
        for child in children {
            self.walk(child)?;
        }
        if self.len > start {
            self.spans.push(FormatSpan::new(start, self.len, key, value));
        }
        Ok(())
    }

    fn walk(&mut self, node: &MdNode) -> Result<()> {
        match node {
            MdNode::Block(children) => {
                for child in children {
                    self.walk(child)?;
                }
            }
            MdNode::Paragraph(lines) => {
                for (i, line) in lines.iter().enumerate() {
                    for child in line {
                        self.walk(child)?;
                    }
                    self.push_str("\n");
                    let at = self.len - 1;
                    if self.quote > 0 {
                        self.spans.push(FormatSpan::new(at, at, "bq", "true"));
                    }
                    if let Some(ordered) = self.lists.last() {
                        let key = match (i > 0, ordered) {
                            (true, _) => "il",
                            (false, true) => "ol",
                            (false, false) => "ul",
                        };
                        let depth = self.lists.len() - 1;
                        self.spans.push(FormatSpan::new(at, at, key, depth.to_string()));
                    }
                }
            }
            MdNode::Heading(level, children) => {
                for child in children {
                    self.walk(child)?;
                }
                self.newline_with("h", level.to_string());
            }
            MdNode::Quote(children) => {
                self.quote += 1;
                for child in children {
                    self.walk(child)?;
                }
                self.quote -= 1;
            }
            MdNode::List { ordered, items } => {
                self.lists.push(*ordered);
                for item in items {
                    self.walk(item)?;
                }
                self.lists.pop();
            }
            MdNode::Code { lang, text } => {
                for line in text.split_inclusive('\n') {
                    self.push_str(line.trim_end_matches('\n'));
                    self.newline_with("cb", lang.clone());
                }
            }
            MdNode::Html(raw) => {
                if let Some(figure) = parse_figure(raw) {
                    let (caption, spans) = split_markdown(&figure.caption)?;
                    let offset = self.len;
                    self.spans.extend(spans.into_iter().map(|s| FormatSpan {
                        start: s.start + offset,
                        end: s.end + offset,
                        format: s.format,
                    }));
                    self.push_str(caption.trim_end_matches('\n'));
                    self.push_str("\n");
                    let at = self.len - 1;
                    self.spans.push(FormatSpan {
                        start: at,
                        end: at,
                        format: figure.format,
                    });
                }
            }
            MdNode::Rule => self.newline_with("r", "true".into()),
            MdNode::Emphasis(children) => self.wrap(children, "i", "true")?,
            MdNode::Strong(children) => self.wrap(children, "b", "true")?,
            MdNode::Strike(children) => self.wrap(children, "s", "true")?,
            MdNode::Link { dest, children } => self.wrap(children, "a", dest)?,
            MdNode::InlineCode(code) => {
                let start = self.len;
                self.push_str(code);
                if self.len > start {
                    self.spans.push(FormatSpan::new(start, self.len, "c", "true"));
                }
            }
            MdNode::Text(text) => self.push_str(text),
            // only breaks nested inside inline formats get here
            MdNode::SoftBreak => self.push_str(" "),
            MdNode::HardBreak => self.push_str("\n"),
        }
        Ok(())
    }
}

/// Flatten markdown into plain text and format spans
///
/// Span ends are exclusive; a point span sits on the newline whose line
/// format it sets. Offsets count chars.
pub fn split_markdown(md: &str) -> Result<(String, Vec<FormatSpan>)> {
    if md.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let tree = parse_tree(md)?;
    let mut flat = Flatten::default();
    flat.walk(&tree)?;

    let mut text = flat.text;
    if !md.ends_with('\n') {
        let keep = flat
            .spans
            .last()
            .is_some_and(|s| s.is_point() && s.end + 1 >= flat.len);
        if !keep {
            let trimmed = text.trim_end_matches('\n').len();
            text.truncate(trimmed);
        }
    }
    Ok((text, flat.spans))
}

struct Figure {
    caption: String,
    format: SpanFormat,
}

fn with_px(value: &str) -> String {
    match cached_regex(&NUMERIC, r"^\d+$") {
        Some(re) if re.is_match(value) => format!("{}px", value),
        _ => value.to_string(),
    }
}

/// Image line format and caption of a `<figure>` block
fn parse_figure(raw: &str) -> Option<Figure> {
    let img = cached_regex(&IMG, r"(?is)<img\b([^>]*)>")?.captures(raw)?;
    let attrs = img.get(1)?.as_str();
    let attr_re = cached_regex(
        &ATTR,
        r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    )?;

    let (mut src, mut alt, mut width, mut height) =
        (String::new(), String::new(), String::new(), String::new());
    let (mut style_width, mut style_height) = (String::new(), String::new());
    for cap in attr_re.captures_iter(attrs) {
        let key = cap.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
        let value = unescape_entities(cap.get(2).or(cap.get(3)).map_or("", |m| m.as_str()));
        match key.as_str() {
            "src" => src = value,
            "alt" => alt = value,
            "width" => width = with_px(&value),
            "height" => height = with_px(&value),
            "style" => {
                let style = cached_regex(
                    &STYLE,
                    r"(width|height):\s*(\d+(?:\.\d+)?(?:px|%|em|rem|vh|vw))",
                )?;
                for m in style.captures_iter(&value) {
                    let size = m.get(2).map_or("", |g| g.as_str()).to_string();
                    match m.get(1).map(|g| g.as_str()) {
                        Some("width") => style_width = size,
                        Some("height") => style_height = size,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    if src.is_empty() {
        return None;
    }
    if width.is_empty() {
        width = style_width;
    }
    if height.is_empty() {
        height = style_height;
    }

    let caption = cached_regex(&CAPTION, r"(?is)<figcaption[^>]*>(.*?)</figcaption>")
        .and_then(|re| re.captures(raw))
        .and_then(|c| c.get(1))
        .map_or(String::new(), |m| m.as_str().trim().to_string());

    let format: SpanFormat = [
        ("img", src),
        ("alt", alt),
        ("width", width),
        ("height", height),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    Some(Figure { caption, format })
}

fn strip_whitespace(s: &str) -> (&str, &str, &str) {
    let body_start = s.len() - s.trim_start().len();
    if body_start == s.len() {
        return (s, "", "");
    }
    let body_end = s.trim_end().len();
    (&s[..body_start], &s[body_start..body_end], &s[body_end..])
}

/// Carry the leading and trailing whitespace of `old` over to `new`
///
/// Markdown parsing drops surrounding blank space, so a rewrite of a range
/// would otherwise delete it. The longer trailing run wins and spans move
/// with the leading run.
pub fn align_whitespace(
    old: &str,
    new: &str,
    spans: Vec<FormatSpan>,
) -> (String, Vec<FormatSpan>) {
    let (old_prefix, _, old_suffix) = strip_whitespace(old);
    let (new_prefix, body, new_suffix) = strip_whitespace(new);
    let suffix = if new_suffix.chars().count() > old_suffix.chars().count() {
        new_suffix
    } else {
        old_suffix
    };
    let delta = old_prefix.chars().count() as isize - new_prefix.chars().count() as isize;
    let shift = |ix: usize| (ix as isize + delta).max(0) as usize;

    let text = format!("{}{}{}", old_prefix, body, suffix);
    let spans = spans
        .into_iter()
        .map(|s| FormatSpan {
            start: shift(s.start),
            end: shift(s.end),
            format: s.format,
        })
        .collect();
    (text, spans)
}
