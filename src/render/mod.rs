//! Rendering resolved characters to HTML, markdown and plain text
//!
//! The document resolves a range into [`RenderChar`]s (visibility, span
//! format and line format already decided for one view), and the writers
//! here only deal with layout.

pub mod html;
pub mod markdown;

pub use html::render_html;
pub use markdown::render_markdown;

use crate::crdt::Id;
use crate::format::{LineFormat, SpanFormat};
use std::ops::Range;

static PLAIN: LineFormat = LineFormat::Plain;

/// How a character differs between the two sides of a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mark {
    #[default]
    Unchanged,
    Inserted,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderChar {
    pub id: Id,
    pub ch: char,
    pub format: SpanFormat,
    /// Block format, only meaningful on newlines
    pub line: LineFormat,
    pub mark: Mark,
}

/// Characters of one line and the newline ending it
///
/// Text after the last newline forms a line with no `end`.
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    pub chars: &'a [RenderChar],
    pub end: Option<&'a RenderChar>,
}

impl Line<'_> {
    pub fn format(&self) -> &LineFormat {
        self.end.map_or(&PLAIN, |c| &c.line)
    }

    /// Id of the first character, or of the newline for an empty line
    pub fn first_id(&self) -> Option<&Id> {
        self.chars.first().or(self.end).map(|c| &c.id)
    }
}

pub fn split_lines(chars: &[RenderChar]) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, c) in chars.iter().enumerate() {
        if c.ch == '\n' {
            lines.push(Line {
                chars: &chars[start..i],
                end: Some(c),
            });
            start = i + 1;
        }
    }
    if start < chars.len() {
        lines.push(Line {
            chars: &chars[start..],
            end: None,
        });
    }
    lines
}

/// Maximal runs of characters sharing span format and diff mark
pub fn runs(chars: &[RenderChar]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=chars.len() {
        let boundary = i == chars.len()
            || chars[i].format != chars[start].format
            || chars[i].mark != chars[start].mark;
        if boundary && i > start {
            out.push(start..i);
            start = i;
        }
    }
    out
}

pub fn plain_text(chars: &[RenderChar]) -> String {
    chars
        .iter()
        .filter(|c| c.mark != Mark::Deleted)
        .map(|c| c.ch)
        .collect()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            c => out.push(c),
        }
    }
    out
}
