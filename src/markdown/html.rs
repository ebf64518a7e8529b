//! Clipboard HTML to text and format spans
//!
//! A forgiving tokenizer rather than a DOM: tags open and close format
//! runs on a stack, block tags break lines, and unknown markup is skipped.
//! Styles written by word processors (`font-weight`, `font-size` and so
//! on) map onto the same span and line formats as the semantic tags.

use super::cached_regex;
use crate::error::{Result, SyncError};
use crate::format::{FormatSpan, SpanFormat};
use regex::Regex;
use std::sync::OnceLock;

static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
static ATTR: OnceLock<Option<Regex>> = OnceLock::new();

const SKIPPED: [&str; 4] = ["head", "style", "script", "title"];

/// Decode the entities clipboard HTML actually uses
pub(crate) fn unescape_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..]
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..=semi]).map(|ch| (ch, semi + 2)));
        match decoded {
            Some((ch, used)) => {
                out.push(ch);
                rest = &rest[used..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let re = cached_regex(
        &ATTR,
        r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
    )?;
    re.captures_iter(attrs).find_map(|cap| {
        let key = cap.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        let value = cap.get(2).or(cap.get(3)).or(cap.get(4))?.as_str();
        Some(unescape_entities(value))
    })
}

fn style_decls(style: &str) -> impl Iterator<Item = (String, String)> + '_ {
    style.split(';').filter_map(|decl| {
        let (prop, value) = decl.split_once(':')?;
        Some((
            prop.trim().to_ascii_lowercase(),
            value.trim().to_ascii_lowercase(),
        ))
    })
}

/// Header level implied by a CSS font size
fn header_for_size(value: &str) -> Option<u8> {
    let (number, scale) = if let Some(n) = value.strip_suffix("pt") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix("px") {
        (n, 0.75)
    } else {
        return None;
    };
    let pt = number.trim().parse::<f64>().ok()? * scale;
    match pt {
        p if p >= 24.0 => Some(1),
        p if p >= 18.0 => Some(2),
        p if p >= 14.0 => Some(3),
        _ => None,
    }
}

#[derive(Debug)]
struct OpenInline {
    tag: String,
    start: usize,
    format: SpanFormat,
}

#[derive(Debug, Default)]
struct HtmlState {
    text: String,
    len: usize,
    spans: Vec<FormatSpan>,
    inline: Vec<OpenInline>,
    lists: Vec<bool>,
    items: usize,
    quote: usize,
    pre: usize,
    headers: Vec<u8>,
    skip: Vec<String>,
    /// Header implied by font sizes on the current line
    sized_header: Option<u8>,
}

impl HtmlState {
    fn at_line_start(&self) -> bool {
        self.text.is_empty() || self.text.ends_with('\n')
    }

    fn push_char(&mut self, ch: char) {
        self.text.push(ch);
        self.len += 1;
    }

    fn push_text(&mut self, raw: &str) {
        let decoded = unescape_entities(raw);
        for ch in decoded.chars() {
            if self.pre > 0 {
                if ch == '\n' {
                    self.newline(true);
                } else {
                    self.push_char(ch);
                }
            } else if ch.is_whitespace() {
                if !self.at_line_start() && !self.text.ends_with(' ') {
                    self.push_char(' ');
                }
            } else {
                self.push_char(ch);
            }
        }
    }

    fn point(&mut self, key: &str, value: String) {
        let at = self.len - 1;
        self.spans.push(FormatSpan::new(at, at, key, value));
    }

    /// End the current line; without `force` an empty line is left alone
    fn newline(&mut self, force: bool) {
        if !force && self.at_line_start() {
            return;
        }
        self.push_char('\n');
        if self.pre > 0 {
            self.point("cb", String::new());
        } else if let Some(level) = self.headers.last().copied().or(self.sized_header) {
            self.point("h", level.to_string());
        } else if let (true, Some(&ordered)) = (self.items > 0, self.lists.last()) {
            let key = if ordered { "ol" } else { "ul" };
            self.point(key, (self.lists.len() - 1).to_string());
        } else if self.quote > 0 {
            self.point("bq", "true".into());
        }
        self.sized_header = None;
    }

    fn open(&mut self, name: &str, attrs: &str, self_closing: bool) {
        if !self.skip.is_empty() || SKIPPED.contains(&name) {
            if SKIPPED.contains(&name) && !self_closing {
                self.skip.push(name.to_string());
            }
            return;
        }
        match name {
            "br" => self.newline(true),
            "hr" => {
                self.newline(false);
                self.push_char('\n');
                self.point("r", "true".into());
            }
            "p" | "div" | "tr" | "section" | "article" | "table" => self.newline(false),
            "ul" | "ol" => {
                self.newline(false);
                self.lists.push(name == "ol");
            }
            "li" => {
                self.newline(false);
                self.items += 1;
            }
            "blockquote" => {
                self.newline(false);
                self.quote += 1;
            }
            "pre" => {
                self.newline(false);
                self.pre += 1;
            }
            _ => {
                if let Some(level) = heading_level(name) {
                    self.newline(false);
                    self.headers.push(level);
                }
            }
        }
        if self_closing {
            return;
        }
        let format = self.tag_format(name, attrs);
        if !format.is_empty() {
            self.inline.push(OpenInline {
                tag: name.to_string(),
                start: self.len,
                format,
            });
        }
    }

    fn tag_format(&mut self, name: &str, attrs: &str) -> SpanFormat {
        let mut format = SpanFormat::new();
        let mut set = |key: &str| {
            format.insert(key.to_string(), "true".to_string());
        };
        match name {
            "b" | "strong" => set("b"),
            "i" | "em" => set("i"),
            "u" | "ins" => set("u"),
            "s" | "del" | "strike" => set("s"),
            "code" if self.pre == 0 => set("c"),
            "a" => {
                if let Some(href) = attribute(attrs, "href") {
                    format.insert("a".into(), href);
                }
            }
            _ => {}
        }
        if let Some(style) = attribute(attrs, "style") {
            for (prop, value) in style_decls(&style) {
                self.apply_style(&mut format, &prop, &value);
            }
        }
        format
    }

    fn apply_style(&mut self, format: &mut SpanFormat, prop: &str, value: &str) {
        let flag = |format: &mut SpanFormat, key: &str, on: bool| {
            if on {
                format.insert(key.to_string(), "true".to_string());
            } else {
                format.remove(key);
            }
        };
        match prop {
            "font-weight" => {
                let bold = match value {
                    "bold" | "bolder" => true,
                    other => other.parse::<u32>().is_ok_and(|w| w >= 600),
                };
                flag(format, "b", bold);
            }
            "font-style" => flag(format, "i", value == "italic" || value == "oblique"),
            "text-decoration" | "text-decoration-line" => {
                if value.contains("underline") {
                    flag(format, "u", true);
                }
                if value.contains("line-through") {
                    flag(format, "s", true);
                }
                if value == "none" {
                    flag(format, "u", false);
                    flag(format, "s", false);
                }
            }
            "font-size" => {
                if let Some(level) = header_for_size(value) {
                    self.sized_header = Some(self.sized_header.map_or(level, |h| h.min(level)));
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        if let Some(top) = self.skip.last() {
            if top == name {
                self.skip.pop();
            }
            return;
        }
        if let Some(pos) = self.inline.iter().rposition(|open| open.tag == name) {
            let closed: Vec<OpenInline> = self.inline.drain(pos..).collect();
            for open in closed.into_iter().rev() {
                self.emit(open);
            }
        }
        match name {
            "p" | "div" | "tr" | "section" | "article" | "table" => self.newline(false),
            "ul" | "ol" => {
                self.newline(false);
                self.lists.pop();
            }
            "li" => {
                self.newline(false);
                self.items = self.items.saturating_sub(1);
            }
            "blockquote" => {
                self.newline(false);
                self.quote = self.quote.saturating_sub(1);
            }
            "pre" => {
                self.newline(false);
                self.pre = self.pre.saturating_sub(1);
            }
            _ => {
                if heading_level(name).is_some() {
                    self.newline(false);
                    self.headers.pop();
                }
            }
        }
    }

    fn emit(&mut self, open: OpenInline) {
        if self.len > open.start {
            self.spans.push(FormatSpan {
                start: open.start,
                end: self.len,
                format: open.format,
            });
        }
    }
}

fn heading_level(name: &str) -> Option<u8> {
    let level = name.strip_prefix('h')?.parse::<u8>().ok()?;
    (1..=6).contains(&level).then_some(level)
}

/// Flatten clipboard HTML into plain text and format spans
///
/// Spans use the same shape as [`super::split_markdown`]: exclusive char
/// ranges for inline formats and points on newlines for line formats.
pub fn parse_html(html: &str) -> Result<(String, Vec<FormatSpan>)> {
    let token = cached_regex(
        &TOKEN,
        r#"(?s)<!--.*?-->|<![^>]*>|<(/?)([a-zA-Z][a-zA-Z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>|[^<]+|<"#,
    )
    .ok_or_else(|| SyncError::Invariant("html tokenizer failed to compile".into()))?;

    let mut state = HtmlState::default();
    for cap in token.captures_iter(html) {
        let Some(whole) = cap.get(0) else { continue };
        match cap.get(2) {
            Some(name) => {
                let name = name.as_str().to_ascii_lowercase();
                let attrs = cap.get(3).map_or("", |m| m.as_str());
                if cap.get(1).is_some_and(|m| !m.as_str().is_empty()) {
                    state.close(&name);
                } else {
                    state.open(&name, attrs, attrs.trim_end().ends_with('/'));
                }
            }
            None if whole.as_str().starts_with("<!") => {}
            None if state.skip.is_empty() => state.push_text(whole.as_str()),
            None => {}
        }
    }

    let unclosed: Vec<OpenInline> = state.inline.drain(..).collect();
    for open in unclosed.into_iter().rev() {
        state.emit(open);
    }
    Ok((state.text, state.spans))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize, key: &str, value: &str) -> FormatSpan {
        FormatSpan::new(start, end, key, value)
    }

    fn parse(html: &str) -> (String, Vec<FormatSpan>) {
        parse_html(html).unwrap()
    }

    #[test]
    fn test_semantic_tags() {
        assert_eq!(
            parse("<p>Hello <b>bold</b> <i>x</i></p>"),
            (
                "Hello bold x\n".into(),
                vec![span(6, 10, "b", "true"), span(11, 12, "i", "true")]
            )
        );
        assert_eq!(
            parse("<a href=\"https://x.dev\">site</a>"),
            ("site".into(), vec![span(0, 4, "a", "https://x.dev")])
        );
    }

    #[test]
    fn test_block_structure() {
        assert_eq!(
            parse("<ul><li>a</li><li>b</li></ul>"),
            (
                "a\nb\n".into(),
                vec![span(1, 1, "ul", "0"), span(3, 3, "ul", "0")]
            )
        );
        assert_eq!(
            parse("<h2>T</h2><pre>x\ny</pre>"),
            (
                "T\nx\ny\n".into(),
                vec![span(1, 1, "h", "2"), span(3, 3, "cb", ""), span(5, 5, "cb", "")]
            )
        );
        assert_eq!(
            parse("<p>a</p><hr><p>b</p>"),
            ("a\n\nb\n".into(), vec![span(2, 2, "r", "true")])
        );
    }

    #[test]
    fn test_word_processor_styles() {
        let html = "<html><head><style>p{}</style></head><body>\
                    <b style=\"font-weight:normal\">  plain   text </b></body></html>";
        assert_eq!(parse(html), ("plain text ".into(), vec![]));

        assert_eq!(
            parse("<p><span style=\"font-size:20pt\">Big</span></p><p>small</p>"),
            ("Big\nsmall\n".into(), vec![span(3, 3, "h", "2")])
        );
        assert_eq!(
            parse("<span style=\"font-style: italic; text-decoration: underline\">x</span>"),
            (
                "x".into(),
                vec![FormatSpan {
                    start: 0,
                    end: 1,
                    format: [("i", "true"), ("u", "true")]
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                }]
            )
        );
    }

    #[test]
    fn test_entities_and_breaks() {
        assert_eq!(parse("a &amp; b<br>c &#x41;&#66;"), ("a & b\nc AB".into(), vec![]));
        assert_eq!(unescape_entities("fish &chips;"), "fish &chips;");
        assert_eq!(parse("<!-- note -->1 < 2"), ("1 < 2".into(), vec![]));
    }
}
