//! Markdown writer
//!
//! Paragraphs and headers end with a blank line, list and quote lines with
//! a single newline. Inline formats open and close as a stack so that
//! overlapping runs still produce well-nested delimiters.

use super::{runs, split_lines, RenderChar};
use crate::format::{LineFormat, SpanFormat};
use crate::markdown::cached_regex;
use regex::Regex;
use std::sync::OnceLock;

static LINE_START: OnceLock<Option<Regex>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
enum Delim {
    Link(String),
    Bold,
    Italic,
    Strike,
    Code,
}

impl Delim {
    fn open(&self) -> &str {
        match self {
            Delim::Link(_) => "[",
            Delim::Bold => "**",
            Delim::Italic => "*",
            Delim::Strike => "~~",
            Delim::Code => "`",
        }
    }

    fn close(&self) -> String {
        match self {
            Delim::Link(href) => format!("]({})", href),
            other => other.open().to_string(),
        }
    }
}

fn delims(format: &SpanFormat) -> Vec<Delim> {
    let mut out = Vec::new();
    if let Some(href) = format.get("a") {
        out.push(Delim::Link(href.clone()));
    }
    for (key, delim) in [
        ("b", Delim::Bold),
        ("i", Delim::Italic),
        ("s", Delim::Strike),
        ("c", Delim::Code),
    ] {
        if format.contains_key(key) {
            out.push(delim);
        }
    }
    out
}

/// Escape characters markdown would read as syntax
fn escape(text: &str, line_start: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '*' | '_' | '~' | '`' | '[' | ']' => out.push('\\'),
            '<' => {
                out.push_str("&lt;");
                continue;
            }
            '&' => {
                out.push_str("&amp;");
                continue;
            }
            _ => {}
        }
        out.push(ch);
    }
    let block = cached_regex(&LINE_START, r"^( *- | *\d+\. |> |#{1,6} )");
    if line_start && block.is_some_and(|re| re.is_match(&out)) {
        out.insert(0, '\\');
    }
    out
}

fn write_inline(out: &mut String, chars: &[RenderChar]) {
    let wanted: Vec<(std::ops::Range<usize>, Vec<Delim>)> = runs(chars)
        .into_iter()
        .map(|run| {
            let d = delims(&chars[run.start].format);
            (run, d)
        })
        .collect();
    let mut open: Vec<Delim> = Vec::new();
    for (n, (run, want)) in wanted.iter().enumerate() {
        let run = &chars[run.clone()];

        let keep = open.iter().take_while(|d| want.contains(*d)).count();
        while open.len() > keep {
            if let Some(d) = open.pop() {
                out.push_str(&d.close());
            }
        }
        // delimiters that stay open longest go outermost
        let mut opening: Vec<(usize, &Delim)> = want
            .iter()
            .filter(|d| !open.contains(*d))
            .map(|d| {
                let extent = wanted[n..].iter().take_while(|(_, w)| w.contains(d)).count();
                (extent, d)
            })
            .collect();
        opening.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, d) in opening {
            out.push_str(d.open());
            open.push(d.clone());
        }

        let text: String = run.iter().map(|c| c.ch).collect();
        if open.contains(&Delim::Code) {
            out.push_str(&text);
        } else {
            out.push_str(&escape(&text, n == 0 && open.is_empty()));
        }
    }
    while let Some(d) = open.pop() {
        out.push_str(&d.close());
    }
}

fn prefix(format: &LineFormat, ordinal: usize) -> String {
    match format {
        LineFormat::Header(n) => format!("{} ", "#".repeat(usize::from((*n).clamp(1, 6)))),
        LineFormat::BulletList(d) => format!("{}- ", "  ".repeat(usize::from(*d))),
        LineFormat::OrderedList(d) => format!("{}{}. ", "   ".repeat(usize::from(*d)), ordinal),
        LineFormat::IndentedLine(d) => format!("{}   ", "  ".repeat(usize::from(*d))),
        LineFormat::BlockQuote => "> ".into(),
        _ => String::new(),
    }
}

fn suffix(format: &LineFormat) -> &'static str {
    match format {
        LineFormat::Plain | LineFormat::Header(_) | LineFormat::Rule | LineFormat::Image(_) => {
            "\n\n"
        }
        _ => "\n",
    }
}

pub fn render_markdown(chars: &[RenderChar]) -> String {
    let mut out = String::new();
    let mut code: Option<String> = None;
    // ordinals per list depth
    let mut counters: Vec<usize> = Vec::new();

    for line in split_lines(chars) {
        let format = line.format();
        let lang = match format {
            LineFormat::CodeBlock(lang) => Some(lang.as_str()),
            _ => None,
        };
        if code.as_deref() != lang {
            if code.is_some() {
                out.push_str("```\n");
            }
            if let Some(lang) = lang {
                let tag: String = lang.chars().take_while(|c| c.is_ascii_lowercase()).collect();
                out.push_str(&format!("```{}\n", tag));
            }
            code = lang.map(str::to_owned);
        }
        if lang.is_some() {
            out.extend(line.chars.iter().map(|c| c.ch));
            out.push('\n');
            continue;
        }

        let ordinal = match format {
            LineFormat::OrderedList(d) => {
                let depth = usize::from(*d);
                counters.resize(depth + 1, 0);
                counters[depth] += 1;
                counters[depth]
            }
            LineFormat::BulletList(d) => {
                counters.truncate(usize::from(*d));
                0
            }
            LineFormat::IndentedLine(d) => {
                counters.truncate(usize::from(*d) + 1);
                0
            }
            _ => {
                counters.clear();
                0
            }
        };

        match format {
            LineFormat::Rule => out.push_str("---"),
            LineFormat::Image(img) => {
                let mut style = Vec::new();
                if !img.width.is_empty() {
                    style.push(format!("width: {};", img.width));
                }
                if !img.height.is_empty() {
                    style.push(format!("height: {};", img.height));
                }
                out.push_str(&format!("<figure><img src=\"{}\"", img.src));
                if !style.is_empty() {
                    out.push_str(&format!(" style=\"{}\"", style.join(" ")));
                }
                if !img.alt.is_empty() {
                    out.push_str(&format!(" alt=\"{}\"", img.alt));
                }
                out.push_str(" /><figcaption>");
                write_inline(&mut out, line.chars);
                out.push_str("</figcaption></figure>");
            }
            _ => {
                out.push_str(&prefix(format, ordinal));
                write_inline(&mut out, line.chars);
            }
        }
        if line.end.is_some() {
            out.push_str(suffix(format));
        }
    }
    if code.is_some() {
        out.push_str("```\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::{chars, set};

    #[test]
    fn test_inline_delimiters() {
        let mut cs = chars("a bold move\n");
        set(&mut cs, 2..6, "b", "true");
        set(&mut cs, 2..11, "i", "true");
        assert_eq!(render_markdown(&cs), "a ***bold** move*\n\n");
    }

    #[test]
    fn test_link() {
        let mut cs = chars("see docs");
        set(&mut cs, 4..8, "a", "https://x.dev");
        assert_eq!(render_markdown(&cs), "see [docs](https://x.dev)");
    }

    #[test]
    fn test_line_formats() {
        let mut cs = chars("T\na\nb\nq\n");
        cs[1].line = LineFormat::Header(1);
        cs[3].line = LineFormat::OrderedList(0);
        cs[5].line = LineFormat::OrderedList(0);
        cs[7].line = LineFormat::BlockQuote;
        assert_eq!(render_markdown(&cs), "# T\n\n1. a\n2. b\n> q\n");
    }

    #[test]
    fn test_code_block() {
        let mut cs = chars("let *x*;\n");
        cs[8].line = LineFormat::CodeBlock("rust".into());
        assert_eq!(render_markdown(&cs), "```rust\nlet *x*;\n```\n");
    }

    #[test]
    fn test_trailing_code_block_closes_fence() {
        let mut cs = chars("intro\nfn a() {}\nfn b() {}\nlet x;\n");
        cs[15].line = LineFormat::CodeBlock("rust".into());
        cs[25].line = LineFormat::CodeBlock("rust".into());
        cs[32].line = LineFormat::CodeBlock("js".into());
        assert_eq!(
            render_markdown(&cs),
            "intro\n\n```rust\nfn a() {}\nfn b() {}\n```\n```js\nlet x;\n```\n"
        );
    }

    #[test]
    fn test_escapes_syntax() {
        let cs = chars("- not a list *x*");
        assert_eq!(render_markdown(&cs), "\\- not a list \\*x\\*");
    }
}
