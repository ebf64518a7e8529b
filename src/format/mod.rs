//! Rich format model
//!
//! Span formats are attribute maps over character ranges. Line formats
//! describe the block that a newline terminates. Both travel on the wire
//! as a flat string map, and [`Format::from_map`] decides which one a map
//! denotes.
//!
//! Span keys: `b` bold, `i` italic, `u` underline, `s` strikethrough,
//! `c` inline code, `a` link target, and `e` which erases every
//! attribute set before it.

mod store;

pub use store::{FormatOpOrder, FormatStore};

use crate::error::{Result, SyncError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Attribute map of a span format
pub type SpanFormat = BTreeMap<String, String>;

/// Key that clears all earlier span attributes
pub const ERASE_KEY: &str = "e";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    pub src: String,
    pub alt: String,
    pub width: String,
    pub height: String,
}

/// Block-level format attached to a line's terminating newline
///
/// List and indent variants carry a zero-based nesting depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum LineFormat {
    #[default]
    Plain,
    Header(u8),
    OrderedList(u8),
    BulletList(u8),
    IndentedLine(u8),
    CodeBlock(String),
    BlockQuote,
    Rule,
    Image(ImageFormat),
}

impl LineFormat {
    pub fn is_list(&self) -> bool {
        matches!(self, LineFormat::OrderedList(_) | LineFormat::BulletList(_))
    }

    pub fn to_map(&self) -> SpanFormat {
        let mut map = SpanFormat::new();
        match self {
            LineFormat::Plain => {}
            LineFormat::Header(n) => {
                map.insert("h".into(), n.to_string());
            }
            LineFormat::OrderedList(d) => {
                map.insert("ol".into(), d.to_string());
            }
            LineFormat::BulletList(d) => {
                map.insert("ul".into(), d.to_string());
            }
            LineFormat::IndentedLine(d) => {
                map.insert("il".into(), d.to_string());
            }
            LineFormat::CodeBlock(lang) => {
                map.insert("cb".into(), lang.clone());
            }
            LineFormat::BlockQuote => {
                map.insert("bq".into(), "true".into());
            }
            LineFormat::Rule => {
                map.insert("r".into(), "true".into());
            }
            LineFormat::Image(img) => {
                map.insert("img".into(), img.src.clone());
                map.insert("alt".into(), img.alt.clone());
                map.insert("width".into(), img.width.clone());
                map.insert("height".into(), img.height.clone());
            }
        }
        map
    }
}

/// A span or line format, as carried by a format operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    Span(SpanFormat),
    Line(LineFormat),
}

impl Format {
    pub fn span<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Format::Span(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn is_span(&self) -> bool {
        matches!(self, Format::Span(_))
    }

    pub fn to_map(&self) -> SpanFormat {
        match self {
            Format::Span(map) => map.clone(),
            Format::Line(line) => line.to_map(),
        }
    }

    /// Classify a wire map
    ///
    /// An empty map is the plain line format. Any line key makes the map a
    /// line format, everything else is a span.
    pub fn from_map(map: &SpanFormat) -> Result<Self> {
        if map.is_empty() {
            return Ok(Format::Line(LineFormat::Plain));
        }
        if let Some(src) = map.get("img") {
            if !src.is_empty() {
                let field = |k: &str| map.get(k).cloned().unwrap_or_default();
                return Ok(Format::Line(LineFormat::Image(ImageFormat {
                    src: src.clone(),
                    alt: field("alt"),
                    width: field("width"),
                    height: field("height"),
                })));
            }
        }

        let numbered: [(&str, fn(u8) -> LineFormat); 4] = [
            ("h", LineFormat::Header),
            ("ol", LineFormat::OrderedList),
            ("ul", LineFormat::BulletList),
            ("il", LineFormat::IndentedLine),
        ];
        for (key, make) in numbered {
            if let Some(v) = map.get(key) {
                let n = v.trim_matches('"').parse::<u8>().map_err(|_| {
                    SyncError::Parse(format!("invalid value {:?} for line key {}", v, key))
                })?;
                return Ok(Format::Line(make(n)));
            }
        }
        if let Some(lang) = map.get("cb") {
            return Ok(Format::Line(LineFormat::CodeBlock(lang.clone())));
        }
        if map.contains_key("bq") {
            return Ok(Format::Line(LineFormat::BlockQuote));
        }
        if map.contains_key("r") {
            return Ok(Format::Line(LineFormat::Rule));
        }
        Ok(Format::Span(map.clone()))
    }
}

impl Serialize for Format {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let map: SpanFormat = map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => "null".to_string(),
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        Format::from_map(&map).map_err(serde::de::Error::custom)
    }
}

/// Fold one span format into an accumulated attribute state
pub fn apply_span(state: &mut SpanFormat, format: &SpanFormat) {
    if format.contains_key(ERASE_KEY) {
        state.clear();
    }
    for (key, value) in format {
        if key == ERASE_KEY {
            continue;
        }
        if value.is_empty() || value == "null" {
            state.remove(key);
        } else {
            state.insert(key.clone(), value.clone());
        }
    }
}

/// Attributes present with equal values in both maps
pub fn intersect(a: &SpanFormat, b: &SpanFormat) -> SpanFormat {
    a.iter()
        .filter(|(k, v)| b.get(*k) == Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// A format over a range of flattened text, as produced by the markdown
/// bridge
///
/// `start == end` marks a point format on a single character, usually a
/// newline carrying a line format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpan {
    pub start: usize,
    pub end: usize,
    pub format: SpanFormat,
}

impl FormatSpan {
    pub fn new<K: Into<String>, V: Into<String>>(start: usize, end: usize, key: K, value: V) -> Self {
        let mut format = SpanFormat::new();
        format.insert(key.into(), value.into());
        Self { start, end, format }
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_map_classifies() {
        let plain = Format::from_map(&SpanFormat::new()).unwrap();
        assert_eq!(plain, Format::Line(LineFormat::Plain));

        let bold = Format::span([("b", "true")]);
        assert_eq!(Format::from_map(&bold.to_map()).unwrap(), bold);

        let h = Format::from_map(&Format::span([("h", "2")]).to_map()).unwrap();
        assert_eq!(h, Format::Line(LineFormat::Header(2)));

        let cb = Format::from_map(&Format::span([("cb", "rust")]).to_map()).unwrap();
        assert_eq!(cb, Format::Line(LineFormat::CodeBlock("rust".into())));

        assert!(Format::from_map(&Format::span([("ul", "deep")]).to_map()).is_err());
    }

    #[test]
    fn test_image_needs_src() {
        let map = Format::span([("img", ""), ("alt", "x")]).to_map();
        assert!(Format::from_map(&map).unwrap().is_span());

        let map = Format::span([("img", "a.png"), ("width", "10px")]).to_map();
        match Format::from_map(&map).unwrap() {
            Format::Line(LineFormat::Image(img)) => {
                assert_eq!(img.src, "a.png");
                assert_eq!(img.width, "10px");
                assert_eq!(img.alt, "");
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn test_wire_json() {
        let f: Format = serde_json::from_str(r#"{"ol":"1"}"#).unwrap();
        assert_eq!(f, Format::Line(LineFormat::OrderedList(1)));

        let f: Format = serde_json::from_str(r#"{"b":true,"i":null}"#).unwrap();
        assert_eq!(f, Format::span([("b", "true"), ("i", "null")]));

        let json = serde_json::to_string(&Format::Line(LineFormat::BlockQuote)).unwrap();
        assert_eq!(json, r#"{"bq":"true"}"#);
    }

    #[test]
    fn test_apply_span_and_intersect() {
        let mut state = SpanFormat::new();
        apply_span(&mut state, &Format::span([("b", "true"), ("i", "true")]).to_map());
        apply_span(&mut state, &Format::span([("i", "null")]).to_map());
        assert_eq!(state, Format::span([("b", "true")]).to_map());

        apply_span(&mut state, &Format::span([("e", "true"), ("u", "true")]).to_map());
        assert_eq!(state, Format::span([("u", "true")]).to_map());

        let a = Format::span([("b", "true"), ("a", "x.com")]).to_map();
        let b = Format::span([("b", "true"), ("a", "y.com")]).to_map();
        assert_eq!(intersect(&a, &b), Format::span([("b", "true")]).to_map());
    }
}
