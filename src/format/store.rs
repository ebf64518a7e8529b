//! Storage for applied format operations
//!
//! Span formats are kept in a single tree in id order, so folding them
//! front to back gives last-writer-wins per attribute. Line formats are
//! kept per newline; the newest op on a newline decides its block format.

use super::LineFormat;
use crate::crdt::{FormatOp, Id};
use crate::error::Result;
use crate::format::Format;
use crate::index::{KeyOrder, Tree};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOpOrder;

impl KeyOrder<FormatOp> for FormatOpOrder {
    type Key = Id;

    fn key(&self, value: &FormatOp) -> Result<Id> {
        Ok(value.id.clone())
    }

    fn less(&self, a: &Id, b: &Id) -> bool {
        a < b
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormatStore {
    spans: Tree<FormatOp, FormatOpOrder>,
    lines: HashMap<Id, Tree<FormatOp, FormatOpOrder>>,
}

impl FormatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, op: FormatOp) -> Result<()> {
        if op.format.is_span() {
            self.spans.put(op)?;
        } else {
            self.lines.entry(op.start.clone()).or_default().put(op)?;
        }
        Ok(())
    }

    /// Span format ops, oldest first
    pub fn span_ops(&self) -> impl Iterator<Item = &FormatOp> {
        self.spans.iter()
    }

    /// Line format ops attached to `newline`, oldest first
    pub fn line_ops(&self, newline: &Id) -> impl Iterator<Item = &FormatOp> {
        self.lines.get(newline).into_iter().flat_map(|t| t.iter())
    }

    /// Newest line op on `newline` that passes `filter`
    pub fn line_op<F>(&self, newline: &Id, filter: F) -> Option<&FormatOp>
    where
        F: Fn(&Id) -> bool,
    {
        let tree = self.lines.get(newline)?;
        let mut cur = tree.max_handle();
        while let Some(h) = cur {
            let op = tree.value(h)?;
            if filter(&op.id) {
                return Some(op);
            }
            cur = tree.step_left(h);
        }
        None
    }

    pub fn line_format<F>(&self, newline: &Id, filter: F) -> LineFormat
    where
        F: Fn(&Id) -> bool,
    {
        match self.line_op(newline, filter).map(|op| &op.format) {
            Some(Format::Line(line)) => line.clone(),
            _ => LineFormat::Plain,
        }
    }
}
