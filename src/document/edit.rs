//! Plain local edits addressed by visible offset

use super::Document;
use crate::crdt::{Action, FormatOp, Id, InsertOp, MarkOp, Operation, Side};
use crate::error::{Result, SyncError};
use crate::format::{Format, LineFormat};

/// Group ids into runs of consecutive seqs by the same author
pub(crate) fn id_runs<I>(ids: I) -> Vec<(Id, usize)>
where
    I: IntoIterator<Item = Id>,
{
    let mut runs: Vec<(Id, usize)> = Vec::new();
    for id in ids {
        if let Some((start, len)) = runs.last_mut() {
            if start.author == id.author && id.seq.checked_sub(start.seq) == Some(*len as u64) {
                *len += 1;
                continue;
            }
        }
        runs.push((id, 1));
    }
    runs
}

impl Document {
    /// Insert `text` at visible offset `ix`
    pub fn insert(&mut self, ix: usize, text: &str) -> Result<Operation> {
        let op = Operation::Insert(self.build_insert(ix, text)?);
        self.commit_local(&op)?;
        Ok(op)
    }

    /// Delete `count` visible characters starting at `ix`
    pub fn delete(&mut self, ix: usize, count: usize) -> Result<Operation> {
        let op = Operation::from_ops(self.delete_ops(ix, count)?)
            .ok_or_else(|| SyncError::InvalidArgument("nothing to delete".into()))?;
        self.commit_local(&op)?;
        Ok(op)
    }

    /// Apply a span or line format to `len` visible characters at `ix`
    pub fn format(&mut self, ix: usize, len: usize, format: Format) -> Result<Operation> {
        let op = match format {
            Format::Line(line) => Operation::from_ops(self.line_format_ops(ix, len, &line)?)
                .ok_or_else(|| SyncError::Invariant("line format produced no ops".into()))?,
            Format::Span(_) => {
                self.check_range(ix, len)?;
                if len == 0 {
                    return Err(SyncError::InvalidArgument("empty format range".into()));
                }
                Operation::Format(FormatOp {
                    start: self.get_vis_id(ix)?,
                    end: self.get_vis_id(ix + len - 1)?,
                    id: self.next_id(1),
                    format,
                })
            }
        };
        self.commit_local(&op)?;
        Ok(op)
    }

    /// Set the line format carried by one newline
    pub fn format_line_by_id(&mut self, newline: &Id, line: LineFormat) -> Result<Operation> {
        if self.get_char_by_id(newline)? != '\n' {
            return Err(SyncError::InvalidArgument(format!(
                "{} is not a newline",
                newline
            )));
        }
        let op = Operation::Format(FormatOp {
            id: self.next_id(1),
            start: newline.clone(),
            end: newline.clone(),
            format: Format::Line(line),
        });
        self.commit_local(&op)?;
        Ok(op)
    }

    /// Apply a local op, dropping any undo walk in progress
    pub(crate) fn commit_local(&mut self, op: &Operation) -> Result<Vec<Action>> {
        let actions = self.commit(op)?;
        self.undo.reset();
        Ok(actions)
    }

    pub(crate) fn check_range(&self, ix: usize, len: usize) -> Result<()> {
        match ix.checked_add(len) {
            Some(end) if end <= self.len() => Ok(()),
            end => Err(SyncError::RangeOutOfBounds {
                start: ix,
                end: end.unwrap_or(usize::MAX),
                length: self.len(),
            }),
        }
    }

    pub(crate) fn build_insert(&mut self, ix: usize, text: &str) -> Result<InsertOp> {
        if text.is_empty() {
            return Err(SyncError::InvalidArgument("cannot insert empty text".into()));
        }
        if ix > self.len() {
            return Err(SyncError::PositionOutOfBounds {
                position: ix,
                length: self.len(),
            });
        }
        let (parent, side) = self.insert_anchor(ix)?;
        Ok(InsertOp {
            id: self.next_id(text.chars().count()),
            text: text.to_string(),
            parent,
            side,
        })
    }

    /// Parent and side for a character landing at visible offset `ix`
    fn insert_anchor(&self, ix: usize) -> Result<(Option<Id>, Side)> {
        let Some(last) = self.rope.last() else {
            return Ok((None, Side::Root));
        };
        let (slot, side) = if ix == 0 {
            match self.rope.find_vis(0) {
                Some(first) => self.fugue.anchor_before(first)?,
                None => self.fugue.anchor_after(last, None)?,
            }
        } else {
            let left = self.rope.find_vis(ix - 1).ok_or(SyncError::PositionOutOfBounds {
                position: ix,
                length: self.len(),
            })?;
            self.fugue.anchor_after(left, self.rope.next(left))?
        };
        Ok((Some(self.id_at_slot(slot)?.clone()), side))
    }

    /// Ids of `count` visible characters from `ix`
    pub(crate) fn visible_ids(&self, ix: usize, count: usize) -> Result<Vec<Id>> {
        self.check_range(ix, count)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut ids = Vec::with_capacity(count);
        for slot in self.rope.iter_from(self.rope.find_vis(ix)) {
            if ids.len() == count {
                break;
            }
            if !self.rope.is_deleted(slot) {
                ids.push(self.id_at_slot(slot)?.clone());
            }
        }
        Ok(ids)
    }

    pub(crate) fn mark_ops(&mut self, ids: Vec<Id>, delete: bool) -> Vec<Operation> {
        id_runs(ids)
            .into_iter()
            .map(|(target, span)| {
                let mark = MarkOp {
                    id: self.next_id(1),
                    target,
                    span,
                };
                if delete {
                    Operation::Delete(mark)
                } else {
                    Operation::Show(mark)
                }
            })
            .collect()
    }

    pub(crate) fn delete_ops(&mut self, ix: usize, count: usize) -> Result<Vec<Operation>> {
        if count == 0 {
            return Err(SyncError::InvalidArgument("cannot delete zero characters".into()));
        }
        let ids = self.visible_ids(ix, count)?;
        Ok(self.mark_ops(ids, true))
    }

    /// Format ops putting `line` on every newline in `[ix, ix + len)` and
    /// on the newline ending the last selected line
    ///
    /// A document without a terminating newline gets one appended first.
    pub(crate) fn line_format_ops(
        &mut self,
        ix: usize,
        len: usize,
        line: &LineFormat,
    ) -> Result<Vec<Operation>> {
        if ix > self.len() {
            return Err(SyncError::PositionOutOfBounds {
                position: ix,
                length: self.len(),
            });
        }
        self.check_range(ix, len)?;

        let mut ops = Vec::new();
        let mut newlines: Vec<Id> = Vec::new();
        for (k, ch) in self.text.chars_at(ix).take(len).enumerate() {
            if ch == '\n' {
                newlines.push(self.get_vis_id(ix + k)?);
            }
        }
        let last = ix + len.saturating_sub(1);
        match self.next_newline(last) {
            Some(nl) if nl >= ix + len => newlines.push(self.get_vis_id(nl)?),
            Some(_) => {}
            None => {
                let ins = self.build_insert(self.len(), "\n")?;
                newlines.push(ins.id.clone());
                ops.push(Operation::Insert(ins));
            }
        }

        for nl in newlines {
            ops.push(Operation::Format(FormatOp {
                id: self.next_id(1),
                start: nl.clone(),
                end: nl,
                format: Format::Line(line.clone()),
            }));
        }
        Ok(ops)
    }

    /// Visible offset of the first newline at or after `from`
    pub(crate) fn next_newline(&self, from: usize) -> Option<usize> {
        if from > self.text.len_chars() {
            return None;
        }
        self.text
            .chars_at(from)
            .position(|c| c == '\n')
            .map(|p| from + p)
    }

    /// Visible offset where the line containing `ix` begins
    pub(crate) fn line_start(&self, ix: usize) -> usize {
        let ix = ix.min(self.text.len_chars());
        let mut chars = self.text.chars_at(ix);
        let mut start = ix;
        while let Some(c) = chars.prev() {
            if c == '\n' {
                break;
            }
            start -= 1;
        }
        start
    }

    /// Line format of the line containing visible offset `ix`
    pub(crate) fn line_format_at(&self, ix: usize) -> Result<LineFormat> {
        match self.next_newline(ix) {
            Some(nl) => {
                let id = self.get_vis_id(nl)?;
                Ok(self.formats.line_format(&id, |_| true))
            }
            None => Ok(LineFormat::Plain),
        }
    }
}
