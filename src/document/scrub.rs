//! Read-only playback of document history
//!
//! [`Document::scrub_init`] lists the ids of the history to replay in id
//! order. Step `k` is the version holding the first `k` of them, rendered
//! through [`Document::get_html_at`] without touching live state.

use super::Document;
use crate::crdt::{ContentAddress, Id, Operation};
use crate::error::{Result, SyncError};
use crate::index::Heap;
use serde::Serialize;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ScrubEntry {
    id: Id,
    /// Characters the change touched
    cursor: Option<(Id, Id)>,
}

#[derive(Debug, Clone)]
pub(crate) struct ScrubState {
    entries: Vec<ScrubEntry>,
    range: Option<(Id, Id)>,
    step: usize,
}

impl ScrubState {
    fn address(&self, step: usize) -> Option<ContentAddress> {
        let (start, end) = self.range.clone()?;
        let mut address = ContentAddress::new(start, end);
        for entry in &self.entries[..step.min(self.entries.len())] {
            address.add(&entry.id);
        }
        Some(address)
    }
}

/// One rendered step of a scrub
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrubStep {
    pub html: String,
    pub cursor_start: Option<Id>,
    pub cursor_end: Option<Id>,
}

/// Characters an op touched, first to last
fn op_cursor(op: &Operation) -> Option<(Id, Id)> {
    match op {
        Operation::Insert(ins) => Some((ins.id.clone(), ins.id.offset(ins.len().max(1) - 1))),
        Operation::Delete(mark) | Operation::Show(mark) => Some((
            mark.target.clone(),
            mark.target.offset(mark.span.max(1) - 1),
        )),
        Operation::Format(f) => Some((f.start.clone(), f.end.clone())),
        Operation::Multi(_) | Operation::Rewind(_) | Operation::Snapshot(_) => {
            op.leaves().into_iter().find_map(op_cursor)
        }
    }
}

impl Document {
    /// Enter scrub mode and return the number of steps
    ///
    /// With no bounds the whole op log is replayed one op per step. With
    /// both bounds only ids touching that total range are replayed.
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn scrub_init(&mut self, start: Option<&Id>, end: Option<&Id>) -> Result<usize> {
        let state = match (start, end) {
            (None, None) => self.full_scrub()?,
            (Some(start), Some(end)) => self.range_scrub(start, end)?,
            _ => {
                return Err(SyncError::InvalidArgument(
                    "scrub range needs both ends or neither".into(),
                ))
            }
        };
        let steps = state.entries.len();
        debug!(steps, ranged = start.is_some(), "scrub started");
        self.scrub = Some(state);
        Ok(steps)
    }

    fn full_scrub(&self) -> Result<ScrubState> {
        let mut entries = Vec::with_capacity(self.ops.len());
        self.ops.dft(|op| {
            if let (Some(id), Some(max)) = (op.id(), op.max_seq()) {
                entries.push(ScrubEntry {
                    id: Id::new(id.author.clone(), max),
                    cursor: op_cursor(op),
                });
            }
            Ok(())
        })?;
        Ok(ScrubState {
            entries,
            range: self.full_range(),
            step: 0,
        })
    }

    fn range_scrub(&self, start: &Id, end: &Id) -> Result<ScrubState> {
        let (s, e) = self.tot_range(start, end)?;
        let mut heap = Heap::natural_min();
        for slot in self.slots_between(s, e) {
            let node = self.fugue.node(slot)?;
            let here = Some((node.id.clone(), node.id.clone()));
            heap.push(ScrubEntry {
                id: node.id.clone(),
                cursor: here.clone(),
            });
            for marker in self.history.markers(&node.id) {
                heap.push(ScrubEntry {
                    id: marker.id.clone(),
                    cursor: here.clone(),
                });
            }
            if node.ch == '\n' {
                for op in self.formats.line_ops(&node.id) {
                    heap.push(ScrubEntry {
                        id: op.id.clone(),
                        cursor: here.clone(),
                    });
                }
            }
        }
        for op in self.formats.span_ops() {
            let (os, oe) = self.tot_range(&op.start, &op.end)?;
            if os <= e && oe >= s {
                heap.push(ScrubEntry {
                    id: op.id.clone(),
                    cursor: Some((op.start.clone(), op.end.clone())),
                });
            }
        }

        let mut entries: Vec<ScrubEntry> = Vec::with_capacity(heap.len());
        while let Some(entry) = heap.pop() {
            if entries.last().is_some_and(|last| last.id == entry.id) {
                continue;
            }
            entries.push(entry);
        }
        Ok(ScrubState {
            entries,
            range: Some((start.clone(), end.clone())),
            step: 0,
        })
    }

    /// Render the document as of a step, clamped to `[0, scrub_max()]`
    pub fn scrub_to(&mut self, step: usize) -> Result<ScrubStep> {
        let state = self.scrub.as_ref().ok_or(SyncError::ScrubInactive)?;
        let step = step.min(state.entries.len());
        let html = match (&state.range, state.address(step)) {
            (Some((start, end)), Some(address)) => self.get_html_at(start, end, &address, true)?,
            _ => String::new(),
        };
        let cursor = step
            .checked_sub(1)
            .and_then(|k| state.entries[k].cursor.clone());
        let (cursor_start, cursor_end) = match cursor {
            Some((a, b)) => (Some(a), Some(b)),
            None => (None, None),
        };
        if let Some(state) = self.scrub.as_mut() {
            state.step = step;
        }
        Ok(ScrubStep {
            html,
            cursor_start,
            cursor_end,
        })
    }

    /// Commit the current step as a rewind and leave scrub mode
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn scrub_revert(&mut self) -> Result<Option<Operation>> {
        let state = self.scrub.take().ok_or(SyncError::ScrubInactive)?;
        let (Some((start, end)), Some(address)) = (state.range.clone(), state.address(state.step))
        else {
            return Ok(None);
        };
        debug!(step = state.step, "reverting to scrub step");
        self.rewind(&start, &end, &address)
    }

    pub fn scrub_exit(&mut self) -> Result<()> {
        self.scrub.take().ok_or(SyncError::ScrubInactive)?;
        debug!("scrub exited");
        Ok(())
    }

    pub fn scrub_max(&self) -> Result<usize> {
        self.scrub
            .as_ref()
            .map(|s| s.entries.len())
            .ok_or(SyncError::ScrubInactive)
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrub.is_some()
    }
}
