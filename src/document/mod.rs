//! The replicated rich-text document
//!
//! A [`Document`] owns every index for one text: the sibling tree that
//! orders characters, the rope that turns characters into offsets, the
//! delete/show history, format storage and the op log. Local edits build
//! an [`Operation`], apply it through the same path remote operations
//! take, and hand it back for broadcast.
//!
//! # Example
//!
//! ```rust
//! use synckit_richtext::Document;
//!
//! let mut alice = Document::new("alice");
//! let mut bob = Document::new("bob");
//!
//! let hello = alice.insert(0, "Hello").unwrap();
//! bob.merge_op(hello).unwrap();
//!
//! let bang = alice.insert(5, "!").unwrap();
//! let world = bob.insert(5, " World").unwrap();
//! alice.merge_op(world).unwrap();
//! bob.merge_op(bang).unwrap();
//!
//! assert_eq!(alice.get_text(), bob.get_text());
//! ```

mod address;
mod edit;
mod history;
mod merge;
mod paste;
mod rich;
mod scrub;
mod view;

pub use paste::PasteItem;
pub use scrub::ScrubStep;
pub use view::{Selection, View};

use crate::crdt::fugue::FugueTree;
use crate::crdt::history::CharHistory;
use crate::crdt::rope::Rope;
use crate::crdt::{Id, LamportClock, OpIndex, Operation};
use crate::error::{Result, SyncError};
use crate::format::FormatStore;
use crate::index::{KeyOrder, Tree};
use ropey::Rope as TextRope;
use serde::{Deserialize, Serialize};

/// Per-document settings
///
/// Hosts may pass partial JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentConfig {
    /// Author minting ids for local edits
    pub author: String,
    /// Remote ops waiting on missing dependencies that are kept for retry
    pub max_pending_ops: usize,
}

impl DocumentConfig {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            ..Self::default()
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            author: uuid::Uuid::new_v4().to_string(),
            max_pending_ops: 1024,
        }
    }
}

/// Character at a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharInfo {
    pub id: Id,
    pub ch: char,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
struct SlotEntry {
    id: Id,
    slot: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotOrder;

impl KeyOrder<SlotEntry> for SlotOrder {
    type Key = Id;

    fn key(&self, value: &SlotEntry) -> Result<Id> {
        Ok(value.id.clone())
    }

    fn less(&self, a: &Id, b: &Id) -> bool {
        a < b
    }
}

/// Replicated rich-text document
#[derive(Debug, Clone)]
pub struct Document {
    config: DocumentConfig,
    clock: LamportClock,
    fugue: FugueTree,
    rope: Rope,
    slots: Tree<SlotEntry, SlotOrder>,
    text: TextRope,
    history: CharHistory,
    formats: FormatStore,
    ops: OpIndex,
    pending: Vec<Operation>,
    undo: history::UndoState,
    scrub: Option<scrub::ScrubState>,
}

impl Document {
    pub fn new(author: impl Into<String>) -> Self {
        Self::with_config(DocumentConfig::new(author))
    }

    pub fn with_config(config: DocumentConfig) -> Self {
        Self {
            config,
            clock: LamportClock::new(),
            fugue: FugueTree::new(),
            rope: Rope::new(),
            slots: Tree::new(SlotOrder),
            text: TextRope::new(),
            history: CharHistory::new(),
            formats: FormatStore::new(),
            ops: OpIndex::new(),
            pending: Vec::new(),
            undo: history::UndoState::default(),
            scrub: None,
        }
    }

    pub fn author(&self) -> &str {
        &self.config.author
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Next sequence number this replica will mint
    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    /// Number of visible characters
    pub fn len(&self) -> usize {
        self.rope.vis_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of characters including tombstones
    pub fn tot_len(&self) -> usize {
        self.rope.tot_len()
    }

    /// Remote ops buffered until their dependencies arrive
    pub fn pending_ops(&self) -> &[Operation] {
        &self.pending
    }

    pub(crate) fn op_index(&self) -> &OpIndex {
        &self.ops
    }

    /// Author of every visible character, in document order
    pub(crate) fn visible_authors(&self) -> Result<Vec<&str>> {
        let mut authors = Vec::with_capacity(self.len());
        for slot in self.rope.iter() {
            if !self.rope.is_deleted(slot) {
                authors.push(self.id_at_slot(slot)?.author.as_str());
            }
        }
        Ok(authors)
    }

    pub fn get_text(&self) -> String {
        self.text.to_string()
    }

    pub fn get_vis_id(&self, ix: usize) -> Result<Id> {
        let slot = self
            .rope
            .find_vis(ix)
            .ok_or(SyncError::PositionOutOfBounds {
                position: ix,
                length: self.len(),
            })?;
        Ok(self.fugue.node(slot)?.id.clone())
    }

    pub fn get_tot_id(&self, ix: usize) -> Result<Id> {
        let slot = self
            .rope
            .find_tot(ix)
            .ok_or(SyncError::PositionOutOfBounds {
                position: ix,
                length: self.tot_len(),
            })?;
        Ok(self.fugue.node(slot)?.id.clone())
    }

    /// Character at visible offset `ix`
    pub fn get_node(&self, ix: usize) -> Result<CharInfo> {
        let id = self.get_vis_id(ix)?;
        self.get_char_info(&id)
    }

    pub fn get_char_info(&self, id: &Id) -> Result<CharInfo> {
        let slot = self.slot_of(id)?;
        let node = self.fugue.node(slot)?;
        Ok(CharInfo {
            id: node.id.clone(),
            ch: node.ch,
            deleted: self.rope.is_deleted(slot),
        })
    }

    pub fn get_char_by_id(&self, id: &Id) -> Result<char> {
        Ok(self.fugue.node(self.slot_of(id)?)?.ch)
    }

    pub fn is_deleted(&self, id: &Id) -> Result<bool> {
        Ok(self.rope.is_deleted(self.slot_of(id)?))
    }

    /// Visible offset (if the character is visible) and total offset of `id`
    pub fn get_index(&self, id: &Id) -> Result<(Option<usize>, usize)> {
        self.rope.index_of(self.slot_of(id)?)
    }

    /// Nearest visible character strictly left of `id`
    pub fn vis_left_of(&self, id: &Id) -> Result<Option<Id>> {
        let (vis_before, _) = self.rope.offsets(self.slot_of(id)?)?;
        if vis_before == 0 {
            return Ok(None);
        }
        self.get_vis_id(vis_before - 1).map(Some)
    }

    /// Nearest visible character strictly right of `id`
    pub fn vis_right_of(&self, id: &Id) -> Result<Option<Id>> {
        let slot = self.slot_of(id)?;
        let (vis_before, _) = self.rope.offsets(slot)?;
        let next = vis_before + usize::from(!self.rope.is_deleted(slot));
        match self.rope.find_vis(next) {
            Some(s) => Ok(Some(self.fugue.node(s)?.id.clone())),
            None => Ok(None),
        }
    }

    pub fn tot_left_of(&self, id: &Id) -> Result<Option<Id>> {
        match self.rope.prev(self.slot_of(id)?) {
            Some(s) => Ok(Some(self.fugue.node(s)?.id.clone())),
            None => Ok(None),
        }
    }

    pub fn tot_right_of(&self, id: &Id) -> Result<Option<Id>> {
        match self.rope.next(self.slot_of(id)?) {
            Some(s) => Ok(Some(self.fugue.node(s)?.id.clone())),
            None => Ok(None),
        }
    }

    /// Whether `id` lies in the inclusive total range `[start, end]`
    pub fn span_contains_id(&self, start: &Id, end: &Id, id: &Id) -> bool {
        match (self.tot_range(start, end), self.get_index(id)) {
            (Ok((s, e)), Ok((_, ix))) => s <= ix && ix <= e,
            _ => false,
        }
    }

    /// Visible span strictly between `before` and `after`, as (offset, length)
    ///
    /// A trailing newline at `after` is included in the span.
    pub fn highlight_span(&self, before: &Id, after: &Id) -> Result<(usize, usize)> {
        let start = self
            .vis_right_of(before)?
            .ok_or_else(|| SyncError::IdNotFound(before.clone()))?;
        let end = if self.get_char_by_id(after)? == '\n' && !self.is_deleted(after)? {
            after.clone()
        } else {
            self.vis_left_of(after)?
                .ok_or_else(|| SyncError::IdNotFound(after.clone()))?
        };
        let (start_ix, _) = self.rope.offsets(self.slot_of(&start)?)?;
        let (end_ix, _) = self.rope.offsets(self.slot_of(&end)?)?;
        if end_ix < start_ix {
            return Ok((start_ix, 0));
        }
        Ok((start_ix, end_ix - start_ix + 1))
    }

    /// First and last ids in total order
    pub fn full_range(&self) -> Option<(Id, Id)> {
        let first = self.rope.first()?;
        let last = self.rope.last()?;
        let first = self.fugue.node(first).ok()?.id.clone();
        let last = self.fugue.node(last).ok()?.id.clone();
        Some((first, last))
    }

    /// Check every internal index against the others
    pub fn validate(&self) -> Result<()> {
        self.slots.validate()?;
        self.rope.validate()?;
        let walked = self.fugue.in_order();
        let stored: Vec<usize> = self.rope.iter().collect();
        if walked != stored {
            return Err(SyncError::Invariant(
                "rope order diverged from sibling tree".into(),
            ));
        }
        if self.text.len_chars() != self.rope.vis_len() {
            return Err(SyncError::Invariant("text mirror out of sync".into()));
        }
        Ok(())
    }

    fn slot_of(&self, id: &Id) -> Result<usize> {
        self.slots
            .get(id)?
            .map(|e| e.slot)
            .ok_or_else(|| SyncError::IdNotFound(id.clone()))
    }

    fn has_id(&self, id: &Id) -> Result<bool> {
        self.slots.contains(id)
    }

    fn id_at_slot(&self, slot: usize) -> Result<&Id> {
        Ok(&self.fugue.node(slot)?.id)
    }

    /// Total offsets of two ids, in ascending order
    fn tot_range(&self, start: &Id, end: &Id) -> Result<(usize, usize)> {
        let (_, s) = self.rope.offsets(self.slot_of(start)?)?;
        let (_, e) = self.rope.offsets(self.slot_of(end)?)?;
        Ok(if s <= e { (s, e) } else { (e, s) })
    }

    /// Slots in the inclusive total range `[s, e]`
    fn slots_between(&self, s: usize, e: usize) -> impl Iterator<Item = usize> + '_ {
        self.rope
            .iter_from(self.rope.find_tot(s))
            .take(e.saturating_sub(s) + 1)
    }

    fn next_id(&mut self, len: usize) -> Id {
        Id::new(self.config.author.clone(), self.clock.reserve(len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document() {
        let doc = Document::new("alice");
        assert_eq!(doc.author(), "alice");
        assert!(doc.is_empty());
        assert_eq!(doc.get_text(), "");
        assert!(doc.full_range().is_none());
        assert!(doc.get_vis_id(0).is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config: DocumentConfig = serde_json::from_str(r#"{"author":"bob"}"#).unwrap();
        assert_eq!(config.author, "bob");
        assert_eq!(config.max_pending_ops, 1024);

        let a = DocumentConfig::default();
        let b = DocumentConfig::default();
        assert_ne!(a.author, b.author, "default authors are random");
    }

    #[test]
    fn test_position_index() {
        let mut doc = Document::new("a");
        doc.insert(0, "abcd").unwrap();
        doc.delete(1, 2).unwrap(); // "ad"

        let a = doc.get_tot_id(0).unwrap();
        let b = doc.get_tot_id(1).unwrap();
        let d = doc.get_tot_id(3).unwrap();

        assert_eq!(doc.get_vis_id(1).unwrap(), d);
        assert_eq!(doc.get_index(&b).unwrap(), (None, 1));
        assert_eq!(doc.get_index(&d).unwrap(), (Some(1), 3));
        assert_eq!(doc.vis_right_of(&a).unwrap(), Some(d.clone()));
        assert_eq!(doc.vis_left_of(&d).unwrap(), Some(a.clone()));
        assert_eq!(doc.vis_left_of(&b).unwrap(), Some(a.clone()));
        assert_eq!(doc.vis_left_of(&a).unwrap(), None);
        assert_eq!(doc.tot_right_of(&a).unwrap(), Some(b.clone()));
        assert_eq!(doc.tot_left_of(&a).unwrap(), None);
        assert!(doc.is_deleted(&b).unwrap());
        assert_eq!(doc.get_node(1).unwrap().ch, 'd');
        assert!(doc.span_contains_id(&a, &d, &b));
        assert!(!doc.span_contains_id(&b, &d, &a));
        assert!(matches!(
            doc.get_index(&Id::new("zz", 1)),
            Err(SyncError::IdNotFound(_))
        ));
        doc.validate().unwrap();
    }

    #[test]
    fn test_highlight_span() {
        let mut doc = Document::new("a");
        doc.insert(0, "one two\n").unwrap();
        let before = doc.get_vis_id(2).unwrap(); // 'e'
        let after = doc.get_vis_id(7).unwrap(); // '\n'
        assert_eq!(doc.highlight_span(&before, &after).unwrap(), (3, 5));

        let after = doc.get_vis_id(6).unwrap(); // 'o'
        assert_eq!(doc.highlight_span(&before, &after).unwrap(), (3, 3));
    }
}
