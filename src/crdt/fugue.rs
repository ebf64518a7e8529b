//! Fugue-style sibling tree that decides where characters land
//!
//! Each character hangs off a parent character as a left or right child,
//! or is a root. Siblings on the same side of a parent are kept sorted by
//! [`Id`], and the document order is the in-order walk of the tree: left
//! children, the node, then right children. Because the walk depends only
//! on ids and parent links, every replica that has seen the same set of
//! characters agrees on their order, whatever order they arrived in.
//!
//! The tree never answers positional queries itself. When a node is
//! attached it reports its in-order neighbor through [`Placement`] and the
//! caller inserts it into the position rope next to that neighbor.

use super::id::{Id, Side};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct CharNode {
    pub id: Id,
    pub ch: char,
    pub side: Side,
    pub parent: Option<usize>,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl CharNode {
    pub fn has_left_children(&self) -> bool {
        !self.left.is_empty()
    }

    pub fn has_right_children(&self) -> bool {
        !self.right.is_empty()
    }
}

/// In-order neighbor of a freshly attached node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Goes directly after this slot
    After(usize),
    /// Goes directly before this slot
    Before(usize),
    /// The tree was empty
    Start,
}

#[derive(Debug, Clone, Default)]
pub struct FugueTree {
    nodes: Vec<CharNode>,
    roots: Vec<usize>,
}

impl FugueTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, slot: usize) -> Result<&CharNode> {
        self.nodes
            .get(slot)
            .ok_or_else(|| SyncError::Invariant(format!("slot {} is not in the tree", slot)))
    }

    /// Attach a character and return its slot and in-order neighbor
    ///
    /// `parent` must be `None` exactly when `side` is [`Side::Root`].
    pub fn attach(
        &mut self,
        id: Id,
        ch: char,
        parent: Option<usize>,
        side: Side,
    ) -> Result<(usize, Placement)> {
        match (parent, side) {
            (None, Side::Root) => {}
            (Some(p), Side::Left | Side::Right) if p < self.nodes.len() => {}
            _ => {
                return Err(SyncError::InvalidArgument(format!(
                    "bad anchor for {}: parent {:?}, side {:?}",
                    id, parent, side
                )))
            }
        }

        let slot = self.nodes.len();
        let siblings = match (parent, side) {
            (Some(p), Side::Left) => &self.nodes[p].left,
            (Some(p), _) => &self.nodes[p].right,
            (None, _) => &self.roots,
        };
        let at = siblings.partition_point(|s| self.nodes[*s].id < id);

        self.nodes.push(CharNode {
            id,
            ch,
            side,
            parent,
            left: Vec::new(),
            right: Vec::new(),
        });
        let siblings = match (parent, side) {
            (Some(p), Side::Left) => &mut self.nodes[p].left,
            (Some(p), _) => &mut self.nodes[p].right,
            (None, _) => &mut self.roots,
        };
        siblings.insert(at, slot);

        let placement = match (parent, side) {
            (None, _) => {
                if at > 0 {
                    Placement::After(self.last_in_subtree(self.roots[at - 1]))
                } else if self.roots.len() > 1 {
                    Placement::Before(self.first_in_subtree(self.roots[1]))
                } else {
                    Placement::Start
                }
            }
            (Some(p), Side::Left) => {
                let left = &self.nodes[p].left;
                if at + 1 == left.len() {
                    Placement::Before(p)
                } else {
                    Placement::Before(self.first_in_subtree(left[at + 1]))
                }
            }
            (Some(p), _) => {
                if at == 0 {
                    Placement::After(p)
                } else {
                    Placement::After(self.last_in_subtree(self.nodes[p].right[at - 1]))
                }
            }
        };
        Ok((slot, placement))
    }

    /// Anchor for a character that must land directly after `slot`,
    /// whose in-order successor is `next`
    pub fn anchor_after(&self, slot: usize, next: Option<usize>) -> Result<(usize, Side)> {
        let node = self.node(slot)?;
        match next {
            Some(n) if node.has_right_children() => self.anchor_before(n),
            _ => Ok((slot, Side::Right)),
        }
    }

    /// Anchor for a character that must land directly before `slot`
    pub fn anchor_before(&self, slot: usize) -> Result<(usize, Side)> {
        let node = self.node(slot)?;
        match node.left.last() {
            Some(l) => Ok((self.last_in_subtree(*l), Side::Right)),
            None => Ok((slot, Side::Left)),
        }
    }

    fn first_in_subtree(&self, mut slot: usize) -> usize {
        while let Some(l) = self.nodes[slot].left.first() {
            slot = *l;
        }
        slot
    }

    fn last_in_subtree(&self, mut slot: usize) -> usize {
        while let Some(r) = self.nodes[slot].right.last() {
            slot = *r;
        }
        slot
    }

    /// Full in-order walk, used to check the rope against the tree
    pub fn in_order(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, bool)> = self.roots.iter().rev().map(|r| (*r, false)).collect();
        while let Some((slot, expanded)) = stack.pop() {
            if expanded {
                out.push(slot);
                continue;
            }
            let node = &self.nodes[slot];
            for r in node.right.iter().rev() {
                stack.push((*r, false));
            }
            stack.push((slot, true));
            for l in node.left.iter().rev() {
                stack.push((*l, false));
            }
        }
        out
    }
}
