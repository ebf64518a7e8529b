//! Order-statistic rope over character slots
//!
//! Each slot is one character, visible or tombstoned. Nodes are kept in an
//! AVL tree ordered by document position, and every node caches the total
//! and visible counts of its subtree. That gives O(log n) conversion
//! between a slot and its visible or total offset in both directions.
//!
//! Slots are handed out in insertion order and never removed: a delete
//! only flips the tombstone flag.

use crate::error::{Result, SyncError};
use crate::index::{AvlArena, Links};

#[derive(Debug, Clone)]
struct RopeNode {
    links: Links,
    tot: usize,
    vis: usize,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Rope {
    nodes: Vec<RopeNode>,
    root: Option<usize>,
}

impl Rope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots, tombstones included
    pub fn tot_len(&self) -> usize {
        self.count_tot(self.root)
    }

    /// Number of visible slots
    pub fn vis_len(&self) -> usize {
        self.count_vis(self.root)
    }

    pub fn contains_slot(&self, slot: usize) -> bool {
        slot < self.nodes.len()
    }

    /// Insert a new visible slot so that it ends up at total offset `tot_ix`
    ///
    /// Returns the new slot, which is always the next unused slot number.
    pub fn insert(&mut self, tot_ix: usize) -> Result<usize> {
        let len = self.tot_len();
        if tot_ix > len {
            return Err(SyncError::PositionOutOfBounds {
                position: tot_ix,
                length: len,
            });
        }

        let slot = self.nodes.len();
        self.nodes.push(RopeNode {
            links: Links::leaf(None),
            tot: 1,
            vis: 1,
            deleted: false,
        });

        let Some(mut cur) = self.root else {
            self.root = Some(slot);
            return Ok(slot);
        };

        let mut ix = tot_ix;
        loop {
            let links = self.nodes[cur].links;
            let left_tot = self.count_tot(links.left);
            if ix <= left_tot {
                match links.left {
                    Some(l) => cur = l,
                    None => {
                        self.nodes[cur].links.left = Some(slot);
                        break;
                    }
                }
            } else {
                ix -= left_tot + 1;
                match links.right {
                    Some(r) => cur = r,
                    None => {
                        self.nodes[cur].links.right = Some(slot);
                        break;
                    }
                }
            }
        }
        self.nodes[slot].links.parent = Some(cur);
        self.rebalance_from(Some(cur));
        Ok(slot)
    }

    /// Slot at total offset `ix`
    pub fn find_tot(&self, mut ix: usize) -> Option<usize> {
        let mut cur = self.root;
        while let Some(n) = cur {
            let links = self.nodes[n].links;
            let left_tot = self.count_tot(links.left);
            if ix < left_tot {
                cur = links.left;
            } else if ix == left_tot {
                return Some(n);
            } else {
                ix -= left_tot + 1;
                cur = links.right;
            }
        }
        None
    }

    /// Slot at visible offset `ix`
    pub fn find_vis(&self, mut ix: usize) -> Option<usize> {
        let mut cur = self.root;
        while let Some(n) = cur {
            let node = &self.nodes[n];
            let left_vis = self.count_vis(node.links.left);
            if ix < left_vis {
                cur = node.links.left;
            } else if ix == left_vis && !node.deleted {
                return Some(n);
            } else {
                ix -= left_vis + usize::from(!node.deleted);
                cur = node.links.right;
            }
        }
        None
    }

    /// Visible characters strictly before `slot`, and its total offset
    pub fn offsets(&self, slot: usize) -> Result<(usize, usize)> {
        let node = self.nodes.get(slot).ok_or_else(|| {
            SyncError::Invariant(format!("slot {} is not in the rope", slot))
        })?;
        let mut vis = self.count_vis(node.links.left);
        let mut tot = self.count_tot(node.links.left);
        let mut child = slot;
        let mut parent = node.links.parent;
        while let Some(p) = parent {
            let pn = &self.nodes[p];
            if pn.links.right == Some(child) {
                vis += self.count_vis(pn.links.left) + usize::from(!pn.deleted);
                tot += self.count_tot(pn.links.left) + 1;
            }
            child = p;
            parent = pn.links.parent;
        }
        Ok((vis, tot))
    }

    /// Visible offset (if visible) and total offset of `slot`
    pub fn index_of(&self, slot: usize) -> Result<(Option<usize>, usize)> {
        let (vis, tot) = self.offsets(slot)?;
        let visible = !self.nodes[slot].deleted;
        Ok((visible.then_some(vis), tot))
    }

    pub fn is_deleted(&self, slot: usize) -> bool {
        self.nodes.get(slot).is_some_and(|n| n.deleted)
    }

    /// Flip the tombstone flag of `slot`, returning whether it changed
    pub fn set_deleted(&mut self, slot: usize, deleted: bool) -> Result<bool> {
        let node = self.nodes.get_mut(slot).ok_or_else(|| {
            SyncError::Invariant(format!("slot {} is not in the rope", slot))
        })?;
        if node.deleted == deleted {
            return Ok(false);
        }
        node.deleted = deleted;
        let mut cur = Some(slot);
        while let Some(n) = cur {
            self.pull(n);
            cur = self.nodes[n].links.parent;
        }
        Ok(true)
    }

    pub fn first(&self) -> Option<usize> {
        self.root.map(|r| self.leftmost(r))
    }

    pub fn last(&self) -> Option<usize> {
        self.root.map(|r| self.rightmost(r))
    }

    /// Slot following `slot` in document order
    pub fn next(&self, slot: usize) -> Option<usize> {
        self.nodes.get(slot)?;
        self.successor(slot)
    }

    /// Slot preceding `slot` in document order
    pub fn prev(&self, slot: usize) -> Option<usize> {
        self.nodes.get(slot)?;
        self.predecessor(slot)
    }

    /// Iterate slots in document order starting at `slot`
    pub fn iter_from(&self, slot: Option<usize>) -> SlotIter<'_> {
        SlotIter { rope: self, next: slot }
    }

    pub fn iter(&self) -> SlotIter<'_> {
        self.iter_from(self.first())
    }

    /// Check heights, balance, cached counts and parent links
    pub fn validate(&self) -> Result<()> {
        if let Some(root) = self.root {
            if self.nodes[root].links.parent.is_some() {
                return Err(SyncError::Invariant("rope root has a parent".into()));
            }
            self.check_subtree(root, None, &mut |n| self.check_counts(n))?;
        }
        if self.tot_len() != self.nodes.len() {
            return Err(SyncError::Invariant("rope lost slots".into()));
        }
        Ok(())
    }

    fn check_counts(&self, n: usize) -> Result<()> {
        let node = &self.nodes[n];
        let (l, r) = (node.links.left, node.links.right);
        let tot = self.count_tot(l) + self.count_tot(r) + 1;
        let vis = self.count_vis(l) + self.count_vis(r) + usize::from(!node.deleted);
        if node.tot != tot || node.vis != vis {
            return Err(SyncError::Invariant(format!("rope counts stale at {}", n)));
        }
        if vis > tot {
            return Err(SyncError::Invariant("visible count exceeds total".into()));
        }
        Ok(())
    }

    fn count_tot(&self, n: Option<usize>) -> usize {
        n.map_or(0, |i| self.nodes[i].tot)
    }

    fn count_vis(&self, n: Option<usize>) -> usize {
        n.map_or(0, |i| self.nodes[i].vis)
    }
}

impl AvlArena for Rope {
    fn set_root(&mut self, root: Option<usize>) {
        self.root = root;
    }

    fn links(&self, ix: usize) -> &Links {
        &self.nodes[ix].links
    }

    fn links_mut(&mut self, ix: usize) -> &mut Links {
        &mut self.nodes[ix].links
    }

    fn pull(&mut self, ix: usize) {
        let node = &self.nodes[ix];
        let (l, r) = (node.links.left, node.links.right);
        let tot = self.count_tot(l) + self.count_tot(r) + 1;
        let vis = self.count_vis(l) + self.count_vis(r) + usize::from(!node.deleted);
        let node = &mut self.nodes[ix];
        node.tot = tot;
        node.vis = vis;
    }
}

/// Document-order iterator over rope slots
pub struct SlotIter<'a> {
    rope: &'a Rope,
    next: Option<usize>,
}

impl Iterator for SlotIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let slot = self.next?;
        self.next = self.rope.next(slot);
        Some(slot)
    }
}
