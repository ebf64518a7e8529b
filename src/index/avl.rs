//! Shared AVL balancing over an index arena
//!
//! Both the ordered [`Tree`](super::Tree) and the position rope keep their
//! nodes in a `Vec` linked by index. They differ only in what each node
//! caches about its subtree, so the link surgery and rebalancing live here
//! and each arena supplies [`AvlArena::pull`] to refresh its own aggregate.

use crate::error::{Result, SyncError};

/// Child, parent and height links of one arena node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub parent: Option<usize>,
    pub height: u32,
}

impl Links {
    pub fn leaf(parent: Option<usize>) -> Self {
        Self {
            parent,
            height: 1,
            ..Self::default()
        }
    }
}

pub(crate) trait AvlArena {
    fn set_root(&mut self, root: Option<usize>);

    fn links(&self, ix: usize) -> &Links;

    fn links_mut(&mut self, ix: usize) -> &mut Links;

    /// Recompute whatever `ix` caches about its subtree, heights aside
    fn pull(&mut self, _ix: usize) {}

    fn height(&self, ix: Option<usize>) -> u32 {
        ix.map_or(0, |i| self.links(i).height)
    }

    fn balance(&self, ix: usize) -> i64 {
        let links = self.links(ix);
        i64::from(self.height(links.left)) - i64::from(self.height(links.right))
    }

    fn update(&mut self, ix: usize) {
        let links = *self.links(ix);
        self.links_mut(ix).height = 1 + self.height(links.left).max(self.height(links.right));
        self.pull(ix);
    }

    fn leftmost(&self, mut ix: usize) -> usize {
        while let Some(l) = self.links(ix).left {
            ix = l;
        }
        ix
    }

    fn rightmost(&self, mut ix: usize) -> usize {
        while let Some(r) = self.links(ix).right {
            ix = r;
        }
        ix
    }

    /// In-order successor of `ix`
    fn successor(&self, ix: usize) -> Option<usize> {
        if let Some(r) = self.links(ix).right {
            return Some(self.leftmost(r));
        }
        let mut child = ix;
        let mut parent = self.links(ix).parent;
        while let Some(p) = parent {
            if self.links(p).left == Some(child) {
                return Some(p);
            }
            child = p;
            parent = self.links(p).parent;
        }
        None
    }

    /// In-order predecessor of `ix`
    fn predecessor(&self, ix: usize) -> Option<usize> {
        if let Some(l) = self.links(ix).left {
            return Some(self.rightmost(l));
        }
        let mut child = ix;
        let mut parent = self.links(ix).parent;
        while let Some(p) = parent {
            if self.links(p).right == Some(child) {
                return Some(p);
            }
            child = p;
            parent = self.links(p).parent;
        }
        None
    }

    /// Point whichever link of `parent` held `old` at `new`
    fn set_child(&mut self, parent: Option<usize>, old: usize, new: Option<usize>) {
        match parent {
            None => self.set_root(new),
            Some(p) => {
                let links = self.links_mut(p);
                if links.left == Some(old) {
                    links.left = new;
                } else {
                    links.right = new;
                }
            }
        }
    }

    fn rotate_left(&mut self, x: usize) -> usize {
        let Some(y) = self.links(x).right else {
            return x;
        };
        let inner = self.links(y).left;
        let parent = self.links(x).parent;

        self.links_mut(x).right = inner;
        if let Some(i) = inner {
            self.links_mut(i).parent = Some(x);
        }
        self.links_mut(y).left = Some(x);
        self.links_mut(x).parent = Some(y);
        self.links_mut(y).parent = parent;
        self.set_child(parent, x, Some(y));

        self.update(x);
        self.update(y);
        y
    }

    fn rotate_right(&mut self, x: usize) -> usize {
        let Some(y) = self.links(x).left else {
            return x;
        };
        let inner = self.links(y).right;
        let parent = self.links(x).parent;

        self.links_mut(x).left = inner;
        if let Some(i) = inner {
            self.links_mut(i).parent = Some(x);
        }
        self.links_mut(y).right = Some(x);
        self.links_mut(x).parent = Some(y);
        self.links_mut(y).parent = parent;
        self.set_child(parent, x, Some(y));

        self.update(x);
        self.update(y);
        y
    }

    /// Refresh and rotate every node from `cur` up to the root
    fn rebalance_from(&mut self, mut cur: Option<usize>) {
        while let Some(x) = cur {
            self.update(x);
            let bf = self.balance(x);
            let top = if bf > 1 {
                if let Some(l) = self.links(x).left {
                    if self.balance(l) < 0 {
                        self.rotate_left(l);
                    }
                }
                self.rotate_right(x)
            } else if bf < -1 {
                if let Some(r) = self.links(x).right {
                    if self.balance(r) > 0 {
                        self.rotate_right(r);
                    }
                }
                self.rotate_left(x)
            } else {
                x
            };
            cur = self.links(top).parent;
        }
    }

    /// Check parent links, heights and balance below `ix`
    ///
    /// `visit` sees every node after its children have been checked.
    fn check_subtree<F>(&self, ix: usize, parent: Option<usize>, visit: &mut F) -> Result<u32>
    where
        F: FnMut(usize) -> Result<()>,
    {
        let links = *self.links(ix);
        if links.parent != parent {
            return Err(SyncError::Invariant(format!("bad parent link at node {}", ix)));
        }
        let lh = match links.left {
            Some(l) => self.check_subtree(l, Some(ix), visit)?,
            None => 0,
        };
        let rh = match links.right {
            Some(r) => self.check_subtree(r, Some(ix), visit)?,
            None => 0,
        };
        if lh.abs_diff(rh) > 1 {
            return Err(SyncError::Invariant(format!(
                "unbalanced node {} (left {}, right {})",
                ix, lh, rh
            )));
        }
        let height = 1 + lh.max(rh);
        if links.height != height {
            return Err(SyncError::Invariant(format!(
                "stale height at node {}: {} != {}",
                ix, links.height, height
            )));
        }
        visit(ix)?;
        Ok(height)
    }
}
