//! Ordered Index: generic AVL tree stored in an arena
//!
//! Nodes live in a `Vec` and refer to their children and parent by index,
//! so stepping to a neighbor never needs a search from the root. The key
//! of a value is derived by a [`KeyOrder`] supplied at construction. Key
//! derivation may fail, in which case the error surfaces before the tree
//! is touched.
//!
//! # Example
//!
//! ```rust
//! use synckit_richtext::index::{KeyOrder, Tree};
//! use synckit_richtext::Result;
//!
//! struct ByValue;
//!
//! impl KeyOrder<u32> for ByValue {
//!     type Key = u32;
//!     fn key(&self, v: &u32) -> Result<u32> {
//!         Ok(*v)
//!     }
//!     fn less(&self, a: &u32, b: &u32) -> bool {
//!         a < b
//!     }
//! }
//!
//! let mut tree = Tree::new(ByValue);
//! for v in [5, 1, 9, 3] {
//!     tree.put(v).unwrap();
//! }
//! assert_eq!(tree.as_slice(), vec![&1, &3, &5, &9]);
//! ```

use super::avl::{AvlArena, Links};
use super::heap::{Heap, HeapOrder};
use crate::error::{Result, SyncError};
use std::marker::PhantomData;

/// Key derivation and ordering for values stored in a [`Tree`]
pub trait KeyOrder<V> {
    type Key;

    fn key(&self, value: &V) -> Result<Self::Key>;

    fn less(&self, a: &Self::Key, b: &Self::Key) -> bool;
}

/// Position of a value inside a tree
///
/// Handles stay valid until the next `put` or `remove` on the same tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

#[derive(Debug, Clone)]
struct Node<V> {
    value: V,
    links: Links,
}

/// Height-balanced binary search tree
#[derive(Debug, Clone)]
pub struct Tree<V, O> {
    nodes: Vec<Node<V>>,
    root: Option<usize>,
    order: O,
}

impl<V, O: KeyOrder<V>> Tree<V, O> {
    pub fn new(order: O) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn order(&self) -> &O {
        &self.order
    }

    /// Insert a value, replacing and returning any value with an equal key
    pub fn put(&mut self, value: V) -> Result<Option<V>> {
        let key = self.order.key(&value)?;

        let mut cur = self.root;
        let mut parent = None;
        let mut go_left = false;
        while let Some(ix) = cur {
            let node_key = self.order.key(&self.nodes[ix].value)?;
            parent = Some(ix);
            if self.order.less(&key, &node_key) {
                go_left = true;
                cur = self.nodes[ix].links.left;
            } else if self.order.less(&node_key, &key) {
                go_left = false;
                cur = self.nodes[ix].links.right;
            } else {
                return Ok(Some(std::mem::replace(&mut self.nodes[ix].value, value)));
            }
        }

        let ix = self.nodes.len();
        self.nodes.push(Node {
            value,
            links: Links::leaf(parent),
        });
        match parent {
            None => self.root = Some(ix),
            Some(p) if go_left => self.nodes[p].links.left = Some(ix),
            Some(p) => self.nodes[p].links.right = Some(ix),
        }
        self.rebalance_from(parent);
        Ok(None)
    }

    pub fn get(&self, key: &O::Key) -> Result<Option<&V>> {
        Ok(self.find(key)?.map(|ix| &self.nodes[ix].value))
    }

    pub fn contains(&self, key: &O::Key) -> Result<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Remove the value whose key equals the key of `value`
    pub fn remove(&mut self, value: &V) -> Result<Option<V>> {
        let key = self.order.key(value)?;
        self.remove_by_key(&key)
    }

    pub fn remove_by_key(&mut self, key: &O::Key) -> Result<Option<V>> {
        match self.find(key)? {
            Some(ix) => Ok(Some(self.remove_at(ix))),
            None => Ok(None),
        }
    }

    /// Greatest value with a key less than or equal to `key`
    pub fn find_left_sib(&self, key: &O::Key) -> Result<Option<Handle>> {
        let mut cur = self.root;
        let mut found = None;
        while let Some(ix) = cur {
            let node_key = self.order.key(&self.nodes[ix].value)?;
            if self.order.less(key, &node_key) {
                cur = self.nodes[ix].links.left;
            } else {
                found = Some(Handle(ix));
                cur = self.nodes[ix].links.right;
            }
        }
        Ok(found)
    }

    /// Smallest value with a key greater than or equal to `key`
    pub fn find_right_sib(&self, key: &O::Key) -> Result<Option<Handle>> {
        let mut cur = self.root;
        let mut found = None;
        while let Some(ix) = cur {
            let node_key = self.order.key(&self.nodes[ix].value)?;
            if self.order.less(&node_key, key) {
                cur = self.nodes[ix].links.right;
            } else {
                found = Some(Handle(ix));
                cur = self.nodes[ix].links.left;
            }
        }
        Ok(found)
    }

    pub fn value(&self, handle: Handle) -> Option<&V> {
        self.nodes.get(handle.0).map(|n| &n.value)
    }

    /// In-order successor
    pub fn step_right(&self, handle: Handle) -> Option<Handle> {
        self.nodes.get(handle.0)?;
        self.successor(handle.0).map(Handle)
    }

    /// In-order predecessor
    pub fn step_left(&self, handle: Handle) -> Option<Handle> {
        self.nodes.get(handle.0)?;
        self.predecessor(handle.0).map(Handle)
    }

    pub fn min_handle(&self) -> Option<Handle> {
        self.root.map(|r| Handle(self.leftmost(r)))
    }

    pub fn max_handle(&self) -> Option<Handle> {
        self.root.map(|r| Handle(self.rightmost(r)))
    }

    pub fn min(&self) -> Option<&V> {
        self.min_handle().and_then(|h| self.value(h))
    }

    pub fn max(&self) -> Option<&V> {
        self.max_handle().and_then(|h| self.value(h))
    }

    pub fn iter(&self) -> Iter<'_, V, O> {
        Iter {
            tree: self,
            next: self.min_handle(),
            forward: true,
        }
    }

    pub fn iter_rev(&self) -> Iter<'_, V, O> {
        Iter {
            tree: self,
            next: self.max_handle(),
            forward: false,
        }
    }

    /// Walk values with keys in the inclusive range `[start, end]`
    pub fn slice<F>(&self, start: &O::Key, end: &O::Key, mut f: F) -> Result<()>
    where
        F: FnMut(&V) -> Result<()>,
    {
        let mut cur = self.find_right_sib(start)?;
        while let Some(h) = cur {
            let value = &self.nodes[h.0].value;
            let key = self.order.key(value)?;
            if self.order.less(end, &key) {
                break;
            }
            f(value)?;
            cur = self.step_right(h);
        }
        Ok(())
    }

    pub fn dft<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&V) -> Result<()>,
    {
        self.iter().try_for_each(|v| f(v))
    }

    pub fn reverse_dft<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&V) -> Result<()>,
    {
        self.iter_rev().try_for_each(|v| f(v))
    }

    pub fn as_slice(&self) -> Vec<&V> {
        self.iter().collect()
    }

    /// K-way in-order merge of several trees sharing one ordering
    ///
    /// Equal keys are yielded in the order of the trees in `trees`.
    pub fn merge<F>(trees: &[&Tree<V, O>], mut f: F) -> Result<()>
    where
        F: FnMut(&V) -> Result<()>,
    {
        let Some(first) = trees.first() else {
            return Ok(());
        };
        let mut heap = Heap::min(MergeOrder {
            order: &first.order,
            _value: PhantomData,
        });

        for (ix, tree) in trees.iter().enumerate() {
            if let Some(handle) = tree.min_handle() {
                heap.push(MergeItem {
                    key: tree.key_at(handle)?,
                    tree: ix,
                    handle,
                });
            }
        }

        while let Some(item) = heap.pop() {
            let tree = trees[item.tree];
            if let Some(value) = tree.value(item.handle) {
                f(value)?;
            }
            if let Some(next) = tree.step_right(item.handle) {
                heap.push(MergeItem {
                    key: tree.key_at(next)?,
                    tree: item.tree,
                    handle: next,
                });
            }
        }
        Ok(())
    }

    /// Exhaustively check parent links, heights, balance and key order
    pub fn validate(&self) -> Result<()> {
        if let Some(root) = self.root {
            if self.nodes[root].links.parent.is_some() {
                return Err(SyncError::Invariant("root has a parent".into()));
            }
            let mut count = 0;
            self.check_subtree(root, None, &mut |_| {
                count += 1;
                Ok(())
            })?;
            if count != self.nodes.len() {
                return Err(SyncError::Invariant(format!(
                    "reachable nodes {} != stored nodes {}",
                    count,
                    self.nodes.len()
                )));
            }
        } else if !self.nodes.is_empty() {
            return Err(SyncError::Invariant("nodes stored without a root".into()));
        }

        let mut prev: Option<O::Key> = None;
        for value in self.iter() {
            let key = self.order.key(value)?;
            if let Some(p) = &prev {
                if !self.order.less(p, &key) {
                    return Err(SyncError::Invariant("keys out of order".into()));
                }
            }
            prev = Some(key);
        }
        Ok(())
    }

    fn key_at(&self, handle: Handle) -> Result<O::Key> {
        self.order.key(&self.nodes[handle.0].value)
    }

    fn find(&self, key: &O::Key) -> Result<Option<usize>> {
        let mut cur = self.root;
        while let Some(ix) = cur {
            let node_key = self.order.key(&self.nodes[ix].value)?;
            if self.order.less(key, &node_key) {
                cur = self.nodes[ix].links.left;
            } else if self.order.less(&node_key, key) {
                cur = self.nodes[ix].links.right;
            } else {
                return Ok(Some(ix));
            }
        }
        Ok(None)
    }

    fn remove_at(&mut self, ix: usize) -> V {
        // A node with two children trades values with its successor, which
        // has at most one child.
        let target = match (self.nodes[ix].links.left, self.nodes[ix].links.right) {
            (Some(_), Some(r)) => {
                let succ = self.leftmost(r);
                self.swap_values(ix, succ);
                succ
            }
            _ => ix,
        };

        let links = self.nodes[target].links;
        let child = links.left.or(links.right);
        let parent = links.parent;
        if let Some(c) = child {
            self.nodes[c].links.parent = parent;
        }
        self.set_child(parent, target, child);

        let last = self.nodes.len() - 1;
        let removed = self.nodes.swap_remove(target);
        let mut start = parent;
        if target != last {
            self.relocate(last, target);
            if start == Some(last) {
                start = Some(target);
            }
        }
        self.rebalance_from(start);
        removed.value
    }

    /// Fix links after the node stored at `from` moved to `to`
    fn relocate(&mut self, from: usize, to: usize) {
        let Links {
            parent, left, right, ..
        } = self.nodes[to].links;
        match parent {
            Some(p) => {
                let links = &mut self.nodes[p].links;
                if links.left == Some(from) {
                    links.left = Some(to);
                } else if links.right == Some(from) {
                    links.right = Some(to);
                }
            }
            None => {
                if self.root == Some(from) {
                    self.root = Some(to);
                }
            }
        }
        if let Some(l) = left {
            self.nodes[l].links.parent = Some(to);
        }
        if let Some(r) = right {
            self.nodes[r].links.parent = Some(to);
        }
    }

    fn swap_values(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.nodes.split_at_mut(hi);
        std::mem::swap(&mut head[lo].value, &mut tail[0].value);
    }
}

impl<V, O> AvlArena for Tree<V, O> {
    fn set_root(&mut self, root: Option<usize>) {
        self.root = root;
    }

    fn links(&self, ix: usize) -> &Links {
        &self.nodes[ix].links
    }

    fn links_mut(&mut self, ix: usize) -> &mut Links {
        &mut self.nodes[ix].links
    }
}

impl<V, O: KeyOrder<V> + Default> Default for Tree<V, O> {
    fn default() -> Self {
        Self::new(O::default())
    }
}

/// In-order iterator over a [`Tree`]
pub struct Iter<'a, V, O> {
    tree: &'a Tree<V, O>,
    next: Option<Handle>,
    forward: bool,
}

impl<'a, V, O: KeyOrder<V>> Iterator for Iter<'a, V, O> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        let handle = self.next?;
        let tree: &'a Tree<V, O> = self.tree;
        self.next = if self.forward {
            tree.step_right(handle)
        } else {
            tree.step_left(handle)
        };
        tree.value(handle)
    }
}

struct MergeItem<K> {
    key: K,
    tree: usize,
    handle: Handle,
}

struct MergeOrder<'a, O, V> {
    order: &'a O,
    _value: PhantomData<fn(&V)>,
}

impl<'a, V, O: KeyOrder<V>> HeapOrder<MergeItem<O::Key>> for MergeOrder<'a, O, V> {
    fn less(&self, a: &MergeItem<O::Key>, b: &MergeItem<O::Key>) -> bool {
        if self.order.less(&a.key, &b.key) {
            return true;
        }
        if self.order.less(&b.key, &a.key) {
            return false;
        }
        a.tree < b.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
    use std::collections::BTreeSet;

    struct ByValue;

    impl KeyOrder<u32> for ByValue {
        type Key = u32;
        fn key(&self, v: &u32) -> Result<u32> {
            Ok(*v)
        }
        fn less(&self, a: &u32, b: &u32) -> bool {
            a < b
        }
    }

    /// Values are (key, payload); key 13 is rejected.
    struct Picky;

    impl KeyOrder<(u32, &'static str)> for Picky {
        type Key = u32;
        fn key(&self, v: &(u32, &'static str)) -> Result<u32> {
            if v.0 == 13 {
                return Err(SyncError::Key("unlucky".into()));
            }
            Ok(v.0)
        }
        fn less(&self, a: &u32, b: &u32) -> bool {
            a < b
        }
    }

    fn tree_of(values: &[u32]) -> Tree<u32, ByValue> {
        let mut tree = Tree::new(ByValue);
        for v in values {
            tree.put(*v).unwrap();
        }
        tree
    }

    #[test]
    fn test_put_get_sorted() {
        let tree = tree_of(&[50, 20, 80, 10, 30, 70, 90, 25]);
        assert_eq!(tree.len(), 8);
        assert_eq!(tree.get(&30).unwrap(), Some(&30));
        assert_eq!(tree.get(&31).unwrap(), None);
        assert_eq!(
            tree.as_slice(),
            vec![&10, &20, &25, &30, &50, &70, &80, &90]
        );
        assert_eq!(tree.min(), Some(&10));
        assert_eq!(tree.max(), Some(&90));
        tree.validate().unwrap();
    }

    #[test]
    fn test_put_replaces_equal_key() {
        let mut tree = Tree::new(Picky);
        assert_eq!(tree.put((1, "a")).unwrap(), None);
        assert_eq!(tree.put((1, "b")).unwrap(), Some((1, "a")));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&1).unwrap(), Some(&(1, "b")));
    }

    #[test]
    fn test_sequential_inserts_stay_balanced() {
        let values: Vec<u32> = (0..1000).collect();
        let tree = tree_of(&values);
        tree.validate().unwrap();
        // log2(1000) ~ 10, AVL bound ~ 1.44 * log2(n)
        let root = tree.root.unwrap();
        assert!(tree.nodes[root].links.height <= 15);
    }

    #[test]
    fn test_remove() {
        let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9, 2, 6]);
        assert_eq!(tree.remove_by_key(&5).unwrap(), Some(5));
        assert_eq!(tree.remove(&1).unwrap(), Some(1));
        assert_eq!(tree.remove_by_key(&42).unwrap(), None);
        tree.validate().unwrap();
        assert_eq!(tree.as_slice(), vec![&2, &3, &4, &6, &7, &8, &9]);

        for v in [2, 3, 4, 6, 7, 8, 9] {
            tree.remove_by_key(&v).unwrap();
            tree.validate().unwrap();
        }
        assert!(tree.is_empty());
        assert_eq!(tree.min(), None);
    }

    #[test]
    fn test_key_failure_leaves_tree_intact() {
        let mut tree = Tree::new(Picky);
        tree.put((1, "a")).unwrap();
        tree.put((20, "b")).unwrap();

        let err = tree.put((13, "c")).unwrap_err();
        assert!(matches!(err, SyncError::Key(_)));
        assert!(tree.remove(&(13, "c")).is_err());
        assert_eq!(tree.len(), 2);
        tree.validate().unwrap();
    }

    #[test]
    fn test_siblings() {
        let tree = tree_of(&[10, 20, 30, 40]);
        let at = |h: Option<Handle>| h.and_then(|h| tree.value(h)).copied();

        assert_eq!(at(tree.find_right_sib(&20).unwrap()), Some(20));
        assert_eq!(at(tree.find_left_sib(&20).unwrap()), Some(20));
        assert_eq!(at(tree.find_right_sib(&21).unwrap()), Some(30));
        assert_eq!(at(tree.find_left_sib(&21).unwrap()), Some(20));
        assert_eq!(at(tree.find_right_sib(&41).unwrap()), None);
        assert_eq!(at(tree.find_left_sib(&9).unwrap()), None);
        assert_eq!(at(tree.find_right_sib(&0).unwrap()), Some(10));
    }

    #[test]
    fn test_stepping_matches_traversal() {
        let tree = tree_of(&[8, 4, 12, 2, 6, 10, 14, 1, 3, 5, 7]);

        let mut forward = Vec::new();
        let mut cur = tree.min_handle();
        while let Some(h) = cur {
            forward.push(*tree.value(h).unwrap());
            cur = tree.step_right(h);
        }
        let expected: Vec<u32> = tree.iter().copied().collect();
        assert_eq!(forward, expected);

        let mut backward = Vec::new();
        let mut cur = tree.max_handle();
        while let Some(h) = cur {
            backward.push(*tree.value(h).unwrap());
            cur = tree.step_left(h);
        }
        let reversed: Vec<u32> = tree.iter_rev().copied().collect();
        assert_eq!(backward, reversed);
        assert_eq!(backward.first(), Some(&14));
    }

    #[test]
    fn test_slice_and_dft() {
        let tree = tree_of(&[1, 3, 5, 7, 9, 11]);
        let mut seen = Vec::new();
        tree.slice(&3, &9, |v| {
            seen.push(*v);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![3, 5, 7, 9]);

        let mut seen = Vec::new();
        tree.slice(&4, &8, |v| {
            seen.push(*v);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![5, 7]);

        let mut rev = Vec::new();
        tree.reverse_dft(|v| {
            rev.push(*v);
            Ok(())
        })
        .unwrap();
        assert_eq!(rev, vec![11, 9, 7, 5, 3, 1]);

        let err = tree.dft(|v| {
            if *v == 5 {
                Err(SyncError::InvalidArgument("stop".into()))
            } else {
                Ok(())
            }
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_merge_trees() {
        let a = tree_of(&[1, 4, 7]);
        let b = tree_of(&[2, 5, 8, 9]);
        let c = tree_of(&[3, 4]);
        let empty = tree_of(&[]);

        let mut out = Vec::new();
        Tree::merge(&[&a, &b, &empty, &c], |v| {
            out.push(*v);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 4, 5, 7, 8, 9]);
    }

    #[test]
    fn test_random_put_remove_stays_balanced() {
        let config = Config {
            cases: 2,
            ..Config::default()
        };
        let mut runner =
            TestRunner::new_with_rng(config, TestRng::deterministic_rng(RngAlgorithm::ChaCha));
        let ops = proptest::collection::vec((any::<bool>(), 0u32..2_000), 10_000);

        runner
            .run(&ops, |ops| {
                let mut tree = Tree::new(ByValue);
                let mut model = BTreeSet::new();
                for (insert, v) in ops {
                    if insert {
                        tree.put(v).unwrap();
                        model.insert(v);
                    } else {
                        let removed = tree.remove_by_key(&v).unwrap();
                        prop_assert_eq!(removed.is_some(), model.remove(&v));
                    }
                    prop_assert_eq!(tree.len(), model.len());
                    prop_assert!(tree.validate().is_ok());
                }
                let values: Vec<u32> = tree.iter().copied().collect();
                let expected: Vec<u32> = model.iter().copied().collect();
                prop_assert_eq!(values, expected);
                Ok(())
            })
            .unwrap();
    }

    proptest! {
        #[test]
        fn prop_right_sib_is_ceiling(values in proptest::collection::btree_set(0u32..500, 0..60), needle in 0u32..520) {
            let tree = tree_of(&values.iter().copied().collect::<Vec<_>>());
            let got = tree.find_right_sib(&needle).unwrap().and_then(|h| tree.value(h)).copied();
            let want = values.range(needle..).next().copied();
            prop_assert_eq!(got, want);

            let got = tree.find_left_sib(&needle).unwrap().and_then(|h| tree.value(h)).copied();
            let want = values.range(..=needle).next_back().copied();
            prop_assert_eq!(got, want);
        }
    }
}
