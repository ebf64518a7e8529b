//! Per-author log of applied operations
//!
//! Each author's operations sit in their own [`Tree`] keyed by seq. The
//! global log in id order is produced on demand by a k-way merge over the
//! authors, so no combined copy is ever kept.

use super::id::Id;
use super::op::Operation;
use crate::error::{Result, SyncError};
use crate::index::{KeyOrder, Tree};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpSeqOrder;

impl KeyOrder<Operation> for OpSeqOrder {
    type Key = u64;

    fn key(&self, value: &Operation) -> Result<u64> {
        value
            .id()
            .map(|id| id.seq)
            .ok_or_else(|| SyncError::Key("operation has no id".into()))
    }

    fn less(&self, a: &u64, b: &u64) -> bool {
        a < b
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpIndex {
    authors: BTreeMap<String, Tree<Operation, OpSeqOrder>>,
    len: usize,
}

impl OpIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn put(&mut self, op: Operation) -> Result<()> {
        let author = op
            .id()
            .map(|id| id.author.clone())
            .ok_or_else(|| SyncError::Key("operation has no id".into()))?;
        let replaced = self
            .authors
            .entry(author)
            .or_insert_with(|| Tree::new(OpSeqOrder))
            .put(op)?;
        if replaced.is_none() {
            self.len += 1;
        }
        Ok(())
    }

    /// Operation whose id is exactly `id`
    pub fn get(&self, id: &Id) -> Result<Option<&Operation>> {
        match self.authors.get(&id.author) {
            Some(tree) => tree.get(&id.seq),
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: &Id) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Newest operation by `author` with a seq strictly below `bound`
    pub fn before(&self, author: &str, bound: u64) -> Result<Option<&Operation>> {
        let Some(tree) = self.authors.get(author) else {
            return Ok(None);
        };
        if bound == 0 {
            return Ok(None);
        }
        Ok(tree
            .find_left_sib(&(bound - 1))?
            .and_then(|h| tree.value(h)))
    }

    /// Highest seq minted by `author`, if any
    pub fn max_seq(&self, author: &str) -> Option<u64> {
        self.authors
            .get(author)
            .and_then(|t| t.max())
            .and_then(|op| op.max_seq())
    }

    /// Highest seq across all authors
    pub fn max_seq_overall(&self) -> u64 {
        self.authors
            .values()
            .filter_map(|t| t.max().and_then(|op| op.max_seq()))
            .max()
            .unwrap_or(0)
    }

    pub fn authors(&self) -> impl Iterator<Item = (&str, &Tree<Operation, OpSeqOrder>)> {
        self.authors.iter().map(|(a, t)| (a.as_str(), t))
    }

    /// Walk every operation in global id order
    pub fn dft<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&Operation) -> Result<()>,
    {
        let trees: Vec<&Tree<Operation, OpSeqOrder>> = self.authors.values().collect();
        Tree::merge(&trees, f)
    }

    /// All operations in global id order
    pub fn to_ops(&self) -> Result<Vec<Operation>> {
        let mut ops = Vec::with_capacity(self.len);
        self.dft(|op| {
            ops.push(op.clone());
            Ok(())
        })?;
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::op::MarkOp;

    fn del(author: &str, seq: u64) -> Operation {
        Operation::Delete(MarkOp {
            id: Id::new(author, seq),
            target: Id::new("x", 0),
            span: 1,
        })
    }

    #[test]
    fn test_global_order_merges_authors() {
        let mut index = OpIndex::new();
        for (author, seq) in [("b", 2), ("a", 5), ("a", 1), ("b", 5), ("c", 3)] {
            index.put(del(author, seq)).unwrap();
        }
        index.put(del("a", 1)).unwrap();
        assert_eq!(index.len(), 5);

        let ids: Vec<Id> = index
            .to_ops()
            .unwrap()
            .iter()
            .filter_map(|op| op.id().cloned())
            .collect();
        assert_eq!(
            ids,
            vec![
                Id::new("a", 1),
                Id::new("b", 2),
                Id::new("c", 3),
                Id::new("a", 5),
                Id::new("b", 5),
            ]
        );
    }

    #[test]
    fn test_lookups() {
        let mut index = OpIndex::new();
        index.put(del("a", 1)).unwrap();
        index.put(del("a", 4)).unwrap();

        assert!(index.contains(&Id::new("a", 4)).unwrap());
        assert!(!index.contains(&Id::new("a", 3)).unwrap());
        assert!(!index.contains(&Id::new("z", 1)).unwrap());

        let before = index.before("a", 4).unwrap().and_then(|op| op.id().cloned());
        assert_eq!(before, Some(Id::new("a", 1)));
        assert!(index.before("a", 1).unwrap().is_none());
        assert_eq!(index.max_seq("a"), Some(4));
        assert_eq!(index.max_seq_overall(), 4);

        assert!(index.put(Operation::Snapshot(vec![])).is_err());
    }
}
