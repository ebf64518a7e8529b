//! Per-character delete/show history
//!
//! Deletes and shows never overwrite each other. Each one leaves a marker
//! on its target character, and the character's visibility is decided by
//! the marker with the greatest id. Historical views ask the same question
//! restricted to markers they contain.

use super::id::Id;
use crate::error::Result;
use crate::index::{KeyOrder, Tree};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub id: Id,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerOrder;

impl KeyOrder<Marker> for MarkerOrder {
    type Key = Id;

    fn key(&self, value: &Marker) -> Result<Id> {
        Ok(value.id.clone())
    }

    fn less(&self, a: &Id, b: &Id) -> bool {
        a < b
    }
}

#[derive(Debug, Clone, Default)]
pub struct CharHistory {
    markers: HashMap<Id, Tree<Marker, MarkerOrder>>,
}

impl CharHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: &Id, marker: Marker) -> Result<()> {
        self.markers
            .entry(target.clone())
            .or_insert_with(|| Tree::new(MarkerOrder))
            .put(marker)?;
        Ok(())
    }

    /// Marker currently deciding the visibility of `target`
    pub fn latest(&self, target: &Id) -> Option<&Marker> {
        self.markers.get(target).and_then(|t| t.max())
    }

    /// Newest marker on `target` that passes `filter`
    pub fn latest_matching<F>(&self, target: &Id, filter: F) -> Option<&Marker>
    where
        F: Fn(&Id) -> bool,
    {
        let tree = self.markers.get(target)?;
        let mut cur = tree.max_handle();
        while let Some(h) = cur {
            let marker = tree.value(h)?;
            if filter(&marker.id) {
                return Some(marker);
            }
            cur = tree.step_left(h);
        }
        None
    }

    pub fn is_deleted(&self, target: &Id) -> bool {
        self.latest(target).is_some_and(|m| m.deleted)
    }

    /// All markers on `target`, oldest first
    pub fn markers(&self, target: &Id) -> impl Iterator<Item = &Marker> {
        self.markers.get(target).into_iter().flat_map(|t| t.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_marker_wins() {
        let target = Id::new("a", 0);
        let mut history = CharHistory::new();
        assert!(!history.is_deleted(&target));

        history
            .add(&target, Marker { id: Id::new("b", 7), deleted: true })
            .unwrap();
        history
            .add(&target, Marker { id: Id::new("a", 5), deleted: false })
            .unwrap();
        assert!(history.is_deleted(&target), "b_7 outranks a_5");

        history
            .add(&target, Marker { id: Id::new("a", 9), deleted: false })
            .unwrap();
        assert!(!history.is_deleted(&target));
        assert_eq!(history.markers(&target).count(), 3);
    }

    #[test]
    fn test_latest_matching() {
        let target = Id::new("a", 0);
        let mut history = CharHistory::new();
        for (seq, deleted) in [(2, true), (4, false), (6, true)] {
            history
                .add(&target, Marker { id: Id::new("a", seq), deleted })
                .unwrap();
        }
        let before_five = history.latest_matching(&target, |id| id.seq < 5).unwrap();
        assert_eq!(before_five.id.seq, 4);
        assert!(history.latest_matching(&target, |id| id.seq < 2).is_none());
    }
}
