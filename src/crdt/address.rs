//! Content addresses
//!
//! A [`ContentAddress`] pins down a version of an id range: the two
//! boundary ids plus, for every author who touched the range, the highest
//! sequence number seen there. An id belongs to the version iff its seq is
//! at or below its author's entry. Nothing outside the range contributes,
//! so edits elsewhere never change the address.

use super::id::Id;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentAddress {
    pub start: Id,
    pub end: Id,
    pub max_ids: BTreeMap<String, u64>,
}

impl ContentAddress {
    pub fn new(start: Id, end: Id) -> Self {
        Self {
            start,
            end,
            max_ids: BTreeMap::new(),
        }
    }

    /// Fold an id into the version
    pub fn add(&mut self, id: &Id) {
        self.max_ids
            .entry(id.author.clone())
            .and_modify(|seq| *seq = (*seq).max(id.seq))
            .or_insert(id.seq);
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.max_ids.get(&id.author).is_some_and(|seq| id.seq <= *seq)
    }

    pub fn is_empty(&self) -> bool {
        self.max_ids.is_empty()
    }

    /// Highest id in the version, by id order
    pub fn max_id(&self) -> Option<Id> {
        self.max_ids
            .iter()
            .map(|(author, seq)| Id::new(author.clone(), *seq))
            .max()
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<(&String, u64)> = self.max_ids.iter().map(|(a, s)| (a, *s)).collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.start)?;
        seq.serialize_element(&self.end)?;
        seq.serialize_element(&entries)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(AddressVisitor)
    }
}

struct AddressVisitor;

impl<'de> Visitor<'de> for AddressVisitor {
    type Value = ContentAddress;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a content address array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ContentAddress, A::Error> {
        let start: Id = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let end: Id = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let entries: Vec<(String, u64)> = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(2, &self))?;
        Ok(ContentAddress {
            start,
            end,
            max_ids: entries.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let mut addr = ContentAddress::new(Id::new("a", 0), Id::new("a", 9));
        addr.add(&Id::new("a", 4));
        addr.add(&Id::new("a", 2));
        addr.add(&Id::new("b", 7));

        assert!(addr.contains(&Id::new("a", 4)));
        assert!(addr.contains(&Id::new("a", 0)));
        assert!(!addr.contains(&Id::new("a", 5)));
        assert!(addr.contains(&Id::new("b", 7)));
        assert!(!addr.contains(&Id::new("c", 0)));
        assert_eq!(addr.max_id(), Some(Id::new("b", 7)));
    }

    #[test]
    fn test_wire_format() {
        let mut addr = ContentAddress::new(Id::new("a", 0), Id::new("a", 3));
        addr.add(&Id::new("b", 1));
        addr.add(&Id::new("a", 3));

        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, r#"[["a",0],["a",3],[["b",1],["a",3]]]"#);
        let back: ContentAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<ContentAddress>(r#"[["a",0]]"#).is_err());
    }
}
