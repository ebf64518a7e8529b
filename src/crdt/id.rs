//! Character identity: `Id`, `Side` and the Lamport clock that mints ids
//!
//! Every character ever inserted owns exactly one [`Id`]. Ids are never
//! reused and survive deletion, so operations can keep addressing content
//! that is no longer visible.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Globally unique identifier for one character or operation
///
/// # Ordering
///
/// Ids are ordered by:
/// 1. `seq` (Lamport timestamp)
/// 2. `author` (tiebreaker for concurrent operations)
///
/// This order decides the placement of concurrent siblings, so every
/// replica resolves the same conflict the same way.
///
/// # Example
///
/// ```rust
/// use synckit_richtext::crdt::Id;
///
/// let a = Id::new("alice", 1);
/// let b = Id::new("bob", 1);
/// let c = Id::new("alice", 2);
///
/// assert!(a < b);
/// assert!(c > b);
/// assert_eq!(serde_json::to_string(&a).unwrap(), r#"["alice",1]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    pub author: String,
    pub seq: u64,
}

impl Id {
    pub fn new(author: impl Into<String>, seq: u64) -> Self {
        Self {
            author: author.into(),
            seq,
        }
    }

    /// Id of the `n`th character of a run starting at this id
    pub fn offset(&self, n: usize) -> Self {
        Self {
            author: self.author.clone(),
            seq: self.seq.saturating_add(n as u64),
        }
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.seq.cmp(&other.seq) {
            Ordering::Equal => self.author.cmp(&other.author),
            other => other,
        }
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.author, self.seq)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.author, self.seq).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (author, seq) = <(String, u64)>::deserialize(deserializer)?;
        Ok(Id { author, seq })
    }
}

/// Which side of its parent a character hangs from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Root,
    Right,
}

impl Side {
    pub fn as_i8(self) -> i8 {
        match self {
            Side::Left => -1,
            Side::Root => 0,
            Side::Right => 1,
        }
    }

    pub fn from_i8(v: i8) -> Option<Self> {
        match v {
            -1 => Some(Side::Left),
            0 => Some(Side::Root),
            1 => Some(Side::Right),
            _ => None,
        }
    }
}

impl Serialize for Side {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl<'de> Deserialize<'de> for Side {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = i8::deserialize(deserializer)?;
        Side::from_i8(v).ok_or_else(|| serde::de::Error::custom(format!("invalid side {}", v)))
    }
}

/// Lamport timestamp for minting ids
///
/// Local operations reserve a block of sequence numbers, one per
/// character. Merging a remote operation moves the clock past it so new
/// local ids always sort after everything already seen.
///
/// # Example
///
/// ```rust
/// use synckit_richtext::crdt::LamportClock;
///
/// let mut clock = LamportClock::new();
/// assert_eq!(clock.reserve(5), 0);
/// assert_eq!(clock.value(), 5);
///
/// clock.update(12); // merged a remote op ending at seq 11
/// assert_eq!(clock.reserve(1), 12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self { value: 0 }
    }

    /// Next sequence number to be handed out
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Reserve `count` consecutive sequence numbers and return the first
    pub fn reserve(&mut self, count: usize) -> u64 {
        let start = self.value;
        self.value = self.value.saturating_add(count.max(1) as u64);
        start
    }

    /// Update clock from a remote timestamp
    ///
    /// Sets clock to max(local, next) to maintain causality
    pub fn update(&mut self, next: u64) {
        self.value = self.value.max(next);
    }
}
