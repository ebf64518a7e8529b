//! Operations, their wire format, and merge actions
//!
//! Operations travel as tagged JSON arrays:
//!
//! | tag | shape |
//! |-----|-------|
//! | 0 | `[0, id, text, parent \| null, side]` insert |
//! | 1 | `[1, id, target, span]` delete |
//! | 2 | `[2, id, start, end, format]` format |
//! | 3 | `[3, [ops]]` snapshot |
//! | 6 | `[6, [ops]]` multi |
//! | 7 | `[7, id, address, [ops]]` rewind |
//! | 8 | `[8, id, target, span]` show |

use super::address::ContentAddress;
use super::id::{Id, Side};
use crate::format::Format;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const TAG_INSERT: u8 = 0;
const TAG_DELETE: u8 = 1;
const TAG_FORMAT: u8 = 2;
const TAG_SNAPSHOT: u8 = 3;
const TAG_MULTI: u8 = 6;
const TAG_REWIND: u8 = 7;
const TAG_SHOW: u8 = 8;

/// Insert a run of characters
///
/// The first character hangs from `parent` on `side`; each following
/// character is the right child of the one before it. Character `k` has
/// id `id.offset(k)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOp {
    pub id: Id,
    pub text: String,
    pub parent: Option<Id>,
    pub side: Side,
}

impl InsertOp {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn contains(&self, id: &Id) -> bool {
        id.author == self.id.author
            && id.seq >= self.id.seq
            && id.seq - self.id.seq < self.len() as u64
    }
}

/// Delete or show `span` characters with consecutive ids starting at `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkOp {
    pub id: Id,
    pub target: Id,
    pub span: usize,
}

impl MarkOp {
    pub fn targets(&self) -> impl Iterator<Item = Id> + '_ {
        (0..self.span).map(|i| self.target.offset(i))
    }
}

/// Apply a format to the inclusive total range `[start, end]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOp {
    pub id: Id,
    pub start: Id,
    pub end: Id,
    pub format: Format,
}

/// Restore a range to the state recorded by `address`
///
/// The inner ops are ordinary deletes, shows and formats; merging the
/// rewind is the same as merging them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewindOp {
    pub id: Id,
    pub address: ContentAddress,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert(InsertOp),
    Delete(MarkOp),
    Show(MarkOp),
    Format(FormatOp),
    /// Full op log of a document, in id order
    Snapshot(Vec<Operation>),
    Multi(Vec<Operation>),
    Rewind(RewindOp),
}

impl Operation {
    /// Identity of the operation; a multi op is known by its first op
    pub fn id(&self) -> Option<&Id> {
        match self {
            Operation::Insert(op) => Some(&op.id),
            Operation::Delete(op) | Operation::Show(op) => Some(&op.id),
            Operation::Format(op) => Some(&op.id),
            Operation::Rewind(op) => Some(&op.id),
            Operation::Multi(ops) => ops.first().and_then(|op| op.id()),
            Operation::Snapshot(_) => None,
        }
    }

    /// Highest sequence number minted by this operation
    pub fn max_seq(&self) -> Option<u64> {
        match self {
            Operation::Insert(op) => Some(op.id.seq.saturating_add(op.len().max(1) as u64 - 1)),
            Operation::Delete(op) | Operation::Show(op) => Some(op.id.seq),
            Operation::Format(op) => Some(op.id.seq),
            Operation::Rewind(op) => op
                .ops
                .iter()
                .filter_map(|o| o.max_seq())
                .chain(std::iter::once(op.id.seq))
                .max(),
            Operation::Multi(ops) | Operation::Snapshot(ops) => {
                ops.iter().filter_map(|o| o.max_seq()).max()
            }
        }
    }

    /// Collapse a list of ops into one, flattening nested multis
    pub fn from_ops(ops: Vec<Operation>) -> Option<Operation> {
        let mut flat = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                Operation::Multi(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Operation::Multi(flat)),
        }
    }

    /// Leaf operations in application order
    pub fn leaves(&self) -> Vec<&Operation> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Operation>) {
        match self {
            Operation::Multi(ops) | Operation::Snapshot(ops) => {
                for op in ops {
                    op.collect_leaves(out);
                }
            }
            Operation::Rewind(op) => {
                for inner in &op.ops {
                    inner.collect_leaves(out);
                }
            }
            leaf => out.push(leaf),
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Operation::Insert(op) => {
                let mut seq = serializer.serialize_seq(Some(5))?;
                seq.serialize_element(&TAG_INSERT)?;
                seq.serialize_element(&op.id)?;
                seq.serialize_element(&op.text)?;
                seq.serialize_element(&op.parent)?;
                seq.serialize_element(&op.side)?;
                seq.end()
            }
            Operation::Delete(op) | Operation::Show(op) => {
                let tag = if matches!(self, Operation::Delete(_)) {
                    TAG_DELETE
                } else {
                    TAG_SHOW
                };
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(&tag)?;
                seq.serialize_element(&op.id)?;
                seq.serialize_element(&op.target)?;
                seq.serialize_element(&op.span)?;
                seq.end()
            }
            Operation::Format(op) => {
                let mut seq = serializer.serialize_seq(Some(5))?;
                seq.serialize_element(&TAG_FORMAT)?;
                seq.serialize_element(&op.id)?;
                seq.serialize_element(&op.start)?;
                seq.serialize_element(&op.end)?;
                seq.serialize_element(&op.format)?;
                seq.end()
            }
            Operation::Snapshot(ops) | Operation::Multi(ops) => {
                let tag = if matches!(self, Operation::Snapshot(_)) {
                    TAG_SNAPSHOT
                } else {
                    TAG_MULTI
                };
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&tag)?;
                seq.serialize_element(ops)?;
                seq.end()
            }
            Operation::Rewind(op) => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(&TAG_REWIND)?;
                seq.serialize_element(&op.id)?;
                seq.serialize_element(&op.address)?;
                seq.serialize_element(&op.ops)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(OperationVisitor)
    }
}

struct OperationVisitor;

fn field<'de, A, T>(seq: &mut A, ix: usize) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(ix, &"a complete operation array"))
}

impl<'de> Visitor<'de> for OperationVisitor {
    type Value = Operation;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a tagged operation array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Operation, A::Error> {
        let tag: u8 = field(&mut seq, 0)?;
        let op = match tag {
            TAG_INSERT => Operation::Insert(InsertOp {
                id: field(&mut seq, 1)?,
                text: field(&mut seq, 2)?,
                parent: field(&mut seq, 3)?,
                side: field(&mut seq, 4)?,
            }),
            TAG_DELETE | TAG_SHOW => {
                let op = MarkOp {
                    id: field(&mut seq, 1)?,
                    target: field(&mut seq, 2)?,
                    span: field(&mut seq, 3)?,
                };
                if tag == TAG_DELETE {
                    Operation::Delete(op)
                } else {
                    Operation::Show(op)
                }
            }
            TAG_FORMAT => Operation::Format(FormatOp {
                id: field(&mut seq, 1)?,
                start: field(&mut seq, 2)?,
                end: field(&mut seq, 3)?,
                format: field(&mut seq, 4)?,
            }),
            TAG_SNAPSHOT => Operation::Snapshot(field(&mut seq, 1)?),
            TAG_MULTI => Operation::Multi(field(&mut seq, 1)?),
            TAG_REWIND => Operation::Rewind(RewindOp {
                id: field(&mut seq, 1)?,
                address: field(&mut seq, 2)?,
                ops: field(&mut seq, 3)?,
            }),
            other => {
                return Err(de::Error::custom(format!("unknown operation tag {}", other)));
            }
        };
        Ok(op)
    }
}

/// Visible change produced by applying an operation
///
/// Indices are visible offsets at the moment the action was produced, so
/// a view replaying actions in order stays in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Insert { index: usize, text: String },
    Delete { index: usize, count: usize },
    Format { index: usize, length: usize, format: Format },
}

/// Append an action, coalescing it with the previous one when contiguous
pub fn push_action(actions: &mut Vec<Action>, action: Action) {
    if let Some(last) = actions.last_mut() {
        match (last, &action) {
            (
                Action::Insert { index, text },
                Action::Insert {
                    index: next,
                    text: more,
                },
            ) if *index + text.chars().count() == *next => {
                text.push_str(more);
                return;
            }
            (
                Action::Delete { index, count },
                Action::Delete {
                    index: next,
                    count: more,
                },
            ) if *index == *next => {
                *count += more;
                return;
            }
            _ => {}
        }
    }
    actions.push(action);
}
