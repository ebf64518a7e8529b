//! Generic ordered containers: the balanced [`Tree`] and the merge [`Heap`]

mod avl;
mod heap;
mod tree;

pub(crate) use avl::{AvlArena, Links};
pub use heap::{Heap, HeapOrder, Natural};
pub use tree::{Handle, Iter, KeyOrder, Tree};
