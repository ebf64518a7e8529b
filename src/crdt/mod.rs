//! CRDT building blocks for the replicated text sequence
//!
//! - [`id`]: character identity and the Lamport clock
//! - [`fugue`]: sibling tree deciding where concurrent inserts land
//! - [`rope`]: visible/total offset index over character slots
//! - [`history`]: delete/show markers per character
//! - [`op`], [`op_index`]: operations and the per-author op log
//! - [`address`]: version vectors over id ranges

pub mod address;
pub mod fugue;
pub mod history;
pub mod id;
pub mod op;
pub mod op_index;
pub mod rope;

pub use address::ContentAddress;
pub use id::{Id, LamportClock, Side};
pub use op::{Action, FormatOp, InsertOp, MarkOp, Operation, RewindOp};
pub use op_index::OpIndex;
