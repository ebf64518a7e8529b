//! SyncKit Rich Text - replicated rich-text document engine
//!
//! This is a rich-text CRDT compiled to both native and WASM. It
//! implements:
//! - A Fugue-style sibling tree with an order-statistic rope for positions
//! - An operation log with commutative, idempotent merge
//! - Span and line formats with HTML and markdown rendering
//! - Content addresses, historical rendering, diffs and rewind
//! - Undo/redo and read-only history scrubbing
//! - A markdown bridge for paste and rewrite
//!
//! # Examples
//!
//! ```rust
//! use synckit_richtext::{Document, Format};
//!
//! let mut doc = Document::new("alice");
//! doc.insert(0, "Hello World\n").unwrap();
//! doc.format(0, 5, Format::span([("b", "true")])).unwrap();
//! assert_eq!(
//!     doc.get_full_html(false).unwrap(),
//!     "<p><strong>Hello</strong><span> World</span></p>"
//! );
//! ```

pub mod crdt;
pub mod document;
pub mod error;
pub mod format;
pub mod index;
pub mod markdown;
pub mod render;
pub mod stats;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use crdt::{Action, ContentAddress, Id, Operation};
pub use document::{Document, DocumentConfig};
pub use error::{Result, SyncError};
pub use format::{Format, LineFormat, SpanFormat};
pub use stats::{DocStats, OpStats};
