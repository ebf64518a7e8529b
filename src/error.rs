//! Error types for the rich-text engine
//!
//! Every fallible operation returns [`Result`]. Errors are plain values:
//! a rejected call leaves the document exactly as it was.

use crate::crdt::Id;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse classification of a [`SyncError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed call arguments, rejected before any mutation
    Validation,
    /// An ID or address that does not resolve against current state
    NotFound,
    /// Malformed markdown, HTML or wire input
    Parse,
    /// Internal consistency failure (tree shape, counts)
    Invariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Position {position} out of bounds (length: {length})")]
    PositionOutOfBounds { position: usize, length: usize },

    #[error("Range {start}..{end} out of bounds (length: {length})")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        length: usize,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("ID not found: {0}")]
    IdNotFound(Id),

    #[error("Address does not resolve: {0}")]
    AddressNotFound(String),

    #[error("Key extraction failed: {0}")]
    Key(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Scrub mode is not active")]
    ScrubInactive,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::PositionOutOfBounds { .. }
            | SyncError::RangeOutOfBounds { .. }
            | SyncError::InvalidArgument(_)
            | SyncError::Key(_)
            | SyncError::ScrubInactive => ErrorKind::Validation,
            SyncError::IdNotFound(_) | SyncError::AddressNotFound(_) => ErrorKind::NotFound,
            SyncError::Parse(_) | SyncError::Serialization(_) => ErrorKind::Parse,
            SyncError::Invariant(_) => ErrorKind::Invariant,
        }
    }

    /// True when the error only means a dependency has not arrived yet
    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, SyncError::IdNotFound(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = SyncError::PositionOutOfBounds {
            position: 10,
            length: 3,
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Position 10 out of bounds (length: 3)");

        let err = SyncError::IdNotFound(Id::new("alice", 4));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_missing_dependency());
        assert_eq!(err.to_string(), "ID not found: alice_4");

        assert_eq!(SyncError::ScrubInactive.kind(), ErrorKind::Validation);
        assert_eq!(SyncError::Invariant("x".into()).kind(), ErrorKind::Invariant);
    }

    #[test]
    fn test_from_serde_error() {
        let err: SyncError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
