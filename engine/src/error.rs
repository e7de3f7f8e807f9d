//! Error types for the Tidy engine.

use crate::{EntityKind, ObjectId};
use thiserror::Error;

/// All possible errors from the Tidy engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: ObjectId },

    // Integrity errors
    #[error("{kind} {id} references missing {parent_kind} {parent_id}")]
    DanglingReference {
        kind: EntityKind,
        id: ObjectId,
        parent_kind: EntityKind,
        parent_id: ObjectId,
    },

    #[error("commit conflict: {0}")]
    Conflict(String),

    // Argument errors
    #[error("retention of {days} days is out of range")]
    RetentionOutOfRange { days: i64 },

    // Store errors
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
