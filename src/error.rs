//! Error taxonomy for the store and the session lifecycle
//!
//! Every failure is returned to the immediate caller as a typed error.
//! None of these corrupt other cells or tear down the engine; transport
//! failures are handled separately by the session as a disconnect.

use thiserror::Error;

use crate::schema::ValueId;

/// Errors from value store operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Operation referenced an id that was never registered in the schema
    #[error("unknown value id {0}")]
    UnknownValueId(ValueId),

    /// Written value (or addressed cell) does not match the type bound at registration
    #[error("value {id}: type mismatch, expected {expected}, got {got}")]
    TypeMismatch {
        id: ValueId,
        expected: String,
        got: String,
    },

    /// Dict item operation on an absent key
    #[error("dict {id}: key not found")]
    KeyNotFound { id: ValueId },

    /// List item operation outside the current bounds
    #[error("list {id}: index {index} out of range (len {len})")]
    IndexOutOfRange {
        id: ValueId,
        index: usize,
        len: usize,
    },

    /// Buffer write whose dimensions are incompatible with the cell contents
    #[error("buffer {id}: shape mismatch: {reason}")]
    ShapeMismatch { id: ValueId, reason: String },

    /// Inbound peer patch that this cell kind does not accept
    #[error("value {id}: inbound patch not supported for this cell")]
    UnsupportedPatch { id: ValueId },
}

/// Errors from session lifecycle misuse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `start` called while the session is already running
    #[error("session is already running")]
    AlreadyRunning,

    /// Lifecycle operation that requires a running session
    #[error("session is not running")]
    NotRunning,

    /// Operation that requires an attached peer
    #[error("no peer is connected")]
    NotConnected,

    /// The peer reader thread could not be spawned
    #[error("spawn peer reader: {0}")]
    Spawn(String),
}

/// Errors from schema construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The same id was registered twice
    #[error("value id {0} is already registered")]
    DuplicateValueId(ValueId),

    /// Ids below the reserved range belong to the engine
    #[error("value id {0} is reserved for system use")]
    ReservedValueId(ValueId),
}
