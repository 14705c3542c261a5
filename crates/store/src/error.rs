//! Error types for the transactional store

use reliable_common::RowId;
use reliable_replicator::ReplicatorError;
use thiserror::Error;

/// How a caller should treat a store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Legitimate outcome while the replica shuts down, loses primary status
    /// or the caller gives up; nothing is wrong with the data
    ExpectedTerminal,
    /// Retriable pressure on the replication pipeline
    Transient,
    /// Anything else; indicates a broken invariant or a programming error
    Unexpected,
}

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Replica is not primary")]
    NotPrimary,

    #[error("Store {0} is closed")]
    Closed(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,

    #[error("Replication queue is full")]
    ReplicationQueueFull,

    #[error("Key {0} already exists")]
    KeyExists(RowId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store is not readable")]
    NotReadable,

    #[error("Replication operation too large")]
    OperationTooLarge,

    #[error("Replicator error: {0}")]
    Replicator(#[from] ReplicatorError),
}

impl StoreError {
    /// Classify this error
    pub fn class(&self) -> FailureClass {
        match self {
            StoreError::NotPrimary
            | StoreError::Closed(_)
            | StoreError::InvalidOperation(_)
            | StoreError::Cancelled => FailureClass::ExpectedTerminal,
            StoreError::ReplicationQueueFull | StoreError::Timeout => FailureClass::Transient,
            StoreError::KeyExists(_)
            | StoreError::InvalidArgument(_)
            | StoreError::NotReadable
            | StoreError::OperationTooLarge
            | StoreError::Replicator(_) => FailureClass::Unexpected,
        }
    }

    pub fn is_expected_terminal(&self) -> bool {
        self.class() == FailureClass::ExpectedTerminal
    }

    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
