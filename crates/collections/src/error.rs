//! Error types for reliable collections

use reliable_common::TransactionId;
use reliable_replicator::ReplicatorError;
use reliable_store::{FailureClass, StoreError};
use std::fmt;
use thiserror::Error;

/// Queue operation named in errors and log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOperation {
    Enqueue,
    Dequeue,
    Peek,
    Count,
    Enumerate,
    Clear,
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueOperation::Enqueue => "enqueue",
            QueueOperation::Dequeue => "dequeue",
            QueueOperation::Peek => "peek",
            QueueOperation::Count => "count",
            QueueOperation::Enumerate => "enumerate",
            QueueOperation::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Queue error types
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue has not been registered")]
    NotRegistered,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Pointer write hit replication back-pressure; the data write was undone
    #[error("{operation} failed with a transient replication error: {source}")]
    ReplicationTransient {
        operation: QueueOperation,
        source: StoreError,
    },

    /// Pointer write failed and undoing the data write failed too; the outer
    /// transaction has been aborted
    #[error("{operation} compensation failed in {txn}: {compensation} (after {original})")]
    CompensationFailed {
        operation: QueueOperation,
        txn: TransactionId,
        original: StoreError,
        #[source]
        compensation: StoreError,
    },

    /// The two stores disagree; the outer transaction has been aborted
    #[error("Queue invariant violated during {operation}: {reason}")]
    InvariantViolation {
        operation: QueueOperation,
        reason: String,
    },

    #[error("Replicator error: {0}")]
    Replicator(#[from] ReplicatorError),

    #[error("Invalid initialization context: {0}")]
    InitializationContext(String),

    #[error("Child store {name} was not supplied")]
    MissingChildStore { name: String },

    #[error("State provider {name} is registered with a different type")]
    TypeMismatch { name: String },
}

impl QueueError {
    /// The store error a caller should act on
    ///
    /// For a failed compensation this is the original error when the
    /// compensation only failed because the replica is going away, and the
    /// compensation error otherwise.
    pub fn surfaced(&self) -> Option<&StoreError> {
        match self {
            QueueError::Store(e) | QueueError::ReplicationTransient { source: e, .. } => Some(e),
            QueueError::CompensationFailed {
                original,
                compensation,
                ..
            } => {
                if compensation.class() == FailureClass::ExpectedTerminal {
                    Some(original)
                } else {
                    Some(compensation)
                }
            }
            _ => None,
        }
    }

    /// Whether retrying the operation in a new transaction may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::ReplicationTransient { .. } => true,
            QueueError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, QueueError::InvariantViolation { .. })
    }
}

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surfaced_prefers_original_when_compensation_is_terminal() {
        let err = QueueError::CompensationFailed {
            operation: QueueOperation::Enqueue,
            txn: TransactionId::new(1),
            original: StoreError::ReplicationQueueFull,
            compensation: StoreError::NotPrimary,
        };

        assert!(matches!(err.surfaced(), Some(StoreError::ReplicationQueueFull)));
    }

    #[test]
    fn test_surfaced_prefers_compensation_error_otherwise() {
        let err = QueueError::CompensationFailed {
            operation: QueueOperation::Dequeue,
            txn: TransactionId::new(1),
            original: StoreError::Timeout,
            compensation: StoreError::OperationTooLarge,
        };

        assert!(matches!(err.surfaced(), Some(StoreError::OperationTooLarge)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        let err = QueueError::ReplicationTransient {
            operation: QueueOperation::Enqueue,
            source: StoreError::ReplicationQueueFull,
        };
        assert!(err.is_transient());
        assert!(QueueError::Store(StoreError::Timeout).is_transient());
        assert!(!QueueError::NotRegistered.is_transient());
        assert_eq!(QueueOperation::Dequeue.to_string(), "dequeue");
    }
}
