//! Error types for the replicator

use reliable_common::ReplicaRole;
use thiserror::Error;

/// Replicator error types
#[derive(Debug, Error)]
pub enum ReplicatorError {
    #[error("Replicator is closed")]
    Closed,

    #[error("Replica is not readable in role {0}")]
    NotReadable(ReplicaRole),

    #[error("Invalid transaction state: {0}")]
    InvalidState(String),

    #[error("Participant {name} failed: {reason}")]
    Participant { name: String, reason: String },
}

/// Result type for replicator operations
pub type Result<T> = std::result::Result<T, ReplicatorError>;
