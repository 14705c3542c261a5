//! Common types for reliable collections
//!
//! This crate defines:
//! - Transaction ids handed out by the replicator
//! - Replica roles
//! - Isolation levels, locking hints and read modes understood by the store
//! - Per-call options (timeout and cancellation)

mod isolation;
mod options;
mod role;
mod transaction_id;

pub use isolation::{IsolationLevel, LockMode, LockingHints, ReadMode};
pub use options::{DEFAULT_TIMEOUT, OperationOptions};
pub use role::ReplicaRole;
pub use transaction_id::TransactionId;

/// Row identifier used as the key of every queue store
pub type RowId = i64;
