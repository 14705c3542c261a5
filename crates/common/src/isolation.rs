//! Isolation levels, locking hints and read modes understood by the store

use serde::{Deserialize, Serialize};

/// Read isolation of a store sub-transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Latest committed state; read locks are held until the transaction ends
    ReadRepeatable,
    /// Committed state as of the first snapshot read; no locks
    Snapshot,
}

/// Lock strength requested for reads under `ReadRepeatable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LockingHints {
    /// Shared read locks
    #[default]
    None,
    /// Update locks: compatible with readers, exclusive among updaters
    Update,
    /// Exclusive locks on read
    Exclusive,
}

/// Whether an enumeration materializes values or only keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadMode {
    /// Keys only
    Off,
    /// Keys and values
    ReadValue,
}

/// Caller-facing lock choice for single-entity reads such as peek
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Shared lock (or none on a secondary)
    #[default]
    Default,
    /// Update lock, so the read can be followed by a write without racing
    Update,
}
