//! Transaction identifier
//!
//! Ids are handed out by the replicator that creates the transaction and are
//! strictly increasing per replicator. Lock conflict reports and log lines use
//! the numeric order to show which transaction came first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an outer (replicator) transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Create an id from its raw sequence number
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw sequence number
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Convert to bytes (8 bytes, big-endian)
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parse from bytes
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl From<u64> for TransactionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}
