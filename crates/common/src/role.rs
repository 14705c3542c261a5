//! Replica roles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of the local replica in its partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaRole {
    /// Role not yet assigned
    Unknown,
    /// Replica has been removed from the partition
    None,
    /// Accepts writes and takes locks
    Primary,
    /// Being built by copy, not yet readable
    IdleSecondary,
    /// Readable secondary; the store takes no locks here
    ActiveSecondary,
}

impl ReplicaRole {
    /// Whether this replica accepts writes
    pub fn is_primary(&self) -> bool {
        matches!(self, ReplicaRole::Primary)
    }

    /// Whether reads may be served from this replica
    pub fn is_readable(&self) -> bool {
        matches!(self, ReplicaRole::Primary | ReplicaRole::ActiveSecondary)
    }
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicaRole::Unknown => "unknown",
            ReplicaRole::None => "none",
            ReplicaRole::Primary => "primary",
            ReplicaRole::IdleSecondary => "idle-secondary",
            ReplicaRole::ActiveSecondary => "active-secondary",
        };
        f.write_str(name)
    }
}
