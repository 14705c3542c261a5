//! Replica-local transaction factory
//!
//! The replicator hands out transaction ids, remembers the replica role each
//! transaction was created under and tracks the current role. It does not
//! replicate anything itself.

use crate::error::{ReplicatorError, Result};
use crate::transaction::Transaction;
use parking_lot::RwLock;
use reliable_common::{ReplicaRole, TransactionId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Creates transactions and tracks the replica role
pub struct Replicator {
    /// Identifier of this replica, used in log fields
    replica_id: String,

    /// Current role of the replica
    role: RwLock<ReplicaRole>,

    /// Set once the replicator has been closed
    closed: AtomicBool,

    /// Next transaction id to hand out
    next_txn: AtomicU64,
}

impl Replicator {
    /// Create a new replicator in the given role
    pub fn new(replica_id: impl Into<String>, role: ReplicaRole) -> Self {
        Self {
            replica_id: replica_id.into(),
            role: RwLock::new(role),
            closed: AtomicBool::new(false),
            next_txn: AtomicU64::new(1),
        }
    }

    /// Identifier of this replica
    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Current role
    pub fn role(&self) -> ReplicaRole {
        *self.role.read()
    }

    /// Whether the replicator has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Begin a new outer transaction
    ///
    /// The transaction records whether the replica was primary at this
    /// moment; later role changes do not affect it.
    pub fn begin_transaction(&self) -> Result<Transaction> {
        if self.is_closed() {
            return Err(ReplicatorError::Closed);
        }

        let role = self.role();
        if !role.is_readable() {
            return Err(ReplicatorError::NotReadable(role));
        }

        let id = TransactionId::new(self.next_txn.fetch_add(1, Ordering::Relaxed));
        tracing::debug!("Began {} on {} as {}", id, self.replica_id, role);

        Ok(Transaction::new(id, role.is_primary()))
    }

    /// Change the replica role
    pub fn change_role(&self, new_role: ReplicaRole) {
        let mut role = self.role.write();
        if *role != new_role {
            tracing::info!("Replica {} changing role {} -> {}", self.replica_id, *role, new_role);
            *role = new_role;
        }
    }

    /// Close the replicator; no further transactions can be started
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Replica {} closed", self.replica_id);
        }
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("replica_id", &self.replica_id)
            .field("role", &self.role())
            .field("closed", &self.is_closed())
            .finish()
    }
}
