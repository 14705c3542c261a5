//! Replicator transactions
//!
//! A `Transaction` is the outer, user-visible unit of work. Stores enlist
//! themselves as participants the first time they see the transaction and are
//! committed or aborted together with it. A transaction whose last handle is
//! dropped while still active is abandoned: every participant discards its
//! work and releases its locks.

use crate::error::{ReplicatorError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reliable_common::TransactionId;
use std::fmt;
use std::sync::{Arc, Weak};

/// Transaction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and accepting operations
    Active,
    /// Commit has started
    Committing,
    /// Transaction has been committed
    Committed,
    /// Abort has started
    Aborting,
    /// Transaction has been aborted
    Aborted,
}

/// A resource that takes part in an outer transaction
#[async_trait]
pub trait TransactionParticipant: Send + Sync {
    /// Unique name of the participant (used to deduplicate enlistment)
    fn name(&self) -> &str;

    /// Make the transaction's changes visible and release its locks
    async fn commit(&self, txn_id: TransactionId) -> Result<()>;

    /// Discard the transaction's changes and release its locks
    async fn abort(&self, txn_id: TransactionId) -> Result<()>;

    /// Same as `abort`, for a transaction dropped while still active
    ///
    /// Runs inside `Drop`, so it must not block or await.
    fn abandon(&self, txn_id: TransactionId);
}

struct TransactionInner {
    id: TransactionId,

    /// Replica role at creation time, not the current role
    created_as_primary: bool,

    state: Mutex<TransactionState>,

    /// Enlisted participants in enlistment order
    participants: Mutex<Vec<Arc<dyn TransactionParticipant>>>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if state != TransactionState::Active {
            return;
        }

        let participants = std::mem::take(self.participants.get_mut());
        tracing::warn!(
            "{} dropped while active, abandoning {} participants",
            self.id,
            participants.len()
        );
        for participant in participants {
            participant.abandon(self.id);
        }
    }
}

/// Outer transaction handle, cheap to clone
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

/// Handle that does not keep a transaction alive
///
/// Participants hold these so that dropping every `Transaction` handle still
/// abandons the transaction.
#[derive(Clone)]
pub struct WeakTransaction {
    id: TransactionId,
    created_as_primary: bool,
    inner: Weak<TransactionInner>,
}

impl WeakTransaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn is_primary_transaction(&self) -> bool {
        self.created_as_primary
    }

    /// The transaction, unless every handle to it was dropped
    pub fn upgrade(&self) -> Option<Transaction> {
        self.inner.upgrade().map(|inner| Transaction { inner })
    }
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, created_as_primary: bool) -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                id,
                created_as_primary,
                state: Mutex::new(TransactionState::Active),
                participants: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get the transaction ID
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakTransaction {
        WeakTransaction {
            id: self.inner.id,
            created_as_primary: self.inner.created_as_primary,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether the replica was primary when this transaction was created
    pub fn is_primary_transaction(&self) -> bool {
        self.inner.created_as_primary
    }

    /// Get the current transaction state
    pub fn state(&self) -> TransactionState {
        *self.inner.state.lock()
    }

    /// Whether the transaction still accepts operations
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Names of the enlisted participants, in enlistment order
    pub fn participants(&self) -> Vec<String> {
        self.inner
            .participants
            .lock()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Enlist a participant; enlisting the same name twice is a no-op
    pub fn enlist(&self, participant: Arc<dyn TransactionParticipant>) -> Result<()> {
        let state = self.inner.state.lock();
        if *state != TransactionState::Active {
            return Err(ReplicatorError::InvalidState(format!(
                "Cannot enlist {} in transaction {} in state {:?}",
                participant.name(),
                self.inner.id,
                *state
            )));
        }

        let mut participants = self.inner.participants.lock();
        if participants.iter().all(|p| p.name() != participant.name()) {
            participants.push(participant);
        }

        Ok(())
    }

    /// Commit this transaction
    ///
    /// If a participant fails to commit, the participants that have not
    /// committed yet are aborted and the transaction ends up `Aborted`.
    pub async fn commit(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != TransactionState::Active {
                return Err(ReplicatorError::InvalidState(format!(
                    "Cannot commit transaction {} in state {:?}",
                    self.inner.id, *state
                )));
            }
            *state = TransactionState::Committing;
        }

        let participants = self.inner.participants.lock().clone();

        for (index, participant) in participants.iter().enumerate() {
            if let Err(e) = participant.commit(self.inner.id).await {
                tracing::error!(
                    "Commit of {} failed for {}: {}",
                    self.inner.id,
                    participant.name(),
                    e
                );

                *self.inner.state.lock() = TransactionState::Aborting;
                for remaining in &participants[index + 1..] {
                    if let Err(abort_err) = remaining.abort(self.inner.id).await {
                        tracing::error!(
                            "Abort of {} failed for {}: {}",
                            self.inner.id,
                            remaining.name(),
                            abort_err
                        );
                    }
                }
                *self.inner.state.lock() = TransactionState::Aborted;

                return Err(e);
            }
        }

        *self.inner.state.lock() = TransactionState::Committed;
        tracing::debug!("Committed {} across {} stores", self.inner.id, participants.len());

        Ok(())
    }

    /// Abort this transaction
    ///
    /// Aborting an already aborted transaction succeeds.
    pub async fn abort(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                TransactionState::Aborted | TransactionState::Aborting => return Ok(()),
                TransactionState::Committed | TransactionState::Committing => {
                    return Err(ReplicatorError::InvalidState(format!(
                        "Cannot abort transaction {} in state {:?}",
                        self.inner.id, *state
                    )));
                }
                TransactionState::Active => *state = TransactionState::Aborting,
            }
        }

        let participants = self.inner.participants.lock().clone();

        let mut first_error = None;
        for participant in &participants {
            if let Err(e) = participant.abort(self.inner.id).await {
                tracing::error!(
                    "Abort of {} failed for {}: {}",
                    self.inner.id,
                    participant.name(),
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        *self.inner.state.lock() = TransactionState::Aborted;
        tracing::debug!("Aborted {}", self.inner.id);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("created_as_primary", &self.inner.created_as_primary)
            .field("state", &self.state())
            .finish()
    }
}
