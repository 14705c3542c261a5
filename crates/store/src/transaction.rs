//! Store sub-transactions
//!
//! A `StoreTransaction` is one store's view of an outer `Transaction`. It is
//! shared between every caller that asks the store for the same outer
//! transaction, so isolation and locking hints set by one caller are seen by
//! the next. It only holds the outer transaction weakly; the store is a
//! participant of that transaction and must not keep it alive.

use parking_lot::Mutex;
use reliable_common::{IsolationLevel, LockingHints, TransactionId};
use reliable_replicator::{Transaction, TransactionState, WeakTransaction};
use std::fmt;
use std::sync::Arc;

struct StoreTransactionInner {
    store_name: String,
    outer: WeakTransaction,
    isolation: Mutex<IsolationLevel>,
    locking_hints: Mutex<LockingHints>,

    /// Commit sequence pinned by the first snapshot read
    snapshot_seq: Mutex<Option<u64>>,
}

/// Handle to a store sub-transaction, cheap to clone
#[derive(Clone)]
pub struct StoreTransaction {
    inner: Arc<StoreTransactionInner>,
}

impl StoreTransaction {
    /// Create a sub-transaction of `outer` for the named store
    ///
    /// Starts read-repeatable on a primary transaction and snapshot otherwise.
    pub fn new(store_name: impl Into<String>, outer: &Transaction) -> Self {
        let isolation = if outer.is_primary_transaction() {
            IsolationLevel::ReadRepeatable
        } else {
            IsolationLevel::Snapshot
        };

        Self {
            inner: Arc::new(StoreTransactionInner {
                store_name: store_name.into(),
                outer: outer.downgrade(),
                isolation: Mutex::new(isolation),
                locking_hints: Mutex::new(LockingHints::None),
                snapshot_seq: Mutex::new(None),
            }),
        }
    }

    /// Id of the outer transaction
    pub fn id(&self) -> TransactionId {
        self.inner.outer.id()
    }

    pub fn store_name(&self) -> &str {
        &self.inner.store_name
    }

    /// The outer transaction this belongs to, unless it was dropped
    pub fn outer(&self) -> Option<Transaction> {
        self.inner.outer.upgrade()
    }

    /// State of the outer transaction; a dropped one counts as aborted
    pub fn outer_state(&self) -> TransactionState {
        self.outer()
            .map_or(TransactionState::Aborted, |outer| outer.state())
    }

    /// Whether the outer transaction was created on a primary replica
    pub fn is_primary_transaction(&self) -> bool {
        self.inner.outer.is_primary_transaction()
    }

    pub fn isolation(&self) -> IsolationLevel {
        *self.inner.isolation.lock()
    }

    pub fn set_isolation(&self, isolation: IsolationLevel) {
        *self.inner.isolation.lock() = isolation;
    }

    pub fn locking_hints(&self) -> LockingHints {
        *self.inner.locking_hints.lock()
    }

    pub fn set_locking_hints(&self, hints: LockingHints) {
        *self.inner.locking_hints.lock() = hints;
    }

    /// Commit sequence pinned for snapshot reads, if any read happened yet
    pub fn snapshot_seq(&self) -> Option<u64> {
        *self.inner.snapshot_seq.lock()
    }

    /// Pinned snapshot sequence, pinning one with `pin` on first use
    pub(crate) fn snapshot_seq_or_pin(&self, pin: impl FnOnce() -> u64) -> u64 {
        *self.inner.snapshot_seq.lock().get_or_insert_with(pin)
    }

    /// Whether two handles refer to the same sub-transaction
    pub fn ptr_eq(&self, other: &StoreTransaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for StoreTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTransaction")
            .field("store", &self.inner.store_name)
            .field("id", &self.id())
            .field("isolation", &self.isolation())
            .field("locking_hints", &self.locking_hints())
            .finish()
    }
}
