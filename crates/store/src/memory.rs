//! In-memory transactional store
//!
//! Rows live in a `VersionStore`; read-repeatable reads and all writes take
//! row locks from a `LockManager` that are held until the outer transaction
//! ends. A request that conflicts waits for locks to be released, bounded by
//! the call's timeout and cancellation token.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::lock::{KeyLockMode, LockAttemptResult, LockManager};
use crate::mvcc::{ReadView, VersionStore};
use crate::store::{StoreCursor, TransactionalStore};
use crate::transaction::StoreTransaction;
use async_trait::async_trait;
use parking_lot::Mutex;
use reliable_common::{IsolationLevel, OperationOptions, ReadMode, RowId, TransactionId};
use reliable_replicator::{Replicator, Transaction, TransactionParticipant, TransactionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Mutable state guarded by one mutex
struct StoreState<V> {
    versions: VersionStore<V>,
    locks: LockManager,

    /// Sub-transactions of outer transactions that have not finished
    transactions: HashMap<TransactionId, StoreTransaction>,
}

struct StoreInner<V> {
    name: String,
    replicator: Arc<Replicator>,
    config: StoreConfig,
    state: Mutex<StoreState<V>>,

    /// Woken whenever locks are released or the store closes
    lock_released: Notify,

    closed: AtomicBool,
}

/// In-memory MVCC store, cheap to clone
pub struct MemoryStore<V> {
    inner: Arc<StoreInner<V>>,
}

impl<V> Clone for MemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a store with default configuration
    pub fn new(name: impl Into<String>, replicator: Arc<Replicator>) -> Self {
        Self::with_config(name, replicator, StoreConfig::default())
    }

    /// Create a store with custom configuration
    pub fn with_config(
        name: impl Into<String>,
        replicator: Arc<Replicator>,
        config: StoreConfig,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                name: name.into(),
                replicator,
                config,
                state: Mutex::new(StoreState {
                    versions: VersionStore::new(),
                    locks: LockManager::new(),
                    transactions: HashMap::new(),
                }),
                lock_released: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Close the store; pending lock waits fail with `Closed`
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Store {} closed", self.inner.name);
            self.inner.lock_released.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of stored row versions, including retired ones
    pub fn version_count(&self) -> usize {
        self.inner.state.lock().versions.version_count()
    }

    /// Number of outer transactions with an open sub-transaction here
    pub fn active_transactions(&self) -> usize {
        self.inner.state.lock().transactions.len()
    }

    /// Locks currently held by a transaction
    pub fn locks_held_by(&self, txn_id: TransactionId) -> Vec<(RowId, KeyLockMode)> {
        self.inner.state.lock().locks.locks_held_by(txn_id)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed(self.inner.name.clone()));
        }
        Ok(())
    }

    fn check_active(&self, txn: &StoreTransaction) -> Result<()> {
        let state = txn.outer_state();
        if state != TransactionState::Active {
            return Err(StoreError::InvalidOperation(format!(
                "{} is {:?}",
                txn.id(),
                state
            )));
        }
        Ok(())
    }

    fn check_readable(&self, txn: &StoreTransaction, options: &OperationOptions) -> Result<()> {
        self.check_open()?;
        if !self.inner.replicator.role().is_readable() {
            return Err(StoreError::NotReadable);
        }
        self.check_active(txn)?;
        if options.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    fn check_writable(&self, txn: &StoreTransaction, options: &OperationOptions) -> Result<()> {
        self.check_open()?;
        if !self.inner.replicator.role().is_primary() || !txn.is_primary_transaction() {
            return Err(StoreError::NotPrimary);
        }
        self.check_active(txn)?;
        if options.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    /// Whether reads of this transaction take locks
    fn takes_locks(&self, txn: &StoreTransaction) -> bool {
        self.inner.replicator.role().is_primary() && txn.is_primary_transaction()
    }

    fn read_view(state: &mut StoreState<V>, txn: &StoreTransaction) -> ReadView {
        match txn.isolation() {
            IsolationLevel::ReadRepeatable => ReadView::latest(txn.id()),
            IsolationLevel::Snapshot => {
                let seq = txn.snapshot_seq_or_pin(|| state.versions.register_snapshot());
                ReadView::snapshot(txn.id(), seq)
            }
        }
    }

    /// Acquire a row lock, waiting for conflicting holders to finish
    async fn acquire(
        &self,
        txn_id: TransactionId,
        key: RowId,
        mode: KeyLockMode,
        options: &OperationOptions,
    ) -> Result<()> {
        let deadline = Instant::now().checked_add(options.timeout);

        loop {
            // Register for wakeups before looking, so a release between the
            // check and the wait is not missed
            let notified = self.inner.lock_released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                self.check_open()?;

                match state.locks.check(txn_id, key, mode) {
                    LockAttemptResult::WouldGrant => {
                        state.locks.grant(txn_id, key, mode);
                        return Ok(());
                    }
                    LockAttemptResult::Conflict { holders } => {
                        tracing::trace!(
                            "{} waiting for {:?} on {}:{} held by {:?}",
                            txn_id,
                            mode,
                            self.inner.name,
                            key,
                            holders
                        );
                    }
                }
            }

            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = expired => {
                    tracing::debug!(
                        "{} timed out waiting for {:?} on {}:{}",
                        txn_id,
                        mode,
                        self.inner.name,
                        key
                    );
                    return Err(StoreError::Timeout);
                }
                _ = options.cancellation.cancelled() => return Err(StoreError::Cancelled),
            }
        }
    }

    /// Keys visible to `txn` under its current isolation
    fn visible_keys(&self, txn: &StoreTransaction, ordered: bool) -> Result<Vec<RowId>> {
        self.check_readable(txn, &OperationOptions::default())?;

        let mut keys = {
            let mut state = self.inner.state.lock();
            let view = Self::read_view(&mut state, txn);
            state.versions.keys(&view)
        };

        if ordered {
            let comparer = &self.inner.config.comparer;
            keys.sort_by(|a, b| comparer.compare(a, b));
        }

        Ok(keys)
    }

    /// End a sub-transaction and wake lock waiters
    fn finish(&self, txn_id: TransactionId, commit: bool) {
        {
            let mut state = self.inner.state.lock();
            let txn = state.transactions.remove(&txn_id);

            if commit {
                let seq = state.versions.commit(txn_id);
                tracing::trace!("Store {} committed {} at seq {}", self.inner.name, txn_id, seq);
            } else {
                state.versions.abort(txn_id);
            }

            if let Some(seq) = txn.and_then(|t| t.snapshot_seq()) {
                state.versions.release_snapshot(seq);
            }
            state.locks.release_all(txn_id);

            if self.inner.config.prune_versions {
                state.versions.prune();
            }
        }

        self.inner.lock_released.notify_waiters();
    }
}

#[async_trait]
impl<V> TransactionalStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn create_or_find_transaction(&self, txn: &Transaction) -> Result<StoreTransaction> {
        self.check_open()?;

        if let Some(existing) = self.inner.state.lock().transactions.get(&txn.id()) {
            return Ok(existing.clone());
        }

        txn.enlist(Arc::new(self.clone()))?;

        let mut state = self.inner.state.lock();
        let store_txn = state
            .transactions
            .entry(txn.id())
            .or_insert_with(|| StoreTransaction::new(self.inner.name.clone(), txn))
            .clone();

        Ok(store_txn)
    }

    async fn get(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        options: &OperationOptions,
    ) -> Result<Option<V>> {
        self.check_readable(txn, options)?;

        if txn.isolation() == IsolationLevel::ReadRepeatable && self.takes_locks(txn) {
            let mode = KeyLockMode::for_read(txn.locking_hints());
            self.acquire(txn.id(), key, mode, options).await?;
        }

        let mut state = self.inner.state.lock();
        let view = Self::read_view(&mut state, txn);
        Ok(state.versions.get(key, &view).cloned())
    }

    async fn add(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        value: V,
        options: &OperationOptions,
    ) -> Result<()> {
        self.check_writable(txn, options)?;
        self.acquire(txn.id(), key, KeyLockMode::Exclusive, options)
            .await?;

        let mut state = self.inner.state.lock();
        if state.versions.exists(key, &ReadView::latest(txn.id())) {
            return Err(StoreError::KeyExists(key));
        }
        state.versions.put(key, value, txn.id());

        Ok(())
    }

    async fn remove(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        options: &OperationOptions,
    ) -> Result<Option<V>> {
        self.check_writable(txn, options)?;
        self.acquire(txn.id(), key, KeyLockMode::Exclusive, options)
            .await?;

        let mut state = self.inner.state.lock();
        Ok(state.versions.delete(key, txn.id()))
    }

    async fn upsert(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        comparison: V,
        new_value: V,
        options: &OperationOptions,
    ) -> Result<V> {
        self.check_writable(txn, options)?;
        self.acquire(txn.id(), key, KeyLockMode::Exclusive, options)
            .await?;

        let mut state = self.inner.state.lock();
        let value = if state.versions.exists(key, &ReadView::latest(txn.id())) {
            new_value
        } else {
            comparison
        };
        state.versions.put(key, value.clone(), txn.id());

        Ok(value)
    }

    fn create_enumerable(
        &self,
        txn: &StoreTransaction,
        ordered: bool,
        read_mode: ReadMode,
    ) -> Result<Box<dyn StoreCursor<V>>> {
        self.check_readable(txn, &OperationOptions::default())?;

        Ok(Box::new(MemoryCursor {
            store: self.clone(),
            txn: txn.clone(),
            ordered,
            read_mode,
            keys: None,
            position: 0,
        }))
    }
}

#[async_trait]
impl<V> TransactionParticipant for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn commit(&self, txn_id: TransactionId) -> reliable_replicator::Result<()> {
        self.finish(txn_id, true);
        Ok(())
    }

    async fn abort(&self, txn_id: TransactionId) -> reliable_replicator::Result<()> {
        self.finish(txn_id, false);
        Ok(())
    }

    fn abandon(&self, txn_id: TransactionId) {
        tracing::debug!("Store {} abandoning {}", self.inner.name, txn_id);
        self.finish(txn_id, false);
    }
}

/// Cursor over a `MemoryStore`
///
/// Keys are taken on the first `next` under the sub-transaction's isolation at
/// that moment; values are read one at a time under whatever isolation the
/// sub-transaction has when each is read.
struct MemoryCursor<V> {
    store: MemoryStore<V>,
    txn: StoreTransaction,
    ordered: bool,
    read_mode: ReadMode,
    keys: Option<Vec<RowId>>,
    position: usize,
}

#[async_trait]
impl<V> StoreCursor<V> for MemoryCursor<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Result<Option<(RowId, Option<V>)>> {
        if self.keys.is_none() {
            self.keys = Some(self.store.visible_keys(&self.txn, self.ordered)?);
        }

        loop {
            let Some(key) = self
                .keys
                .as_ref()
                .and_then(|keys| keys.get(self.position))
                .copied()
            else {
                return Ok(None);
            };
            self.position += 1;

            match self.read_mode {
                ReadMode::Off => return Ok(Some((key, None))),
                ReadMode::ReadValue => {
                    let options = OperationOptions::default();
                    if let Some(value) = self.store.get(&self.txn, key, &options).await? {
                        return Ok(Some((key, Some(value))));
                    }
                    // Removed since the keys were taken
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reliable_common::{LockingHints, ReplicaRole};
    use std::time::Duration;

    fn primary() -> Arc<Replicator> {
        Arc::new(Replicator::new("test-replica", ReplicaRole::Primary))
    }

    fn quick() -> OperationOptions {
        OperationOptions::new(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_add_then_get_within_transaction() {
        let store = MemoryStore::new("data", primary());
        let replicator = store.inner.replicator.clone();

        let txn = replicator.begin_transaction().unwrap();
        let st = store.create_or_find_transaction(&txn).unwrap();

        store.add(&st, 1, "a".to_string(), &quick()).await.unwrap();
        assert_eq!(store.get(&st, 1, &quick()).await.unwrap().as_deref(), Some("a"));

        assert!(matches!(
            store.add(&st, 1, "b".to_string(), &quick()).await,
            Err(StoreError::KeyExists(1))
        ));
    }

    #[tokio::test]
    async fn test_create_or_find_is_idempotent() {
        let store: MemoryStore<i64> = MemoryStore::new("meta", primary());
        let txn = store.inner.replicator.begin_transaction().unwrap();

        let first = store.create_or_find_transaction(&txn).unwrap();
        let second = store.create_or_find_transaction(&txn).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(txn.participants(), vec!["meta".to_string()]);
        assert_eq!(store.active_transactions(), 1);

        txn.commit().await.unwrap();
        assert_eq!(store.active_transactions(), 0);
    }

    #[tokio::test]
    async fn test_hinted_read_takes_update_lock() {
        let store: MemoryStore<i64> = MemoryStore::new("meta", primary());
        let txn = store.inner.replicator.begin_transaction().unwrap();
        let st = store.create_or_find_transaction(&txn).unwrap();

        st.set_locking_hints(LockingHints::Update);
        store.get(&st, 5, &quick()).await.unwrap();

        assert_eq!(store.locks_held_by(txn.id()), vec![(5, KeyLockMode::Update)]);

        txn.abort().await.unwrap();
        assert!(store.locks_held_by(txn.id()).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_read_takes_no_locks() {
        let store: MemoryStore<i64> = MemoryStore::new("meta", primary());
        let txn = store.inner.replicator.begin_transaction().unwrap();
        let st = store.create_or_find_transaction(&txn).unwrap();

        st.set_isolation(IsolationLevel::Snapshot);
        store.get(&st, 5, &quick()).await.unwrap();

        assert!(store.locks_held_by(txn.id()).is_empty());
        assert_eq!(st.snapshot_seq(), Some(0));
    }

    #[tokio::test]
    async fn test_writes_rejected_on_secondary() {
        let replicator = Arc::new(Replicator::new("secondary", ReplicaRole::ActiveSecondary));
        let store: MemoryStore<i64> = MemoryStore::new("data", replicator.clone());

        let txn = replicator.begin_transaction().unwrap();
        let st = store.create_or_find_transaction(&txn).unwrap();

        assert!(matches!(
            store.add(&st, 1, 1, &quick()).await,
            Err(StoreError::NotPrimary)
        ));
        assert_eq!(st.isolation(), IsolationLevel::Snapshot);
        assert_eq!(store.get(&st, 1, &quick()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_reads_and_writes() {
        let store: MemoryStore<i64> = MemoryStore::new("data", primary());
        let txn = store.inner.replicator.begin_transaction().unwrap();
        let st = store.create_or_find_transaction(&txn).unwrap();

        store.close();

        assert!(matches!(store.get(&st, 1, &quick()).await, Err(StoreError::Closed(_))));
        assert!(matches!(
            store.remove(&st, 1, &quick()).await,
            Err(StoreError::Closed(_))
        ));
        assert!(store.create_or_find_transaction(&txn).is_err());
    }

    #[tokio::test]
    async fn test_upsert_returns_stored_value() {
        let store: MemoryStore<i64> = MemoryStore::new("meta", primary());
        let txn = store.inner.replicator.begin_transaction().unwrap();
        let st = store.create_or_find_transaction(&txn).unwrap();

        assert_eq!(store.upsert(&st, 1, 10, 20, &quick()).await.unwrap(), 10);
        assert_eq!(store.upsert(&st, 1, 10, 20, &quick()).await.unwrap(), 20);
        assert_eq!(store.version_count(), 1);
    }
}
