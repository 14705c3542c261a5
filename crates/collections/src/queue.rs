//! Distributed queue
//!
//! Items live in a data store keyed by row id. A metadata store holds two
//! pointer rows: `TAIL_KEY` points at the last enqueued row and `HEAD_KEY` at
//! the next row to dequeue. Enqueue serializes on an update lock of the tail
//! row, dequeue on the head row, so the two never block each other.
//!
//! Every mutation writes the data store first and moves the pointer second.
//! When the pointer write fails the data write is undone (see `protocol`).

use crate::clone::{ClonePolicy, DeepCopy};
use crate::config::QueueConfig;
use crate::context::QueueInitializationContext;
use crate::enumerable::QueueEnumerable;
use crate::error::{QueueError, QueueOperation, Result};
use crate::facade::ReliableQueue;
use crate::isolation::{OperationType, isolation_level};
use crate::protocol::{abort_outer, advance_or_compensate, invariant_violation};
use async_trait::async_trait;
use parking_lot::RwLock;
use reliable_common::{
    IsolationLevel, LockMode, LockingHints, OperationOptions, ReadMode, RowId,
};
use reliable_replicator::Transaction;
use reliable_store::{FailureClass, StoreError, TransactionalStore};
use std::sync::Arc;

/// Metadata row holding the row id of the last enqueued item
pub const TAIL_KEY: RowId = i64::MIN;

/// Metadata row holding the row id of the next item to dequeue
pub const HEAD_KEY: RowId = i64::MIN + 1;

/// Row id of the first item ever enqueued; `i64::MIN` is never a data row
pub const FIRST_ROW_ID: RowId = i64::MIN + 1;

const INITIAL_TAIL: RowId = FIRST_ROW_ID;
const INITIAL_HEAD: RowId = FIRST_ROW_ID;

/// Name suffix of the data store child
const DATA_STORE: &str = "dataStore";

/// Name suffix of the metadata store child
const METADATA_STORE: &str = "metadataStore";

/// The two child stores a queue is built on
pub struct QueueStores<T> {
    pub data: Arc<dyn TransactionalStore<T>>,
    pub metadata: Arc<dyn TransactionalStore<RowId>>,
}

/// Head and tail pointers as seen by a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePointers {
    pub head: RowId,
    /// `None` until the first enqueue commits
    pub tail: Option<RowId>,
}

impl QueuePointers {
    pub fn is_empty(&self) -> bool {
        self.tail.is_none_or(|tail| self.head > tail)
    }

    /// Number of rows between head and tail, inclusive
    pub fn len(&self) -> u64 {
        match self.tail {
            Some(tail) if tail >= self.head => tail.abs_diff(self.head) + 1,
            _ => 0,
        }
    }
}

/// State set up by `initialize`
struct Registration<T> {
    name: String,
    trace_type: String,
    automatic_cloning: bool,
    clone_policy: ClonePolicy<T>,
    data: Arc<dyn TransactionalStore<T>>,
    metadata: Arc<dyn TransactionalStore<RowId>>,
}

/// FIFO queue over a data store and a metadata store
pub struct DistributedQueue<T> {
    config: QueueConfig,
    deep_copy: Option<DeepCopy<T>>,
    registration: RwLock<Option<Arc<Registration<T>>>>,
}

impl<T> DistributedQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an unregistered queue
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            deep_copy: None,
            registration: RwLock::new(None),
        }
    }

    /// Set the function used to copy items when automatic cloning is on
    pub fn with_deep_copy(mut self, copier: impl Fn(&T) -> T + Send + Sync + 'static) -> Self {
        self.deep_copy = Some(Arc::new(copier));
        self
    }

    /// Names of the data and metadata child stores of a queue called `name`
    pub fn child_names(name: &str) -> (String, String) {
        (
            format!("{}/{}", name, DATA_STORE),
            format!("{}/{}", name, METADATA_STORE),
        )
    }

    /// Register the queue under `name` on top of its child stores
    pub fn initialize(
        &self,
        replica_id: &str,
        name: &str,
        initialization_context: &[u8],
        stores: QueueStores<T>,
    ) -> Result<()> {
        let context = QueueInitializationContext::from_bytes(initialization_context)?;

        let (data_name, metadata_name) = Self::child_names(name);
        if stores.data.name() != data_name {
            return Err(QueueError::MissingChildStore { name: data_name });
        }
        if stores.metadata.name() != metadata_name {
            return Err(QueueError::MissingChildStore {
                name: metadata_name,
            });
        }

        let clone_policy = ClonePolicy::resolve(context.automatic_cloning, self.deep_copy.clone());
        let trace_type = format!("{}@{}", replica_id, name);

        tracing::info!(
            queue = %trace_type,
            "Initialized queue of {} (context v{}, cloning {:?})",
            std::any::type_name::<T>(),
            context.version,
            clone_policy
        );

        *self.registration.write() = Some(Arc::new(Registration {
            name: name.to_string(),
            trace_type,
            automatic_cloning: context.automatic_cloning,
            clone_policy,
            data: stores.data,
            metadata: stores.metadata,
        }));

        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.registration.read().is_some()
    }

    /// Registered name, if registered
    pub fn name(&self) -> Option<String> {
        self.registration.read().as_ref().map(|r| r.name.clone())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Serialized initialization context to register this queue with
    pub fn initialization_context(&self) -> Result<Vec<u8>> {
        let automatic_cloning = self
            .registration
            .read()
            .as_ref()
            .map_or(self.config.automatic_cloning, |r| r.automatic_cloning);

        QueueInitializationContext::new(automatic_cloning).to_bytes()
    }

    /// Current head and tail pointers, read from a snapshot
    pub async fn pointers(&self, tx: &Transaction) -> Result<QueuePointers> {
        let reg = self.registration()?;
        let meta_txn = reg.metadata.create_or_find_transaction(tx)?;
        meta_txn.set_isolation(IsolationLevel::Snapshot);

        let options = self.config.default_options();
        let head = reg
            .metadata
            .get(&meta_txn, HEAD_KEY, &options)
            .await?
            .unwrap_or(INITIAL_HEAD);
        let tail = reg.metadata.get(&meta_txn, TAIL_KEY, &options).await?;

        Ok(QueuePointers { head, tail })
    }

    fn registration(&self) -> Result<Arc<Registration<T>>> {
        self.registration
            .read()
            .clone()
            .ok_or(QueueError::NotRegistered)
    }

    /// Row after `row`; running off the end of the id space is fatal
    async fn next_row(
        reg: &Registration<T>,
        operation: QueueOperation,
        tx: &Transaction,
        row: RowId,
    ) -> Result<RowId> {
        match row.checked_add(1) {
            Some(next) => Ok(next),
            None => {
                let reason = format!("pointer {} cannot advance", row);
                Err(invariant_violation(&reg.trace_type, operation, tx, reason).await)
            }
        }
    }
}

#[async_trait]
impl<T> ReliableQueue<T> for DistributedQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default_options(&self) -> OperationOptions {
        self.config.default_options()
    }

    async fn enqueue_with(
        &self,
        tx: &Transaction,
        item: T,
        options: &OperationOptions,
    ) -> Result<()> {
        let reg = self.registration()?;
        let meta_txn = reg.metadata.create_or_find_transaction(tx)?;
        let data_txn = reg.data.create_or_find_transaction(tx)?;

        // Concurrent enqueues queue up on the tail row instead of deadlocking
        // on a shared-to-exclusive upgrade
        meta_txn.set_isolation(IsolationLevel::ReadRepeatable);
        meta_txn.set_locking_hints(LockingHints::Update);

        let new_tail = match reg.metadata.get(&meta_txn, TAIL_KEY, options).await? {
            Some(tail) => Self::next_row(&reg, QueueOperation::Enqueue, tx, tail).await?,
            None => INITIAL_TAIL,
        };

        tracing::debug!(queue = %reg.trace_type, "Enqueue in {} at row {}", tx.id(), new_tail);

        let item = reg.clone_policy.apply(item);
        match reg.data.add(&data_txn, new_tail, item, options).await {
            Ok(()) => {}
            Err(StoreError::KeyExists(row)) => {
                let reason = format!("row {} already exists beyond the tail", row);
                return Err(
                    invariant_violation(&reg.trace_type, QueueOperation::Enqueue, tx, reason).await,
                );
            }
            Err(e) => return Err(e.into()),
        }

        let pointer_options = self.config.pointer_options(options);
        let data = &reg.data;
        let data_txn = &data_txn;
        let undo_options = &pointer_options;

        advance_or_compensate(
            &reg.trace_type,
            QueueOperation::Enqueue,
            tx,
            reg.metadata
                .upsert(&meta_txn, TAIL_KEY, new_tail, new_tail, &pointer_options),
            || async move {
                let removed = data.remove(data_txn, new_tail, undo_options).await?;
                Ok::<_, StoreError>(removed.is_some())
            },
        )
        .await
    }

    async fn try_dequeue_with(
        &self,
        tx: &Transaction,
        options: &OperationOptions,
    ) -> Result<Option<T>> {
        let reg = self.registration()?;
        let meta_txn = reg.metadata.create_or_find_transaction(tx)?;
        let data_txn = reg.data.create_or_find_transaction(tx)?;

        meta_txn.set_isolation(IsolationLevel::ReadRepeatable);
        meta_txn.set_locking_hints(LockingHints::Update);

        let head = reg
            .metadata
            .get(&meta_txn, HEAD_KEY, options)
            .await?
            .unwrap_or(INITIAL_HEAD);

        let Some(removed) = reg.data.remove(&data_txn, head, options).await? else {
            tracing::debug!(queue = %reg.trace_type, "Dequeue in {} found queue empty", tx.id());
            return Ok(None);
        };

        tracing::debug!(queue = %reg.trace_type, "Dequeue in {} at row {}", tx.id(), head);

        let next_head = Self::next_row(&reg, QueueOperation::Dequeue, tx, head).await?;

        let pointer_options = self.config.pointer_options(options);
        let restore = removed.clone();
        let data = &reg.data;
        let data_txn = &data_txn;
        let undo_options = &pointer_options;

        advance_or_compensate(
            &reg.trace_type,
            QueueOperation::Dequeue,
            tx,
            reg.metadata
                .upsert(&meta_txn, HEAD_KEY, next_head, next_head, &pointer_options),
            || async move {
                data.add(data_txn, head, restore, undo_options).await?;
                Ok::<_, StoreError>(true)
            },
        )
        .await?;

        Ok(Some(reg.clone_policy.apply(removed)))
    }

    async fn try_peek_with(
        &self,
        tx: &Transaction,
        lock_mode: LockMode,
        options: &OperationOptions,
    ) -> Result<Option<T>> {
        let reg = self.registration()?;
        let meta_txn = reg.metadata.create_or_find_transaction(tx)?;
        let data_txn = reg.data.create_or_find_transaction(tx)?;

        let isolation = isolation_level(tx, OperationType::SingleEntity);
        meta_txn.set_isolation(isolation);
        data_txn.set_isolation(isolation);

        // Hints left behind by an earlier enqueue or dequeue must not apply
        let hints = match lock_mode {
            LockMode::Update => LockingHints::Update,
            LockMode::Default => LockingHints::None,
        };
        meta_txn.set_locking_hints(hints);
        data_txn.set_locking_hints(hints);

        let head = reg
            .metadata
            .get(&meta_txn, HEAD_KEY, options)
            .await?
            .unwrap_or(INITIAL_HEAD);
        let value = reg.data.get(&data_txn, head, options).await?;

        tracing::debug!(
            queue = %reg.trace_type,
            "Peek in {} at row {} found {}",
            tx.id(),
            head,
            if value.is_some() { "an item" } else { "nothing" }
        );

        Ok(value.map(|item| reg.clone_policy.apply(item)))
    }

    async fn count_with(&self, tx: &Transaction, options: &OperationOptions) -> Result<u64> {
        let reg = self.registration()?;
        let data_txn = reg.data.create_or_find_transaction(tx)?;

        // Snapshot on primaries too; counting takes no locks
        data_txn.set_isolation(isolation_level(tx, OperationType::MultiEntity));

        let mut cursor = reg.data.create_enumerable(&data_txn, false, ReadMode::Off)?;
        let mut count = 0u64;
        loop {
            if options.is_cancelled() {
                return Err(StoreError::Cancelled.into());
            }
            match cursor.next().await? {
                Some(_) => count += 1,
                None => break,
            }
        }

        tracing::debug!(queue = %reg.trace_type, "Count in {} is {}", tx.id(), count);
        Ok(count)
    }

    async fn clear_with(&self, tx: &Transaction, options: &OperationOptions) -> Result<()> {
        let reg = self.registration()?;
        let meta_txn = reg.metadata.create_or_find_transaction(tx)?;
        let data_txn = reg.data.create_or_find_transaction(tx)?;

        meta_txn.set_isolation(IsolationLevel::ReadRepeatable);
        meta_txn.set_locking_hints(LockingHints::Update);

        let head = reg
            .metadata
            .get(&meta_txn, HEAD_KEY, options)
            .await?
            .unwrap_or(INITIAL_HEAD);
        let Some(tail) = reg.metadata.get(&meta_txn, TAIL_KEY, options).await? else {
            return Ok(());
        };
        if head > tail {
            return Ok(());
        }

        let next_head = Self::next_row(&reg, QueueOperation::Clear, tx, tail).await?;
        let pointer_options = self.config.pointer_options(options);

        let mut removed = 0u64;
        for row in head..=tail {
            // Once something is removed the rest must not be abandoned
            let row_options = if removed == 0 { options } else { &pointer_options };
            match reg.data.remove(&data_txn, row, row_options).await {
                Ok(Some(_)) => removed += 1,
                Ok(None) => {}
                Err(e) if removed == 0 => return Err(e.into()),
                Err(e) => {
                    tracing::error!(
                        queue = %reg.trace_type,
                        "Clear in {} failed at row {} after {} removals: {}; aborting",
                        tx.id(),
                        row,
                        removed,
                        e
                    );
                    abort_outer(&reg.trace_type, tx).await;
                    return Err(e.into());
                }
            }
        }

        let advanced = reg
            .metadata
            .upsert(&meta_txn, HEAD_KEY, next_head, next_head, &pointer_options)
            .await;

        match advanced {
            Ok(_) => {
                tracing::debug!(
                    queue = %reg.trace_type,
                    "Cleared {} rows in {}, head now {}",
                    removed,
                    tx.id(),
                    next_head
                );
                Ok(())
            }
            Err(e) if removed == 0 => Err(e.into()),
            Err(e) if e.class() == FailureClass::Unexpected => {
                let reason = format!("head pointer write failed: {}", e);
                Err(invariant_violation(&reg.trace_type, QueueOperation::Clear, tx, reason).await)
            }
            Err(e) => {
                abort_outer(&reg.trace_type, tx).await;
                Err(e.into())
            }
        }
    }

    fn create_enumerable(&self, tx: &Transaction) -> Result<QueueEnumerable<T>> {
        let reg = self.registration()?;
        let data_txn = reg.data.create_or_find_transaction(tx)?;
        data_txn.set_isolation(isolation_level(tx, OperationType::MultiEntity));

        let cursor = reg
            .data
            .create_enumerable(&data_txn, true, ReadMode::ReadValue)?;

        tracing::debug!(queue = %reg.trace_type, "Enumerating in {}", tx.id());
        Ok(QueueEnumerable::new(
            data_txn,
            cursor,
            reg.clone_policy.clone(),
        ))
    }
}
