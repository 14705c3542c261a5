//! Caller-facing queue trait

use crate::enumerable::QueueEnumerable;
use crate::error::Result;
use async_trait::async_trait;
use reliable_common::{LockMode, OperationOptions};
use reliable_replicator::Transaction;

/// Transactional FIFO queue
///
/// Every call runs inside the caller's transaction; nothing becomes visible
/// to other transactions until the caller commits it. The plain methods use
/// `default_options()`; the `_with` variants take an explicit timeout and
/// cancellation token.
#[async_trait]
pub trait ReliableQueue<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Timeout and token used by the plain methods
    fn default_options(&self) -> OperationOptions;

    /// Add an item at the tail
    async fn enqueue_with(&self, tx: &Transaction, item: T, options: &OperationOptions)
    -> Result<()>;

    /// Remove the item at the head, `None` when the queue is empty
    async fn try_dequeue_with(&self, tx: &Transaction, options: &OperationOptions)
    -> Result<Option<T>>;

    /// Read the item at the head without removing it
    ///
    /// `LockMode::Update` keeps other transactions from dequeuing it until
    /// this one ends.
    async fn try_peek_with(
        &self,
        tx: &Transaction,
        lock_mode: LockMode,
        options: &OperationOptions,
    ) -> Result<Option<T>>;

    /// Number of items, read from a snapshot
    async fn count_with(&self, tx: &Transaction, options: &OperationOptions) -> Result<u64>;

    /// Remove every item
    async fn clear_with(&self, tx: &Transaction, options: &OperationOptions) -> Result<()>;

    /// Snapshot enumeration from head to tail
    fn create_enumerable(&self, tx: &Transaction) -> Result<QueueEnumerable<T>>;

    async fn enqueue(&self, tx: &Transaction, item: T) -> Result<()> {
        let options = self.default_options();
        self.enqueue_with(tx, item, &options).await
    }

    async fn try_dequeue(&self, tx: &Transaction) -> Result<Option<T>> {
        let options = self.default_options();
        self.try_dequeue_with(tx, &options).await
    }

    async fn try_peek(&self, tx: &Transaction) -> Result<Option<T>> {
        let options = self.default_options();
        self.try_peek_with(tx, LockMode::Default, &options).await
    }

    async fn count(&self, tx: &Transaction) -> Result<u64> {
        let options = self.default_options();
        self.count_with(tx, &options).await
    }

    async fn clear(&self, tx: &Transaction) -> Result<()> {
        let options = self.default_options();
        self.clear_with(tx, &options).await
    }
}
