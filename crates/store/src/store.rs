//! Ordered transactional store contract

use crate::error::Result;
use crate::transaction::StoreTransaction;
use async_trait::async_trait;
use reliable_common::{OperationOptions, ReadMode, RowId};
use reliable_replicator::Transaction;

/// A keyed store whose reads and writes take part in outer transactions
///
/// Keys are row ids. Every call runs inside a `StoreTransaction` obtained from
/// `create_or_find_transaction`; its isolation level and locking hints decide
/// what reads see and which locks they take.
#[async_trait]
pub trait TransactionalStore<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Name of the store, unique per replica
    fn name(&self) -> &str;

    /// Sub-transaction for `txn`, created and enlisted on first use
    fn create_or_find_transaction(&self, txn: &Transaction) -> Result<StoreTransaction>;

    /// Read a key
    async fn get(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        options: &OperationOptions,
    ) -> Result<Option<V>>;

    /// Insert a key that must not be visible yet (`KeyExists` otherwise)
    async fn add(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        value: V,
        options: &OperationOptions,
    ) -> Result<()>;

    /// Remove a key, returning its value if it was present
    async fn remove(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        options: &OperationOptions,
    ) -> Result<Option<V>>;

    /// Store `comparison` if the key is absent, `new_value` if it is present
    ///
    /// Returns the value now stored. Passing the same value twice is a plain
    /// "set", and repeating it leaves the same result.
    async fn upsert(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        comparison: V,
        new_value: V,
        options: &OperationOptions,
    ) -> Result<V>;

    /// Lazy cursor over the keys visible to `txn`
    ///
    /// Keys are captured on the first `next`; with `ordered` they follow the
    /// store's key comparer.
    fn create_enumerable(
        &self,
        txn: &StoreTransaction,
        ordered: bool,
        read_mode: ReadMode,
    ) -> Result<Box<dyn StoreCursor<V>>>;
}

/// Single-pass cursor returned by `TransactionalStore::create_enumerable`
#[async_trait]
pub trait StoreCursor<V>: Send {
    /// Next key, with its value when the cursor reads values
    async fn next(&mut self) -> Result<Option<(RowId, Option<V>)>>;
}
