//! Fault injection wrapper
//!
//! Wraps any store and fails chosen operations with chosen errors before they
//! reach the wrapped store. Used to drive compensation paths in tests.

use crate::error::{Result, StoreError};
use crate::store::{StoreCursor, TransactionalStore};
use crate::transaction::StoreTransaction;
use async_trait::async_trait;
use parking_lot::Mutex;
use reliable_common::{OperationOptions, ReadMode, RowId};
use reliable_replicator::Transaction;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Store operations that can be failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Add,
    Remove,
    Upsert,
}

/// Store wrapper that fails queued operations
pub struct FaultInjectingStore<V> {
    inner: Arc<dyn TransactionalStore<V>>,

    /// Errors to return, consumed one per call of the operation
    faults: Mutex<HashMap<StoreOp, VecDeque<StoreError>>>,

    /// Number of calls seen per operation, failed or not
    calls: Mutex<HashMap<StoreOp, usize>>,
}

impl<V> FaultInjectingStore<V>
where
    V: Send + Sync + 'static,
{
    pub fn new(inner: Arc<dyn TransactionalStore<V>>) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next call of `op` with `error`
    ///
    /// Repeated calls queue further failures for the following calls.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.faults.lock().entry(op).or_default().push_back(error);
    }

    /// Drop all queued failures
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Number of calls of `op` so far
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    fn intercept(&self, op: StoreOp) -> Result<()> {
        *self.calls.lock().entry(op).or_default() += 1;

        match self.faults.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => {
                tracing::debug!("Injecting {:?} into {} on {}", error, op_name(op), self.inner.name());
                Err(error)
            }
            None => Ok(()),
        }
    }
}

fn op_name(op: StoreOp) -> &'static str {
    match op {
        StoreOp::Get => "get",
        StoreOp::Add => "add",
        StoreOp::Remove => "remove",
        StoreOp::Upsert => "upsert",
    }
}

#[async_trait]
impl<V> TransactionalStore<V> for FaultInjectingStore<V>
where
    V: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn create_or_find_transaction(&self, txn: &Transaction) -> Result<StoreTransaction> {
        self.inner.create_or_find_transaction(txn)
    }

    async fn get(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        options: &OperationOptions,
    ) -> Result<Option<V>> {
        self.intercept(StoreOp::Get)?;
        self.inner.get(txn, key, options).await
    }

    async fn add(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        value: V,
        options: &OperationOptions,
    ) -> Result<()> {
        self.intercept(StoreOp::Add)?;
        self.inner.add(txn, key, value, options).await
    }

    async fn remove(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        options: &OperationOptions,
    ) -> Result<Option<V>> {
        self.intercept(StoreOp::Remove)?;
        self.inner.remove(txn, key, options).await
    }

    async fn upsert(
        &self,
        txn: &StoreTransaction,
        key: RowId,
        comparison: V,
        new_value: V,
        options: &OperationOptions,
    ) -> Result<V> {
        self.intercept(StoreOp::Upsert)?;
        self.inner
            .upsert(txn, key, comparison, new_value, options)
            .await
    }

    fn create_enumerable(
        &self,
        txn: &StoreTransaction,
        ordered: bool,
        read_mode: ReadMode,
    ) -> Result<Box<dyn StoreCursor<V>>> {
        self.inner.create_enumerable(txn, ordered, read_mode)
    }
}
