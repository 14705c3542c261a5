//! Snapshot enumeration of a queue

use crate::clone::ClonePolicy;
use crate::error::Result;
use reliable_common::IsolationLevel;
use reliable_store::{StoreCursor, StoreTransaction};

/// Single-pass, front-to-back enumeration of a queue's items
///
/// Every step reads under snapshot isolation, whatever isolation the data
/// store sub-transaction was switched to in between, and restores that
/// isolation afterwards.
pub struct QueueEnumerable<T> {
    txn: StoreTransaction,
    cursor: Box<dyn StoreCursor<T>>,
    clone_policy: ClonePolicy<T>,
}

impl<T> QueueEnumerable<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        txn: StoreTransaction,
        cursor: Box<dyn StoreCursor<T>>,
        clone_policy: ClonePolicy<T>,
    ) -> Self {
        Self {
            txn,
            cursor,
            clone_policy,
        }
    }

    /// Next item, oldest first
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            let previous = self.txn.isolation();
            self.txn.set_isolation(IsolationLevel::Snapshot);
            let entry = self.cursor.next().await;
            self.txn.set_isolation(previous);

            match entry? {
                None => return Ok(None),
                Some((_, Some(item))) => return Ok(Some(self.clone_policy.apply(item))),
                // Keys-only entry; nothing to hand out
                Some((_, None)) => continue,
            }
        }
    }

    /// Drain the remaining items
    pub async fn to_vec(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}
