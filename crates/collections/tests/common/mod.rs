//! Shared setup for queue integration tests

#![allow(dead_code)]

use reliable_collections::{DistributedQueue, QueueConfig, QueueStores, ReliableQueue};
use reliable_common::{ReadMode, ReplicaRole, RowId};
use reliable_replicator::Replicator;
use reliable_store::{FaultInjectingStore, MemoryStore, StoreCursor, TransactionalStore};
use std::sync::Arc;

/// A registered queue whose child stores can be made to fail
pub struct QueueHarness {
    pub replicator: Arc<Replicator>,
    pub queue: Arc<DistributedQueue<String>>,
    pub data_store: MemoryStore<String>,
    pub metadata_store: MemoryStore<RowId>,
    pub data: Arc<FaultInjectingStore<String>>,
    pub metadata: Arc<FaultInjectingStore<RowId>>,
}

pub fn harness() -> QueueHarness {
    harness_with(DistributedQueue::new(QueueConfig::default()))
}

/// Register `queue` as "queue" on a fresh primary replica
pub fn harness_with(queue: DistributedQueue<String>) -> QueueHarness {
    let replicator = Arc::new(Replicator::new("replica-1", ReplicaRole::Primary));
    let (data_name, metadata_name) = DistributedQueue::<String>::child_names("queue");

    let data_store = MemoryStore::new(data_name, replicator.clone());
    let metadata_store = MemoryStore::new(metadata_name, replicator.clone());
    let data = Arc::new(FaultInjectingStore::new(Arc::new(data_store.clone())));
    let metadata = Arc::new(FaultInjectingStore::new(Arc::new(metadata_store.clone())));

    let context = queue.initialization_context().unwrap();
    queue
        .initialize(
            replicator.replica_id(),
            "queue",
            &context,
            QueueStores {
                data: data.clone(),
                metadata: metadata.clone(),
            },
        )
        .unwrap();

    QueueHarness {
        replicator,
        queue: Arc::new(queue),
        data_store,
        metadata_store,
        data,
        metadata,
    }
}

impl QueueHarness {
    /// Enqueue `items` in one committed transaction
    pub async fn enqueue_committed(&self, items: &[&str]) {
        let tx = self.replicator.begin_transaction().unwrap();
        for item in items {
            self.queue.enqueue(&tx, item.to_string()).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    /// Committed items, head first
    pub async fn items(&self) -> Vec<String> {
        let tx = self.replicator.begin_transaction().unwrap();
        let items = self.queue.create_enumerable(&tx).unwrap().to_vec().await.unwrap();
        tx.commit().await.unwrap();
        items
    }

    /// Committed item count
    pub async fn count(&self) -> u64 {
        let tx = self.replicator.begin_transaction().unwrap();
        let count = self.queue.count(&tx).await.unwrap();
        tx.commit().await.unwrap();
        count
    }

    /// Committed data row ids, ascending
    pub async fn data_rows(&self) -> Vec<RowId> {
        let tx = self.replicator.begin_transaction().unwrap();
        let data_txn = self.data_store.create_or_find_transaction(&tx).unwrap();
        let mut cursor: Box<dyn StoreCursor<String>> = self
            .data_store
            .create_enumerable(&data_txn, true, ReadMode::Off)
            .unwrap();

        let mut rows = Vec::new();
        while let Some((row, _)) = cursor.next().await.unwrap() {
            rows.push(row);
        }
        tx.commit().await.unwrap();
        rows
    }

    /// The committed data rows are exactly `head..=tail`
    pub async fn assert_rows_match_pointers(&self) {
        let tx = self.replicator.begin_transaction().unwrap();
        let pointers = self.queue.pointers(&tx).await.unwrap();
        tx.commit().await.unwrap();

        let expected: Vec<RowId> = match pointers.tail {
            Some(tail) => (pointers.head..=tail).collect(),
            None => Vec::new(),
        };
        assert_eq!(self.data_rows().await, expected, "pointers {:?}", pointers);
    }
}
