//! Registry of named queues on one replica
//!
//! `get_or_add_queue` creates a queue together with its two child stores the
//! first time a name is used and hands back the same instance afterwards.

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::queue::{DistributedQueue, QueueStores};
use parking_lot::RwLock;
use reliable_common::RowId;
use reliable_replicator::Replicator;
use reliable_store::{MemoryStore, StoreConfig};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Registered = Arc<dyn Any + Send + Sync>;

/// Creates, registers and looks up queues by name
pub struct StateManager {
    replicator: Arc<Replicator>,
    queue_config: QueueConfig,
    store_config: StoreConfig,
    queues: RwLock<HashMap<String, Registered>>,
}

impl StateManager {
    pub fn new(replicator: Arc<Replicator>) -> Self {
        Self::with_config(replicator, QueueConfig::default(), StoreConfig::default())
    }

    pub fn with_config(
        replicator: Arc<Replicator>,
        queue_config: QueueConfig,
        store_config: StoreConfig,
    ) -> Self {
        Self {
            replicator,
            queue_config,
            store_config,
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Replicator transactions against these queues must come from
    pub fn replicator(&self) -> &Arc<Replicator> {
        &self.replicator
    }

    /// Queue registered under `name`, creating it if needed
    ///
    /// Fails with `TypeMismatch` when `name` holds a queue of another item type.
    pub fn get_or_add_queue<T>(&self, name: &str) -> Result<Arc<DistributedQueue<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut queues = self.queues.write();

        if let Some(existing) = queues.get(name) {
            return Self::downcast(name, existing.clone());
        }

        let queue = DistributedQueue::<T>::new(self.queue_config.clone());
        let (data_name, metadata_name) = DistributedQueue::<T>::child_names(name);

        let data: MemoryStore<T> = MemoryStore::with_config(
            data_name,
            self.replicator.clone(),
            self.store_config.clone(),
        );
        let metadata: MemoryStore<RowId> = MemoryStore::with_config(
            metadata_name,
            self.replicator.clone(),
            self.store_config.clone(),
        );

        let context = queue.initialization_context()?;
        queue.initialize(
            self.replicator.replica_id(),
            name,
            &context,
            QueueStores {
                data: Arc::new(data),
                metadata: Arc::new(metadata),
            },
        )?;

        let queue = Arc::new(queue);
        queues.insert(name.to_string(), queue.clone());
        tracing::info!("Registered queue {} on {}", name, self.replicator.replica_id());

        Ok(queue)
    }

    /// Queue registered under `name`, if any
    pub fn try_get_queue<T>(&self, name: &str) -> Result<Option<Arc<DistributedQueue<T>>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let existing = self.queues.read().get(name).cloned();
        existing.map(|queue| Self::downcast(name, queue)).transpose()
    }

    /// Names of all registered queues, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn downcast<T>(name: &str, registered: Registered) -> Result<Arc<DistributedQueue<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        registered
            .downcast::<DistributedQueue<T>>()
            .map_err(|_| QueueError::TypeMismatch {
                name: name.to_string(),
            })
    }
}
