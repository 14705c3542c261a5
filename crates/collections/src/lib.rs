//! Reliable collections
//!
//! A transactional FIFO queue kept in two ordered stores: a data store of
//! items keyed by row id and a metadata store holding the head and tail
//! pointers. All operations run inside a caller-supplied replicator
//! transaction.

pub mod clone;
pub mod config;
pub mod context;
mod enumerable;
pub mod error;
mod facade;
pub mod isolation;
mod protocol;
mod queue;
mod state_manager;

pub use clone::{ClonePolicy, DeepCopy};
pub use config::QueueConfig;
pub use context::QueueInitializationContext;
pub use enumerable::QueueEnumerable;
pub use error::{QueueError, QueueOperation, Result};
pub use facade::ReliableQueue;
pub use isolation::{OperationType, isolation_level};
pub use queue::{
    DistributedQueue, FIRST_ROW_ID, HEAD_KEY, QueuePointers, QueueStores, TAIL_KEY,
};
pub use state_manager::StateManager;
