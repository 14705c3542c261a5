//! Ordered transactional store for reliable collections
//!
//! This crate provides:
//! - The `TransactionalStore` contract the queue protocol is written against
//! - `MemoryStore`, an in-memory MVCC implementation with row locks
//! - `FaultInjectingStore`, a wrapper that fails chosen operations

pub mod comparer;
pub mod config;
pub mod error;
pub mod fault;
pub mod lock;
mod memory;
pub mod mvcc;
mod store;
mod transaction;

pub use comparer::{KeyComparer, NaturalOrder, ReverseOrder};
pub use config::StoreConfig;
pub use error::{FailureClass, Result, StoreError};
pub use fault::{FaultInjectingStore, StoreOp};
pub use lock::KeyLockMode;
pub use memory::MemoryStore;
pub use store::{StoreCursor, TransactionalStore};
pub use transaction::StoreTransaction;
