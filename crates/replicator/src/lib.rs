//! Transaction and replicator collaborator
//!
//! Stores enlist in a `Transaction` as `TransactionParticipant`s; committing or
//! aborting the transaction drives every enlisted store.

pub mod error;
mod replicator;
mod transaction;

pub use error::{ReplicatorError, Result};
pub use replicator::Replicator;
pub use transaction::{Transaction, TransactionParticipant, TransactionState, WeakTransaction};
