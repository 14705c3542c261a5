//! Read isolation selection

use reliable_common::IsolationLevel;
use reliable_replicator::Transaction;

/// Shape of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// Reads one row
    SingleEntity,
    /// Reads many rows, e.g. count or enumeration
    MultiEntity,
}

/// Isolation to use for a read of the given shape
///
/// Multi-row reads are always snapshot. Single-row reads are read-repeatable
/// when the transaction was started on a primary, snapshot on a secondary
/// (which takes no locks).
pub fn isolation_level(txn: &Transaction, operation: OperationType) -> IsolationLevel {
    match operation {
        OperationType::MultiEntity => IsolationLevel::Snapshot,
        OperationType::SingleEntity if txn.is_primary_transaction() => {
            IsolationLevel::ReadRepeatable
        }
        OperationType::SingleEntity => IsolationLevel::Snapshot,
    }
}
