//! Lock manager for store rows
//!
//! Provides key-level locking with shared/update/exclusive modes. The
//! manager only answers and records; waiting for a conflict to clear is done
//! by the store.

use reliable_common::{LockingHints, RowId, TransactionId};
use std::collections::HashMap;

/// Lock modes for row access
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyLockMode {
    /// Shared lock for reading
    Shared,
    /// Read lock that announces an intent to write
    Update,
    /// Exclusive lock for writing
    Exclusive,
}

impl KeyLockMode {
    /// Check if two lock modes are compatible
    pub fn is_compatible_with(&self, other: KeyLockMode) -> bool {
        matches!(
            (*self, other),
            (KeyLockMode::Shared, KeyLockMode::Shared)
                | (KeyLockMode::Shared, KeyLockMode::Update)
                | (KeyLockMode::Update, KeyLockMode::Shared)
        )
    }

    /// Lock taken by a read-repeatable read under the given hint
    pub fn for_read(hints: LockingHints) -> Self {
        match hints {
            LockingHints::None => KeyLockMode::Shared,
            LockingHints::Update => KeyLockMode::Update,
            LockingHints::Exclusive => KeyLockMode::Exclusive,
        }
    }
}

/// Information about a held lock
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub holder: TransactionId,
    pub mode: KeyLockMode,
}

/// Result of checking if a lock can be acquired
#[derive(Debug, Clone, PartialEq)]
pub enum LockAttemptResult {
    /// Lock would be granted if requested
    WouldGrant,
    /// Lock conflicts with existing locks
    Conflict {
        /// Transactions holding conflicting locks, oldest first
        holders: Vec<(TransactionId, KeyLockMode)>,
    },
}

/// Lock manager for row-level locking
#[derive(Debug, Default)]
pub struct LockManager {
    /// All currently held locks (key -> lock holders)
    locks: HashMap<RowId, Vec<LockInfo>>,
}

impl LockManager {
    /// Create a new lock manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a lock can be acquired without modifying state
    pub fn check(&self, tx_id: TransactionId, key: RowId, mode: KeyLockMode) -> LockAttemptResult {
        let Some(holders) = self.locks.get(&key) else {
            return LockAttemptResult::WouldGrant;
        };

        let mut conflicts: Vec<_> = holders
            .iter()
            // Locks are re-entrant: a transaction never conflicts with itself
            .filter(|lock| lock.holder != tx_id)
            .filter(|lock| !lock.mode.is_compatible_with(mode))
            .map(|lock| (lock.holder, lock.mode))
            .collect();

        if conflicts.is_empty() {
            return LockAttemptResult::WouldGrant;
        }

        conflicts.sort_by_key(|(txn, _)| *txn);
        LockAttemptResult::Conflict { holders: conflicts }
    }

    /// Grant a lock that was previously checked
    ///
    /// A transaction holds at most one lock per key; requesting a stronger
    /// mode upgrades it, a weaker one leaves it unchanged.
    pub fn grant(&mut self, tx_id: TransactionId, key: RowId, mode: KeyLockMode) {
        let holders = self.locks.entry(key).or_default();
        match holders.iter_mut().find(|lock| lock.holder == tx_id) {
            Some(existing) => existing.mode = existing.mode.max(mode),
            None => holders.push(LockInfo {
                holder: tx_id,
                mode,
            }),
        }
    }

    /// Release all locks held by a transaction
    pub fn release_all(&mut self, tx_id: TransactionId) {
        self.locks.retain(|_key, holders| {
            holders.retain(|lock| lock.holder != tx_id);
            !holders.is_empty()
        });
    }

    /// Mode held by a transaction on a key, if any
    pub fn held_mode(&self, tx_id: TransactionId, key: RowId) -> Option<KeyLockMode> {
        self.locks
            .get(&key)?
            .iter()
            .find(|lock| lock.holder == tx_id)
            .map(|lock| lock.mode)
    }

    /// Get all locks held by a transaction, sorted by key
    pub fn locks_held_by(&self, tx_id: TransactionId) -> Vec<(RowId, KeyLockMode)> {
        let mut result: Vec<_> = self
            .locks
            .iter()
            .filter_map(|(key, holders)| {
                holders
                    .iter()
                    .find(|lock| lock.holder == tx_id)
                    .map(|lock| (*key, lock.mode))
            })
            .collect();

        result.sort_by_key(|(key, _)| *key);
        result
    }

    /// Check if a transaction holds any locks
    pub fn has_locks(&self, tx_id: TransactionId) -> bool {
        self.locks
            .values()
            .any(|holders| holders.iter().any(|lock| lock.holder == tx_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(n: u64) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn test_lock_compatibility() {
        use KeyLockMode::*;

        assert!(Shared.is_compatible_with(Shared));
        assert!(Shared.is_compatible_with(Update));
        assert!(Update.is_compatible_with(Shared));
        assert!(!Update.is_compatible_with(Update));
        assert!(!Shared.is_compatible_with(Exclusive));
        assert!(!Exclusive.is_compatible_with(Shared));
        assert!(!Update.is_compatible_with(Exclusive));
        assert!(!Exclusive.is_compatible_with(Exclusive));
    }

    #[test]
    fn test_update_locks_serialize_updaters_but_admit_readers() {
        let mut manager = LockManager::new();

        manager.grant(tx(1), 10, KeyLockMode::Update);

        assert_eq!(
            manager.check(tx(2), 10, KeyLockMode::Shared),
            LockAttemptResult::WouldGrant
        );

        match manager.check(tx(3), 10, KeyLockMode::Update) {
            LockAttemptResult::Conflict { holders } => {
                assert_eq!(holders, vec![(tx(1), KeyLockMode::Update)]);
            }
            _ => panic!("Expected conflict"),
        }
    }

    #[test]
    fn test_conflicts_sorted_oldest_first() {
        let mut manager = LockManager::new();
        manager.grant(tx(5), 1, KeyLockMode::Shared);
        manager.grant(tx(2), 1, KeyLockMode::Shared);

        match manager.check(tx(9), 1, KeyLockMode::Exclusive) {
            LockAttemptResult::Conflict { holders } => {
                assert_eq!(holders[0].0, tx(2));
                assert_eq!(holders[1].0, tx(5));
            }
            _ => panic!("Expected conflict"),
        }
    }

    #[test]
    fn test_reentrant_upgrade() {
        let mut manager = LockManager::new();

        manager.grant(tx(1), 7, KeyLockMode::Update);
        assert_eq!(
            manager.check(tx(1), 7, KeyLockMode::Exclusive),
            LockAttemptResult::WouldGrant
        );
        manager.grant(tx(1), 7, KeyLockMode::Exclusive);
        manager.grant(tx(1), 7, KeyLockMode::Shared);

        assert_eq!(manager.held_mode(tx(1), 7), Some(KeyLockMode::Exclusive));
        assert_eq!(manager.locks_held_by(tx(1)), vec![(7, KeyLockMode::Exclusive)]);
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let mut manager = LockManager::new();

        manager.grant(tx(1), 7, KeyLockMode::Update);
        manager.grant(tx(2), 7, KeyLockMode::Shared);

        assert!(matches!(
            manager.check(tx(1), 7, KeyLockMode::Exclusive),
            LockAttemptResult::Conflict { .. }
        ));
    }

    #[test]
    fn test_release_all() {
        let mut manager = LockManager::new();
        manager.grant(tx(1), 1, KeyLockMode::Exclusive);
        manager.grant(tx(1), 2, KeyLockMode::Shared);
        manager.grant(tx(2), 2, KeyLockMode::Shared);

        manager.release_all(tx(1));

        assert!(!manager.has_locks(tx(1)));
        assert!(manager.has_locks(tx(2)));
        assert_eq!(
            manager.check(tx(3), 1, KeyLockMode::Exclusive),
            LockAttemptResult::WouldGrant
        );
    }

    #[test]
    fn test_read_lock_from_hint() {
        assert_eq!(KeyLockMode::for_read(LockingHints::None), KeyLockMode::Shared);
        assert_eq!(KeyLockMode::for_read(LockingHints::Update), KeyLockMode::Update);
        assert_eq!(
            KeyLockMode::for_read(LockingHints::Exclusive),
            KeyLockMode::Exclusive
        );
    }
}
