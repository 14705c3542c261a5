//! Multi-Version Concurrency Control for store rows
//!
//! Every write creates or retires a version tagged with the writing
//! transaction. Commit stamps those versions with a commit sequence number;
//! snapshot readers see exactly the versions committed at or before the
//! sequence they started from, plus their own uncommitted writes.

use reliable_common::{RowId, TransactionId};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// A versioned value in storage
#[derive(Debug, Clone)]
pub struct Version<V> {
    /// The actual value
    pub value: V,
    /// Transaction that created this version
    pub created_by: TransactionId,
    /// Commit sequence of the creator, `None` while uncommitted
    pub created_seq: Option<u64>,
    /// Transaction that deleted this version (if any)
    pub deleted_by: Option<TransactionId>,
    /// Commit sequence of the deleter, `None` while uncommitted
    pub deleted_seq: Option<u64>,
}

/// Point of view of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadView {
    /// Reading transaction; its own writes are always visible to it
    pub txn: TransactionId,
    /// Commit sequence to read as of, `None` for the latest committed state
    pub as_of: Option<u64>,
}

impl ReadView {
    /// Latest committed state plus own writes
    pub fn latest(txn: TransactionId) -> Self {
        Self { txn, as_of: None }
    }

    /// Committed state as of `seq` plus own writes
    pub fn snapshot(txn: TransactionId, seq: u64) -> Self {
        Self {
            txn,
            as_of: Some(seq),
        }
    }

    fn includes(&self, seq: u64) -> bool {
        self.as_of.is_none_or(|as_of| seq <= as_of)
    }
}

impl<V> Version<V> {
    fn is_visible(&self, view: &ReadView) -> bool {
        let created_visible = self.created_by == view.txn
            || self.created_seq.is_some_and(|seq| view.includes(seq));
        if !created_visible {
            return false;
        }

        match self.deleted_by {
            None => true,
            // We don't see our own deletes
            Some(deleter) if deleter == view.txn => false,
            Some(_) => match self.deleted_seq {
                None => true,
                Some(seq) => !view.includes(seq),
            },
        }
    }

    fn is_own_uncommitted(&self, txn: TransactionId) -> bool {
        self.created_by == txn && self.created_seq.is_none()
    }
}

/// Versioned rows of one store
#[derive(Debug)]
pub struct VersionStore<V> {
    /// All versions of all keys, oldest first
    versions: BTreeMap<RowId, Vec<Version<V>>>,

    /// Keys written by each active transaction
    write_sets: HashMap<TransactionId, BTreeSet<RowId>>,

    /// Sequence number of the last commit
    last_commit_seq: u64,

    /// Snapshot sequences in use (seq -> number of readers)
    snapshots: BTreeMap<u64, usize>,

    /// Committed deletions waiting to be pruned, in commit order
    retired: VecDeque<(u64, RowId)>,
}

impl<V> Default for VersionStore<V> {
    fn default() -> Self {
        Self {
            versions: BTreeMap::new(),
            write_sets: HashMap::new(),
            last_commit_seq: 0,
            snapshots: BTreeMap::new(),
            retired: VecDeque::new(),
        }
    }
}

impl<V: Clone> VersionStore<V> {
    /// Create an empty version store
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last commit
    pub fn last_commit_seq(&self) -> u64 {
        self.last_commit_seq
    }

    /// Pin the current commit sequence for a snapshot reader
    pub fn register_snapshot(&mut self) -> u64 {
        let seq = self.last_commit_seq;
        *self.snapshots.entry(seq).or_default() += 1;
        seq
    }

    /// Unpin a snapshot sequence
    pub fn release_snapshot(&mut self, seq: u64) {
        if let Some(count) = self.snapshots.get_mut(&seq) {
            *count -= 1;
            if *count == 0 {
                self.snapshots.remove(&seq);
            }
        }
    }

    /// Get the visible value of a key
    pub fn get(&self, key: RowId, view: &ReadView) -> Option<&V> {
        self.find_visible(key, view).map(|v| &v.value)
    }

    /// Check if a key is visible
    pub fn exists(&self, key: RowId, view: &ReadView) -> bool {
        self.find_visible(key, view).is_some()
    }

    /// All keys visible to a reader, ascending
    pub fn keys(&self, view: &ReadView) -> Vec<RowId> {
        self.versions
            .iter()
            .filter(|(_, versions)| versions.iter().any(|v| v.is_visible(view)))
            .map(|(key, _)| *key)
            .collect()
    }

    /// Write a value for a key
    ///
    /// Replaces our own uncommitted version in place, otherwise retires the
    /// currently visible version (if any) and adds a new one.
    pub fn put(&mut self, key: RowId, value: V, txn: TransactionId) {
        let view = ReadView::latest(txn);
        let versions = self.versions.entry(key).or_default();

        if let Some(version) = versions.iter_mut().rev().find(|v| v.is_visible(&view)) {
            if version.is_own_uncommitted(txn) {
                version.value = value;
                return;
            }
            version.deleted_by = Some(txn);
        }

        versions.push(Version {
            value,
            created_by: txn,
            created_seq: None,
            deleted_by: None,
            deleted_seq: None,
        });
        self.write_sets.entry(txn).or_default().insert(key);
    }

    /// Delete a key, returning the value it had
    pub fn delete(&mut self, key: RowId, txn: TransactionId) -> Option<V> {
        let view = ReadView::latest(txn);
        let versions = self.versions.get_mut(&key)?;
        let index = versions.iter().rposition(|v| v.is_visible(&view))?;

        let value = if versions[index].is_own_uncommitted(txn) {
            // Nobody else ever saw it
            let removed = versions.remove(index);
            if versions.is_empty() {
                self.versions.remove(&key);
            }
            removed.value
        } else {
            versions[index].deleted_by = Some(txn);
            versions[index].value.clone()
        };

        self.write_sets.entry(txn).or_default().insert(key);
        Some(value)
    }

    /// Stamp a transaction's writes with a new commit sequence
    pub fn commit(&mut self, txn: TransactionId) -> u64 {
        let Some(keys) = self.write_sets.remove(&txn) else {
            return self.last_commit_seq;
        };

        self.last_commit_seq += 1;
        let seq = self.last_commit_seq;

        for key in keys {
            let Some(versions) = self.versions.get_mut(&key) else {
                continue;
            };
            for version in versions.iter_mut() {
                if version.is_own_uncommitted(txn) {
                    version.created_seq = Some(seq);
                }
                if version.deleted_by == Some(txn) && version.deleted_seq.is_none() {
                    version.deleted_seq = Some(seq);
                    self.retired.push_back((seq, key));
                }
            }
        }

        seq
    }

    /// Discard a transaction's writes
    pub fn abort(&mut self, txn: TransactionId) {
        let Some(keys) = self.write_sets.remove(&txn) else {
            return;
        };

        for key in keys {
            let Some(versions) = self.versions.get_mut(&key) else {
                continue;
            };
            versions.retain(|v| !v.is_own_uncommitted(txn));
            for version in versions.iter_mut() {
                if version.deleted_by == Some(txn) && version.deleted_seq.is_none() {
                    version.deleted_by = None;
                }
            }
            if versions.is_empty() {
                self.versions.remove(&key);
            }
        }
    }

    /// Drop retired versions that no pinned snapshot can still see
    pub fn prune(&mut self) {
        let horizon = self
            .snapshots
            .keys()
            .next()
            .copied()
            .unwrap_or(self.last_commit_seq);

        while let Some(&(seq, key)) = self.retired.front() {
            if seq > horizon {
                break;
            }
            self.retired.pop_front();

            if let Some(versions) = self.versions.get_mut(&key) {
                versions.retain(|v| v.deleted_seq.is_none_or(|deleted| deleted > horizon));
                if versions.is_empty() {
                    self.versions.remove(&key);
                }
            }
        }
    }

    /// Total number of stored versions, live or retired
    pub fn version_count(&self) -> usize {
        self.versions.values().map(Vec::len).sum()
    }

    fn find_visible(&self, key: RowId, view: &ReadView) -> Option<&Version<V>> {
        self.versions
            .get(&key)?
            .iter()
            .rev()
            .find(|v| v.is_visible(view))
    }
}
