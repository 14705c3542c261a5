//! Store configuration

use crate::comparer::{KeyComparer, NaturalOrder};
use std::fmt;
use std::sync::Arc;

/// Configuration for a `MemoryStore`
#[derive(Clone)]
pub struct StoreConfig {
    /// Ordering used by ordered enumerations
    pub comparer: Arc<dyn KeyComparer>,

    /// Drop versions no snapshot can see when a transaction ends
    pub prune_versions: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            comparer: Arc::new(NaturalOrder),
            prune_versions: true,
        }
    }
}

impl StoreConfig {
    /// Set the key comparer
    pub fn with_comparer(mut self, comparer: Arc<dyn KeyComparer>) -> Self {
        self.comparer = comparer;
        self
    }

    /// Enable or disable version pruning
    pub fn with_prune_versions(mut self, enabled: bool) -> Self {
        self.prune_versions = enabled;
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("prune_versions", &self.prune_versions)
            .finish_non_exhaustive()
    }
}
