//! Copy policy applied to items entering and leaving a queue

use std::fmt;
use std::sync::Arc;

/// Deep-copy function for queue items
pub type DeepCopy<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// How items are copied at the queue boundary
///
/// Resolved once when the queue is initialized; `Identity` hands values
/// through unchanged.
pub enum ClonePolicy<T> {
    Identity,
    DeepCopy(DeepCopy<T>),
}

impl<T> ClonePolicy<T> {
    /// Resolve the policy from the cloning flag and an optional copier
    pub fn resolve(automatic_cloning: bool, copier: Option<DeepCopy<T>>) -> Self {
        match (automatic_cloning, copier) {
            (true, Some(copier)) => ClonePolicy::DeepCopy(copier),
            _ => ClonePolicy::Identity,
        }
    }

    /// Apply the policy to an owned item
    pub fn apply(&self, item: T) -> T {
        match self {
            ClonePolicy::Identity => item,
            ClonePolicy::DeepCopy(copier) => copier(&item),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, ClonePolicy::Identity)
    }
}

impl<T> Clone for ClonePolicy<T> {
    fn clone(&self) -> Self {
        match self {
            ClonePolicy::Identity => ClonePolicy::Identity,
            ClonePolicy::DeepCopy(copier) => ClonePolicy::DeepCopy(copier.clone()),
        }
    }
}

impl<T> fmt::Debug for ClonePolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClonePolicy::Identity => f.write_str("Identity"),
            ClonePolicy::DeepCopy(_) => f.write_str("DeepCopy"),
        }
    }
}
