//! Key ordering strategy

use reliable_common::RowId;
use std::cmp::Ordering;

/// Ordering used by ordered enumerations
pub trait KeyComparer: Send + Sync {
    fn compare(&self, a: &RowId, b: &RowId) -> Ordering;
}

/// Natural ascending order of row ids
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl KeyComparer for NaturalOrder {
    fn compare(&self, a: &RowId, b: &RowId) -> Ordering {
        a.cmp(b)
    }
}

/// Descending order of row ids
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseOrder;

impl KeyComparer for ReverseOrder {
    fn compare(&self, a: &RowId, b: &RowId) -> Ordering {
        b.cmp(a)
    }
}
