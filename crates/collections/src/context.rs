//! Queue initialization context
//!
//! Persisted alongside the queue's registration so every replica initializes
//! the queue the same way.

use crate::error::{QueueError, Result};
use serde::{Deserialize, Serialize};

/// Current context format version
pub const CONTEXT_VERSION: u32 = 1;

/// Settings a queue is registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInitializationContext {
    pub version: u32,
    pub automatic_cloning: bool,
}

impl QueueInitializationContext {
    pub fn new(automatic_cloning: bool) -> Self {
        Self {
            version: CONTEXT_VERSION,
            automatic_cloning,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| QueueError::InitializationContext(e.to_string()))
    }

    /// Deserialize from bytes, rejecting versions below 1
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let context: Self = serde_json::from_slice(bytes)
            .map_err(|e| QueueError::InitializationContext(e.to_string()))?;

        if context.version < 1 {
            return Err(QueueError::InitializationContext(format!(
                "version must be at least 1, got {}",
                context.version
            )));
        }

        Ok(context)
    }
}
