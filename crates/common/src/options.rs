//! Per-call timeout and cancellation

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Timeout used when the caller does not pass one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// Timeout and cancellation token passed into every store call
#[derive(Debug, Clone)]
pub struct OperationOptions {
    /// Budget for the call, including time spent waiting for locks
    pub timeout: Duration,

    /// Token observed before and while the call waits
    pub cancellation: CancellationToken,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl OperationOptions {
    /// Options with the given timeout and a token that is never cancelled
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cancellation token
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Same timeout, fresh token that nobody else holds
    ///
    /// Used for writes that must not be abandoned once started.
    pub fn non_cancellable(&self) -> Self {
        Self::new(self.timeout)
    }

    /// Whether the caller has requested cancellation
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        let options = OperationOptions::default();
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert!(!options.is_cancelled());
    }

    #[test]
    fn test_non_cancellable_keeps_timeout_drops_token() {
        let token = CancellationToken::new();
        let options = OperationOptions::new(Duration::from_millis(250)).with_cancellation(token.clone());

        token.cancel();
        assert!(options.is_cancelled());

        let detached = options.non_cancellable();
        assert_eq!(detached.timeout, Duration::from_millis(250));
        assert!(!detached.is_cancelled());
    }
}
