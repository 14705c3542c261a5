//! Queue configuration

use reliable_common::{DEFAULT_TIMEOUT, OperationOptions};
use std::time::Duration;

/// Configuration for a `DistributedQueue`
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Timeout of calls made without explicit options
    pub default_timeout: Duration,

    /// Copy items at the queue boundary when a deep-copy function is set
    pub automatic_cloning: bool,

    /// Budget for pointer-advance and compensation writes
    ///
    /// `None` reuses the caller's timeout.
    pub compensation_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            automatic_cloning: true,
            compensation_timeout: None,
        }
    }
}

impl QueueConfig {
    /// Set the default timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Enable or disable automatic cloning
    pub fn with_automatic_cloning(mut self, enabled: bool) -> Self {
        self.automatic_cloning = enabled;
        self
    }

    /// Set a fixed budget for pointer-advance and compensation writes
    pub fn with_compensation_timeout(mut self, timeout: Duration) -> Self {
        self.compensation_timeout = Some(timeout);
        self
    }

    /// Options used by calls without explicit options
    pub fn default_options(&self) -> OperationOptions {
        OperationOptions::new(self.default_timeout)
    }

    /// Options for writes that must not be abandoned once started
    pub(crate) fn pointer_options(&self, caller: &OperationOptions) -> OperationOptions {
        let options = caller.non_cancellable();
        match self.compensation_timeout {
            Some(timeout) => options.with_timeout(timeout),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(4));
        assert!(config.automatic_cloning);
        assert_eq!(config.compensation_timeout, None);
    }

    #[test]
    fn test_pointer_options_ignore_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let caller = OperationOptions::new(Duration::from_millis(300)).with_cancellation(token);

        let plain = QueueConfig::default().pointer_options(&caller);
        assert!(!plain.is_cancelled());
        assert_eq!(plain.timeout, Duration::from_millis(300));

        let fixed = QueueConfig::default()
            .with_compensation_timeout(Duration::from_secs(9))
            .pointer_options(&caller);
        assert_eq!(fixed.timeout, Duration::from_secs(9));
    }
}
