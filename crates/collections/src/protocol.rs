//! Two-store pointer advance with compensation
//!
//! A queue mutation first changes the data store, then moves a pointer in the
//! metadata store. If the pointer write fails, the data change is undone with
//! its inverse so both stores keep agreeing inside the outer transaction.

use crate::error::{QueueError, QueueOperation, Result};
use reliable_replicator::Transaction;
use reliable_store::{FailureClass, StoreError};
use std::future::Future;

/// Log, abort the outer transaction and build the invariant error
pub(crate) async fn invariant_violation(
    trace_type: &str,
    operation: QueueOperation,
    txn: &Transaction,
    reason: String,
) -> QueueError {
    tracing::error!(
        queue = %trace_type,
        "Invariant violated during {} in {}: {}",
        operation,
        txn.id(),
        reason
    );

    abort_outer(trace_type, txn).await;
    QueueError::InvariantViolation { operation, reason }
}

/// Abort the outer transaction, logging rather than returning a failure
pub(crate) async fn abort_outer(trace_type: &str, txn: &Transaction) {
    if let Err(e) = txn.abort().await {
        tracing::error!(queue = %trace_type, "Abort of {} failed: {}", txn.id(), e);
    }
}

/// Run the pointer write; on failure undo the data write
///
/// `compensate` returns whether the inverse found the state it expected (the
/// row to remove was present, the row to restore was absent). The outcome is:
/// - pointer write succeeded: `Ok(())`
/// - pointer write failed with an unexpected error, or the inverse found
///   unexpected state: the outer transaction is aborted and
///   `InvariantViolation` is returned
/// - inverse failed: the outer transaction is aborted and
///   `CompensationFailed` is returned
/// - inverse succeeded: the pointer write's error, as `ReplicationTransient`
///   for transient failures and unchanged otherwise
pub(crate) async fn advance_or_compensate<T, A, C, CF>(
    trace_type: &str,
    operation: QueueOperation,
    txn: &Transaction,
    advance: A,
    compensate: C,
) -> Result<()>
where
    A: Future<Output = std::result::Result<T, StoreError>>,
    C: FnOnce() -> CF,
    CF: Future<Output = std::result::Result<bool, StoreError>>,
{
    let original = match advance.await {
        Ok(_) => return Ok(()),
        Err(e) => e,
    };

    let class = original.class();
    if class == FailureClass::Unexpected {
        let reason = format!("pointer write failed: {}", original);
        return Err(invariant_violation(trace_type, operation, txn, reason).await);
    }

    tracing::warn!(
        queue = %trace_type,
        "Pointer write for {} in {} failed ({}), compensating",
        operation,
        txn.id(),
        original
    );

    match compensate().await {
        Ok(true) => match class {
            FailureClass::Transient => Err(QueueError::ReplicationTransient {
                operation,
                source: original,
            }),
            _ => Err(QueueError::Store(original)),
        },
        Ok(false) => {
            let reason = format!(
                "compensation after {} found the data store in an unexpected state",
                original
            );
            Err(invariant_violation(trace_type, operation, txn, reason).await)
        }
        Err(compensation) => {
            tracing::error!(
                queue = %trace_type,
                "Compensation for {} in {} failed: {}; aborting",
                operation,
                txn.id(),
                compensation
            );

            abort_outer(trace_type, txn).await;

            Err(QueueError::CompensationFailed {
                operation,
                txn: txn.id(),
                original,
                compensation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reliable_common::ReplicaRole;
    use reliable_replicator::{Replicator, TransactionState};

    fn begin() -> Transaction {
        Replicator::new("r", ReplicaRole::Primary)
            .begin_transaction()
            .unwrap()
    }

    async fn compensation_must_not_run() -> std::result::Result<bool, StoreError> {
        panic!("compensation must not run")
    }

    #[tokio::test]
    async fn test_success_skips_compensation() {
        let txn = begin();

        let result = advance_or_compensate(
            "r@q",
            QueueOperation::Enqueue,
            &txn,
            async { Ok::<_, StoreError>(5i64) },
            compensation_must_not_run,
        )
        .await;

        assert!(result.is_ok());
        assert!(txn.is_active());
    }

    #[tokio::test]
    async fn test_transient_failure_is_compensated() {
        let txn = begin();

        let result = advance_or_compensate(
            "r@q",
            QueueOperation::Enqueue,
            &txn,
            async { Err::<i64, _>(StoreError::ReplicationQueueFull) },
            || async { Ok::<_, StoreError>(true) },
        )
        .await;

        assert!(matches!(
            result,
            Err(QueueError::ReplicationTransient {
                source: StoreError::ReplicationQueueFull,
                ..
            })
        ));
        assert!(txn.is_active());
    }

    #[tokio::test]
    async fn test_terminal_failure_is_compensated_and_surfaced_unchanged() {
        let txn = begin();

        let result = advance_or_compensate(
            "r@q",
            QueueOperation::Dequeue,
            &txn,
            async { Err::<i64, _>(StoreError::NotPrimary) },
            || async { Ok::<_, StoreError>(true) },
        )
        .await;

        assert!(matches!(result, Err(QueueError::Store(StoreError::NotPrimary))));
    }

    #[tokio::test]
    async fn test_unexpected_failure_aborts() {
        let txn = begin();

        let result = advance_or_compensate(
            "r@q",
            QueueOperation::Enqueue,
            &txn,
            async { Err::<i64, _>(StoreError::OperationTooLarge) },
            compensation_must_not_run,
        )
        .await;

        assert!(matches!(result, Err(QueueError::InvariantViolation { .. })));
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[tokio::test]
    async fn test_failed_compensation_aborts() {
        let txn = begin();

        let result = advance_or_compensate(
            "r@q",
            QueueOperation::Enqueue,
            &txn,
            async { Err::<i64, _>(StoreError::Timeout) },
            || async { Err::<bool, _>(StoreError::Closed("data".into())) },
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, QueueError::CompensationFailed { .. }));
        assert!(matches!(err.surfaced(), Some(StoreError::Timeout)));
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[tokio::test]
    async fn test_missing_row_during_compensation_aborts() {
        let txn = begin();

        let result = advance_or_compensate(
            "r@q",
            QueueOperation::Enqueue,
            &txn,
            async { Err::<i64, _>(StoreError::Timeout) },
            || async { Ok::<_, StoreError>(false) },
        )
        .await;

        assert!(result.unwrap_err().is_invariant_violation());
        assert_eq!(txn.state(), TransactionState::Aborted);
    }
}
