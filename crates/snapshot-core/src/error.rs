//! Error taxonomy for the snapshot engine.
//!
//! Every error surfaced on the response channel is one of these kinds. The
//! stream layer uses [`SnapshotError::is_retryable`] to decide between
//! redelivery and dead-lettering.

use std::time::Duration;

/// Errors surfaced by the engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unable to map blockchain from chain id {0}")]
    InvalidChain(String),

    #[error("unsupported event {0}")]
    UnsupportedEvent(String),

    #[error("malformed event payload: {0}")]
    MalformedEvent(String),

    #[error("rpc call failed: {0}")]
    RpcFailed(String),

    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("lock unavailable for {0}")]
    LockUnavailable(String),

    #[error("cannot format negative amount {0}")]
    NegativeAmount(String),

    #[error("failed to format amount {amount} with {decimals} decimals: {reason}")]
    FormatFailed {
        amount: String,
        decimals: u8,
        reason: String,
    },

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid numeric value {0}")]
    InvalidAmount(String),
}

impl SnapshotError {
    /// Whether redelivering the message can be expected to succeed.
    ///
    /// Transient failures (RPC, store, lock, timeout) are retryable; data
    /// and classification failures are final and belong in the DLQ.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SnapshotError::RpcFailed(_)
                | SnapshotError::Store(_)
                | SnapshotError::Timeout(_)
                | SnapshotError::LockUnavailable(_)
        )
    }
}

/// Errors produced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(SnapshotError::RpcFailed("boom".into()).is_retryable());
        assert!(SnapshotError::LockUnavailable("k".into()).is_retryable());
        assert!(SnapshotError::Store(StoreError::Database("x".into())).is_retryable());
        assert!(!SnapshotError::InvalidChain("999".into()).is_retryable());
        assert!(!SnapshotError::UnknownToken("0xdead".into()).is_retryable());
        assert!(!SnapshotError::NegativeAmount("-1".into()).is_retryable());
    }
}
