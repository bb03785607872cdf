use thiserror::Error;

/// What went wrong while normalizing a provider notification.
/// Adapters never touch the ledger, so these carry no partial state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid receipt: {0}")]
    InvalidReceipt(String),

    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    #[error("verification timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad input — rejected synchronously, never retried.
    #[error("validation: {0}")]
    Validation(String),

    /// Transition from a terminal or mismatched state that is not a
    /// benign idempotent repeat (e.g. over-refund).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Transient persistence failure — safe to retry the whole operation.
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
