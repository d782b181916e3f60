use thiserror::Error;

#[derive(Debug, Error)]
pub enum DelayError {
    /// The controller was built without an operation to call.
    #[error("delay controller needs an operation to invoke")]
    InvalidOperand,
    /// The underlying operation failed. Never retried.
    #[error("delayed operation failed")]
    OperationFailure(#[source] anyhow::Error),
}
