//! Ledger error types.

use ledgersim_sim::OperationError;
use ledgersim_store::StoreError;
use thiserror::Error;

/// Failure of the ledger itself: corrupt state, bad genesis, broken books.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed genesis: {0}")]
    GenesisJson(#[from] serde_json::Error),

    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error("corrupt store key {0}")]
    CorruptKey(String),

    /// A module-internal transfer the books say must succeed did not.
    #[error("ledger accounting error: {0}")]
    Accounting(String),
}

/// Result of delivering a transaction that did not apply.
#[derive(Debug, Error)]
pub enum TxError {
    /// The transaction breaks a business rule; state is unchanged.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl TxError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl From<StoreError> for TxError {
    fn from(e: StoreError) -> Self {
        Self::Internal(AppError::Store(e))
    }
}

/// Module-internal flows (end-block, fee allocation) cannot be rejected;
/// a rejection there means the books are wrong.
impl From<TxError> for AppError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::Rejected(reason) => AppError::Accounting(reason),
            TxError::Internal(inner) => inner,
        }
    }
}

impl From<TxError> for OperationError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::Rejected(reason) => OperationError::Skip(reason),
            TxError::Internal(inner) => OperationError::Fatal(inner.to_string()),
        }
    }
}
