use crate::domain::account::AccountId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failure taxonomy for ledger operations.
///
/// Caller errors (`InvalidAmount`, `AccountNotFound`, `InsufficientBalance`,
/// `SelfTransfer`) must not be retried. `Conflict` is transient: the whole
/// operation is safe to re-run from scratch.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("insufficient balance in account {0}")]
    InsufficientBalance(AccountId),
    #[error("source and destination are the same account: {0}")]
    SelfTransfer(AccountId),
    #[error("account already exists: {0}")]
    AccountExists(AccountId),
    #[error("concurrent update conflict, operation may be retried")]
    Conflict,
    #[error("account store unavailable")]
    StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// True for transient failures where re-running the whole operation is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict)
    }

    pub fn store_unavailable<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LedgerError::StoreUnavailable(Box::new(cause))
    }
}
