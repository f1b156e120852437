use crate::domain::balance::Money;
use crate::domain::order::UserId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Order {number} already uploaded (same user: {same_user})")]
    OrderAlreadyUploaded { number: String, same_user: bool },
    #[error("Unknown order: {0}")]
    UnknownOrder(String),
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Money, requested: Money },
    #[error("Balance overflow: crediting {amount} to user {user}")]
    BalanceOverflow { user: UserId, amount: Money },
    #[error("Accrual service error: {0}")]
    Accrual(#[from] AccrualError),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Failures talking to the accrual service. All of them are transient from
/// the scheduler's point of view.
#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
