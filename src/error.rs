use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors raised by the ledger core.
///
/// Each variant is a stable kind that the routing layer maps to a transport
/// status code; the message is what a caller should read.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("store error: {0}")]
    Store(String),
}
