// In crates/database/src/error.rs

use core_types::UserId;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to connect to the database")]
    ConnectionError(#[from] sqlx::Error),
    #[error("Database migration failed: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("Database operation failed: {0}")]
    OperationFailed(sqlx::Error),

    /// A compare-and-swap precondition of a commit did not hold. Nothing was written.
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    /// A debit would have made the balance negative. Nothing was written.
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Decimal, requested: Decimal },
    /// A balance or running total would leave the representable range. Nothing was written.
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    #[error("Account {0} not found")]
    AccountNotFound(UserId),
    #[error("Stored data is invalid: {0}")]
    Corrupt(String),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Whether re-reading and re-planning the write may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<core_types::Error> for Error {
    fn from(e: core_types::Error) -> Self {
        Error::Corrupt(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
