// In crates/execution/src/error.rs

use core_types::{OrderId, Symbol, TransactionId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Insufficient quantity: requested {requested}, available {available}")]
    InsufficientQuantity { requested: i64, available: i64 },

    #[error("Order {0} not found or no longer pending")]
    OrderNotFound(OrderId),

    #[error("No holding in {0}")]
    HoldingNotFound(Symbol),

    #[error("Account {0} not found")]
    AccountNotFound(UserId),

    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("{0} is already in the watchlist")]
    AlreadyWatched(Symbol),

    #[error("{0} is not in the watchlist")]
    NotWatched(Symbol),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error(transparent)]
    PriceUnavailable(#[from] pricing::Error),

    /// A concurrent write invalidated the plan. Nothing was written; retrying may succeed.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// The ledger write failed. Nothing was written.
    #[error("Execution failed: {0}")]
    Store(database::Error),
}

impl Error {
    /// A stable, machine-readable name for API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::InsufficientQuantity { .. } => "insufficient_quantity",
            Error::OrderNotFound(_) => "order_not_found",
            Error::HoldingNotFound(_) => "holding_not_found",
            Error::AccountNotFound(_) => "account_not_found",
            Error::TransactionNotFound(_) => "transaction_not_found",
            Error::AlreadyWatched(_) => "already_watched",
            Error::NotWatched(_) => "not_watched",
            Error::InvalidOrder(_) => "invalid_order",
            Error::PriceUnavailable(_) => "upstream_unavailable",
            Error::Conflict(_) => "conflict",
            Error::Store(_) => "execution_failure",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<database::Error> for Error {
    fn from(e: database::Error) -> Self {
        match e {
            database::Error::Conflict(msg) => Error::Conflict(msg),
            database::Error::InsufficientFunds { available, requested } => {
                Error::InsufficientBalance { required: requested, available }
            }
            database::Error::AccountNotFound(user_id) => Error::AccountNotFound(user_id),
            database::Error::OutOfRange(msg) => Error::InvalidOrder(msg),
            other => Error::Store(other),
        }
    }
}

impl From<core_types::Error> for Error {
    fn from(e: core_types::Error) -> Self {
        Error::InvalidOrder(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
