// In crates/core-types/src/error.rs

use crate::ledger::{MAX_AMOUNT, MAX_PRICE, MAX_QUANTITY};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Quantity must be a whole number of shares between 1 and {max}, got {0}", max = MAX_QUANTITY)]
    InvalidQuantity(i64),

    #[error("Price must be positive and at most {max}, got {0}", max = MAX_PRICE)]
    InvalidPrice(Decimal),

    #[error("Amount must be positive and at most {max}, got {0}", max = MAX_AMOUNT)]
    InvalidAmount(Decimal),

    #[error("Symbol must not be empty")]
    EmptySymbol,

    #[error("Invalid symbol `{0}`: only letters, digits, '.', '-' and '^' are allowed, up to 20 characters")]
    InvalidSymbol(String),

    #[error("{0} is out of range")]
    Overflow(&'static str),

    #[error("Unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
