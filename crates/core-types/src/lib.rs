// In crates/core-types/src/lib.rs

pub mod error;
pub mod ledger;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use error::{Error, Result};
pub use ledger::{
    Account, Fill, Holding, MAX_AMOUNT, MAX_PRICE, MAX_QUANTITY, OpenLot, Order, Transaction,
    WatchlistEntry, checked_total, validate_amount, validate_price, validate_quantity,
};
pub use types::{
    FillId, HoldingId, HoldingStatus, MAX_SYMBOL_LEN, OrderId, OrderMode, OrderStatus, Side, Symbol,
    TransactionId, TransactionKind, UserId,
};
