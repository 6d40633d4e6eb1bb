// In crates/database/src/commit.rs

use chrono::{DateTime, Utc};
use core_types::{
    FillId, Fill, Holding, HoldingId, HoldingStatus, OpenLot, Order, OrderId, OrderStatus,
    Symbol, Transaction, TransactionKind, UserId,
};
use rust_decimal::Decimal;

/// Everything one ledger mutation writes, applied all-or-nothing by
/// [`LedgerStore::commit`](crate::LedgerStore::commit).
///
/// Writes are applied in this order: order, balance (with its transaction),
/// fills, lots, holding. If any precondition fails nothing is written.
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    pub user_id: UserId,
    pub order: Option<OrderWrite>,
    pub balance: Option<BalanceChange>,
    pub fills: Vec<Fill>,
    pub lots: Vec<LotWrite>,
    pub holding: Option<HoldingWrite>,
}

impl LedgerCommit {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            order: None,
            balance: None,
            fills: Vec::new(),
            lots: Vec::new(),
            holding: None,
        }
    }

    pub fn with_order(mut self, write: OrderWrite) -> Self {
        self.order = Some(write);
        self
    }

    pub fn with_balance(mut self, change: BalanceChange) -> Self {
        self.balance = Some(change);
        self
    }

    pub fn with_fill(mut self, fill: Fill) -> Self {
        self.fills.push(fill);
        self
    }

    pub fn with_lot(mut self, write: LotWrite) -> Self {
        self.lots.push(write);
        self
    }

    pub fn with_holding(mut self, write: HoldingWrite) -> Self {
        self.holding = Some(write);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_none()
            && self.balance.is_none()
            && self.fills.is_empty()
            && self.lots.is_empty()
            && self.holding.is_none()
    }
}

/// A signed cash movement and the audit entry describing it.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    /// Added to `virtual_balance`. A debit that would leave it negative fails the commit.
    pub delta: Decimal,
    pub transaction: TransactionDraft,
}

/// The caller-supplied part of a [`Transaction`]; the store fills in ids,
/// currency and the before/after snapshots.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub symbol: Option<Symbol>,
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    pub total_value: Option<Decimal>,
    pub profit_loss: Option<Decimal>,
    pub description: String,
}

impl TransactionDraft {
    pub fn cash(kind: TransactionKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            symbol: None,
            quantity: None,
            price: None,
            total_value: None,
            profit_loss: None,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum OrderWrite {
    /// Stores a new order as given.
    Insert(Order),
    /// Moves an existing order out of `from`. Fails with a conflict if the
    /// stored status is no longer `from`.
    Transition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        execution: Option<ExecutionDetails>,
        reason: Option<String>,
    },
}

/// Execution metadata written when an order is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDetails {
    pub price: Decimal,
    pub executed_at: DateTime<Utc>,
    pub profit_loss: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub enum HoldingWrite {
    /// Opens a position. Fails with a conflict if the user already holds the symbol.
    Create(Holding),
    /// Replaces a position. Fails with a conflict unless the stored version is
    /// `expected_version`; the stored version becomes `expected_version + 1`.
    Update { holding: Holding, expected_version: i64 },
    Delete { id: HoldingId, expected_version: i64 },
}

#[derive(Debug, Clone)]
pub enum LotWrite {
    Open(OpenLot),
    /// Sets a lot's remaining quantity, removing the lot at zero. Fails with a
    /// conflict unless the stored remaining quantity is `expected_remaining`.
    Reduce {
        fill_id: FillId,
        expected_remaining: i64,
        remaining: i64,
    },
}

/// What a successful commit produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    /// The transaction appended for the balance change, if there was one.
    pub transaction: Option<Transaction>,
}

impl CommitReceipt {
    pub fn balance_after(&self) -> Option<Decimal> {
        self.transaction.as_ref().map(|t| t.balance_after)
    }
}

/// Mark-to-market fields refreshed by revaluation. Does not bump the holding version.
///
/// Only applied while the holding is still at `expected_version`: a valuation worked
/// out against a position that has since been bought into or sold from is discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub expected_version: i64,
    pub last_price: Decimal,
    pub profit_loss: Decimal,
    pub status: HoldingStatus,
    pub updated_at: DateTime<Utc>,
}
