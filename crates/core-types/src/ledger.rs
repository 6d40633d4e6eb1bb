// In crates/core-types/src/ledger.rs

use crate::types::{
    FillId, HoldingId, HoldingStatus, OrderId, OrderMode, OrderStatus, Side, Symbol,
    TransactionId, TransactionKind, UserId,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Largest share count a single order may carry.
pub const MAX_QUANTITY: i64 = 1_000_000_000;
/// Largest per-share price accepted (10^12).
pub const MAX_PRICE: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);
/// Largest single deposit or withdrawal (10^15).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x3_8D7E, 0, false, 0);

/// `price × quantity`, failing instead of overflowing.
pub fn checked_total(price: Decimal, quantity: i64) -> Result<Decimal> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or(Error::Overflow("price × quantity"))
}

/// A user's cash account in the simulation's display currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub username: String,
    /// Available cash. Never negative.
    pub virtual_balance: Decimal,
    pub total_deposited: Decimal,
    pub total_withdrawn: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates an empty account.
    pub fn open(user_id: UserId, username: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            virtual_balance: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            currency: currency.into(),
            created_at: Utc::now(),
        }
    }
}

/// An intent to trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub name: String,
    pub side: Side,
    pub mode: OrderMode,
    pub quantity: i64,
    /// The price the user saw when submitting the order.
    pub price: Decimal,
    /// The trigger price of a `Limit` order.
    pub limit_price: Option<Decimal>,
    /// `quantity × price` for market orders, `quantity × limit_price` for limit orders.
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub cancellation_reason: Option<String>,
    pub executed_price: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,
    pub profit_loss: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a market order, validated but not yet executed.
    pub fn market(
        user_id: UserId,
        symbol: Symbol,
        name: impl Into<String>,
        side: Side,
        quantity: i64,
        price: Decimal,
    ) -> Result<Self> {
        validate_quantity(quantity)?;
        validate_price(price)?;
        Ok(Self {
            id: OrderId::new(),
            user_id,
            symbol,
            name: name.into(),
            side,
            mode: OrderMode::Market,
            quantity,
            price,
            limit_price: None,
            total_price: checked_total(price, quantity)?,
            status: OrderStatus::Pending,
            cancellation_reason: None,
            executed_price: None,
            executed_at: None,
            profit_loss: None,
            created_at: Utc::now(),
        })
    }

    /// Builds a pending limit order.
    ///
    /// `reference_price` is the market price at submission, kept for display only;
    /// when it is unknown the limit price is used instead.
    pub fn limit(
        user_id: UserId,
        symbol: Symbol,
        name: impl Into<String>,
        side: Side,
        quantity: i64,
        limit_price: Decimal,
        reference_price: Option<Decimal>,
    ) -> Result<Self> {
        validate_quantity(quantity)?;
        validate_price(limit_price)?;
        Ok(Self {
            id: OrderId::new(),
            user_id,
            symbol,
            name: name.into(),
            side,
            mode: OrderMode::Limit,
            quantity,
            price: reference_price.unwrap_or(limit_price),
            limit_price: Some(limit_price),
            total_price: checked_total(limit_price, quantity)?,
            status: OrderStatus::Pending,
            cancellation_reason: None,
            executed_price: None,
            executed_at: None,
            profit_loss: None,
            created_at: Utc::now(),
        })
    }

    pub fn is_pending_limit(&self) -> bool {
        self.status == OrderStatus::Pending && self.mode == OrderMode::Limit
    }
}

/// The aggregated open position of one user in one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: HoldingId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub name: String,
    pub quantity: i64,
    /// Volume-weighted average cost of the shares bought since the holding was opened.
    pub avg_price: Decimal,
    /// The last observed market price.
    pub last_price: Decimal,
    /// Cost basis of the remaining shares: `quantity × avg_price`.
    pub total_price: Decimal,
    /// Unrealized P&L at `last_price`.
    pub profit_loss: Decimal,
    pub status: HoldingStatus,
    /// Bumped by every quantity-changing write; used for optimistic concurrency.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Holding {
    pub fn market_value(&self) -> Result<Decimal> {
        checked_total(self.last_price, self.quantity)
    }

    /// Unrealized P&L of the holding at `price`. `None` if it does not fit a `Decimal`.
    pub fn checked_unrealized_pnl(&self, price: Decimal) -> Option<Decimal> {
        price
            .checked_sub(self.avg_price)?
            .checked_mul(Decimal::from(self.quantity))
    }
}

/// An immutable record of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub holding_id: HoldingId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: i64,
    pub price: Decimal,
    pub total_price: Decimal,
    /// Set on SELL fills only.
    pub realized_pnl: Option<Decimal>,
    pub executed_at: DateTime<Utc>,
}

/// The unsold remainder of a BUY fill.
///
/// Lots are consumed oldest first by sells; the lot disappears once `remaining` reaches zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLot {
    pub fill_id: FillId,
    pub user_id: UserId,
    pub holding_id: HoldingId,
    pub symbol: Symbol,
    pub remaining: i64,
    pub price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl OpenLot {
    /// Opens a lot for a BUY fill.
    pub fn from_fill(fill: &Fill) -> Self {
        Self {
            fill_id: fill.id,
            user_id: fill.user_id,
            holding_id: fill.holding_id,
            symbol: fill.symbol.clone(),
            remaining: fill.quantity,
            price: fill.price,
            opened_at: fill.executed_at,
        }
    }
}

/// An audit entry for a cash movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Signed cash delta applied to the balance.
    pub amount: Decimal,
    pub currency: String,
    pub symbol: Option<Symbol>,
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    pub total_value: Option<Decimal>,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub profit_loss: Option<Decimal>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A symbol a user follows without holding it. One entry per user and symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub user_id: UserId,
    pub symbol: Symbol,
    pub added_at: DateTime<Utc>,
}

pub fn validate_quantity(quantity: i64) -> Result<()> {
    if quantity <= 0 || quantity > MAX_QUANTITY {
        return Err(Error::InvalidQuantity(quantity));
    }
    Ok(())
}

pub fn validate_price(price: Decimal) -> Result<()> {
    if price <= Decimal::ZERO || price > MAX_PRICE {
        return Err(Error::InvalidPrice(price));
    }
    Ok(())
}

pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO || amount > MAX_AMOUNT {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn acme() -> Symbol {
        Symbol::new("ACME").unwrap()
    }

    #[test]
    fn market_order_totals_at_requested_price() {
        let order = Order::market(UserId::new(), acme(), "Acme", Side::Buy, 10, dec!(100)).unwrap();
        assert_eq!(order.total_price, dec!(1000));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.limit_price, None);
    }

    #[test]
    fn limit_order_reserves_at_limit_price() {
        let order =
            Order::limit(UserId::new(), acme(), "Acme", Side::Buy, 10, dec!(50), Some(dec!(55))).unwrap();
        assert_eq!(order.total_price, dec!(500));
        assert_eq!(order.price, dec!(55));
        assert!(order.is_pending_limit());
    }

    #[test]
    fn rejects_non_positive_inputs() {
        assert_eq!(
            Order::market(UserId::new(), acme(), "Acme", Side::Buy, 0, dec!(1)),
            Err(Error::InvalidQuantity(0))
        );
        assert_eq!(
            Order::limit(UserId::new(), acme(), "Acme", Side::Sell, 3, dec!(-2), None),
            Err(Error::InvalidPrice(dec!(-2)))
        );
        assert_eq!(validate_amount(dec!(0)), Err(Error::InvalidAmount(dec!(0))));
    }

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(MAX_PRICE, dec!(1000000000000));
        assert_eq!(MAX_AMOUNT, dec!(1000000000000000));
        assert!(validate_quantity(MAX_QUANTITY).is_ok());
        assert!(validate_price(MAX_PRICE).is_ok());
        assert!(validate_amount(MAX_AMOUNT).is_ok());
        // The largest order still has a representable total.
        assert!(checked_total(MAX_PRICE, MAX_QUANTITY).is_ok());
    }

    #[test]
    fn rejects_oversized_inputs() {
        assert_eq!(
            Order::limit(UserId::new(), acme(), "Acme", Side::Buy, i64::MAX, dec!(100000000000), None),
            Err(Error::InvalidQuantity(i64::MAX))
        );
        assert_eq!(
            Order::market(UserId::new(), acme(), "Acme", Side::Buy, 1, MAX_PRICE + dec!(0.01)),
            Err(Error::InvalidPrice(MAX_PRICE + dec!(0.01)))
        );
        assert!(matches!(validate_amount(Decimal::MAX), Err(Error::InvalidAmount(_))));
        assert_eq!(checked_total(Decimal::MAX, 2), Err(Error::Overflow("price × quantity")));
    }

    #[test]
    fn unrealized_pnl_reports_overflow() {
        let holding = Holding {
            id: HoldingId::new(),
            user_id: UserId::new(),
            symbol: acme(),
            name: "Acme".into(),
            quantity: i64::MAX,
            avg_price: dec!(1),
            last_price: Decimal::MAX,
            total_price: Decimal::ZERO,
            profit_loss: Decimal::ZERO,
            status: HoldingStatus::Neutral,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(holding.checked_unrealized_pnl(Decimal::MAX), None);
        assert!(holding.market_value().is_err());
        assert_eq!(
            Holding { quantity: 10, ..holding }.checked_unrealized_pnl(dec!(3)),
            Some(dec!(20))
        );
    }
}
