// In crates/execution/src/types.rs

use chrono::{DateTime, Utc};
use core_types::{
    Fill, Holding, Order, OrderMode, Side, Symbol, Transaction, UserId,
};
use pricing::PriceQuote;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where the order behind a fill comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOrigin {
    /// A market order submitted now. Its record is written already `Accepted`.
    Market,
    /// A pending limit order the engine decided to fill.
    Pending(Order),
}

/// A fill to execute at `price`.
#[derive(Debug, Clone, PartialEq)]
pub struct FillRequest {
    pub user_id: UserId,
    pub symbol: Symbol,
    pub name: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Decimal,
    pub origin: OrderOrigin,
}

impl FillRequest {
    pub fn market(
        user_id: UserId,
        symbol: Symbol,
        name: impl Into<String>,
        side: Side,
        quantity: i64,
        price: Decimal,
    ) -> Self {
        Self {
            user_id,
            symbol,
            name: name.into(),
            side,
            quantity,
            price,
            origin: OrderOrigin::Market,
        }
    }

    /// Fills a pending order at the current market price rather than its limit.
    pub fn pending(order: Order, market_price: Decimal) -> Self {
        Self {
            user_id: order.user_id,
            symbol: order.symbol.clone(),
            name: order.name.clone(),
            side: order.side,
            quantity: order.quantity,
            price: market_price,
            origin: OrderOrigin::Pending(order),
        }
    }
}

/// The ledger state a fill produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    /// The order in its final `Accepted` state.
    pub order: Order,
    pub fill: Fill,
    /// The position after the fill; `None` when a sell closed it.
    pub holding: Option<Holding>,
    pub transaction: Transaction,
    pub realized_pnl: Option<Decimal>,
}

impl FillOutcome {
    pub fn balance_after(&self) -> Decimal {
        self.transaction.balance_after
    }
}

/// A buy or sell submitted through the trading service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    /// Display name of the security; defaults to the symbol.
    #[serde(default)]
    pub name: Option<String>,
    pub quantity: i64,
    pub mode: OrderMode,
    /// Execution price of a market order. Fetched from the price source when absent.
    /// For a limit order, the market price seen at submission.
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub limit_price: Option<Decimal>,
}

impl TradeRequest {
    pub fn market(symbol: &str, quantity: i64, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: None,
            quantity,
            mode: OrderMode::Market,
            price: Some(price),
            limit_price: None,
        }
    }

    pub fn limit(symbol: &str, quantity: i64, limit_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: None,
            quantity,
            mode: OrderMode::Limit,
            price: None,
            limit_price: Some(limit_price),
        }
    }
}

/// What a submitted trade turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    /// A market order, filled immediately.
    Executed(FillOutcome),
    /// A limit order, waiting for the engine.
    Queued(Order),
}

impl TradeOutcome {
    pub fn order(&self) -> &Order {
        match self {
            TradeOutcome::Executed(outcome) => &outcome.order,
            TradeOutcome::Queued(order) => order,
        }
    }
}

/// A user's cash and positions at their last marked prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioOverview {
    pub currency: String,
    pub cash: Decimal,
    /// Cost basis of all holdings.
    pub invested: Decimal,
    /// Market value of all holdings at their last price.
    pub current_value: Decimal,
    pub unrealized_pnl: Decimal,
    /// Cash plus current value.
    pub total_value: Decimal,
    pub total_deposited: Decimal,
    pub total_withdrawn: Decimal,
    pub holdings: Vec<HoldingAllocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingAllocation {
    pub symbol: Symbol,
    pub name: String,
    pub quantity: i64,
    pub avg_price: Decimal,
    pub last_price: Decimal,
    pub invested: Decimal,
    pub current_value: Decimal,
    pub profit_loss: Decimal,
    /// Share of the portfolio's current holdings value, in percent.
    pub allocation_pct: Decimal,
}

/// A watchlist entry with its current quote; `None` when the feed failed for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchedSymbol {
    pub symbol: Symbol,
    pub added_at: DateTime<Utc>,
    pub quote: Option<PriceQuote>,
}
