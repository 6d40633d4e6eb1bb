// In crates/web-server/src/types.rs

use core_types::{Fill, Holding, Order, OrderStatus};
use execution::{StatsPeriod, TradeOutcome};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct BatchPriceRequest {
    pub symbols: Vec<String>,
}

/// Query parameters of `GET /orders` (e.g. `?status=pending`).
#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
}

impl OrdersQuery {
    /// Parses the status filter case-insensitively.
    pub fn status(&self) -> Result<Option<OrderStatus>, String> {
        match self.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("") | Some("all") => Ok(None),
            Some("pending") => Ok(Some(OrderStatus::Pending)),
            Some("accepted") => Ok(Some(OrderStatus::Accepted)),
            Some("cancelled") => Ok(Some(OrderStatus::Cancelled)),
            Some(other) => Err(format!("unknown order status `{}`", other)),
        }
    }
}

/// Query parameters of `GET /transactions/stats` (e.g. `?period=week`).
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
}

impl StatsQuery {
    /// Defaults to a month when absent.
    pub fn period(&self) -> Result<StatsPeriod, String> {
        match self.period.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("") => Ok(StatsPeriod::default()),
            Some("day") => Ok(StatsPeriod::Day),
            Some("week") => Ok(StatsPeriod::Week),
            Some("month") => Ok(StatsPeriod::Month),
            Some("year") => Ok(StatsPeriod::Year),
            Some(other) => Err(format!("unknown period `{}`", other)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WatchRequest {
    pub symbol: String,
}

/// The body returned for a submitted buy or sell.
#[derive(Debug, Serialize)]
pub struct TradeResponse {
    /// `executed` for a filled market order, `queued` for a pending limit order.
    pub status: &'static str,
    pub order: Order,
    pub fill: Option<Fill>,
    pub holding: Option<Holding>,
    pub balance: Option<Decimal>,
}

impl From<TradeOutcome> for TradeResponse {
    fn from(outcome: TradeOutcome) -> Self {
        match outcome {
            TradeOutcome::Executed(fill) => TradeResponse {
                status: "executed",
                balance: Some(fill.balance_after()),
                order: fill.order,
                fill: Some(fill.fill),
                holding: fill.holding,
            },
            TradeOutcome::Queued(order) => TradeResponse {
                status: "queued",
                order,
                fill: None,
                holding: None,
                balance: None,
            },
        }
    }
}
