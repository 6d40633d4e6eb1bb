// --- Ledger event structures, broadcast to the WebSocket stream and logs ---

use chrono::{DateTime, Utc};
use core_types::{HoldingId, HoldingStatus, OrderId, OrderMode, Side, Symbol, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

/// An order was filled, by the trading service or by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderExecuted {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub mode: OrderMode,
    pub quantity: i64,
    pub price: Decimal,
    pub total: Decimal,
    /// Set for SELL fills.
    pub realized_pnl: Option<Decimal>,
    pub balance_after: Decimal,
    /// Shares held after the fill; zero when the position was closed.
    pub holding_quantity: i64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingRevalued {
    pub holding_id: HoldingId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub last_price: Decimal,
    pub profit_loss: Decimal,
    pub status: HoldingStatus,
}

/// Counts of what one engine cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Pending SELL orders cancelled because the holding no longer covers them.
    pub cancelled: usize,
    /// Limit orders filled.
    pub executed: usize,
    /// Limit orders checked and left pending (not triggered, or no price).
    pub pending: usize,
    /// Fills that failed and were rolled back; the orders stay pending.
    pub failed: usize,
    pub revalued: usize,
    /// Symbols whose price could not be fetched this cycle.
    pub price_failures: usize,
}

impl CycleReport {
    /// True when the cycle changed no order and moved no cash.
    pub fn is_quiet(&self) -> bool {
        self.cancelled == 0 && self.executed == 0
    }
}

/// A log line forwarded to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// The top-level event enum.
/// `tag` and `content` are used by serde for clean JSON representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum LedgerEvent {
    OrderExecuted(OrderExecuted),
    OrderCancelled(OrderCancelled),
    HoldingRevalued(HoldingRevalued),
    CycleCompleted(CycleReport),
    Log(LogLine),
}

/// A cloneable handle for publishing [`LedgerEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishing never fails; with no subscribers the event is dropped.
    pub fn publish(&self, event: LedgerEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers; event dropped.");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn serializes_with_type_and_payload() {
        let event = LedgerEvent::HoldingRevalued(HoldingRevalued {
            holding_id: HoldingId::new(),
            user_id: UserId::new(),
            symbol: Symbol::new("acme").unwrap(),
            last_price: dec!(101.5),
            profit_loss: dec!(-3),
            status: HoldingStatus::Loss,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "HoldingRevalued");
        assert_eq!(json["payload"]["symbol"], "ACME");
        assert_eq!(json["payload"]["status"], "Loss");
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        // Publishing with nobody listening is fine.
        bus.publish(LedgerEvent::CycleCompleted(CycleReport::default()));

        let mut rx = bus.subscribe();
        let report = CycleReport { executed: 2, ..Default::default() };
        bus.publish(LedgerEvent::CycleCompleted(report.clone()));

        assert_eq!(rx.recv().await.unwrap(), LedgerEvent::CycleCompleted(report));
    }
}
