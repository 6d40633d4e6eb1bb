// In crates/engine/src/validation.rs

use crate::{CycleReport, Engine};
use chrono::Utc;
use core_types::{Order, OrderStatus, Side};
use events::{LedgerEvent, OrderCancelled};

/// Reason recorded on a pending SELL the holding can no longer cover.
pub fn insufficient_shares_reason(available: i64, requested: i64) -> String {
    format!("insufficient shares: available {}, requested {}", available, requested)
}

impl Engine {
    /// Cancels pending SELL orders that ask for more shares than the user now holds.
    ///
    /// Each order is checked on its own against the current holding. No cash or
    /// position is touched. Returns the orders still pending.
    pub(crate) async fn validate_pending_sells(
        &self,
        orders: Vec<Order>,
        report: &mut CycleReport,
    ) -> Vec<Order> {
        let mut remaining = Vec::with_capacity(orders.len());

        for order in orders {
            if order.side != Side::Sell {
                remaining.push(order);
                continue;
            }

            let _guard = self.locks.lock(order.user_id, &order.symbol).await;

            let available = match self.store.find_holding(order.user_id, &order.symbol).await {
                Ok(holding) => holding.map_or(0, |h| h.quantity),
                Err(e) => {
                    tracing::error!(order_id = %order.id, error = %e, "Failed to load holding; order skipped this cycle.");
                    report.failed += 1;
                    continue;
                }
            };

            if available >= order.quantity {
                remaining.push(order);
                continue;
            }

            let reason = insufficient_shares_reason(available, order.quantity);
            let cancelled = self
                .store
                .update_order_status(
                    order.user_id,
                    order.id,
                    OrderStatus::Cancelled,
                    None,
                    Some(reason.clone()),
                )
                .await;

            match cancelled {
                Ok(()) => {
                    tracing::info!(
                        order_id = %order.id,
                        user_id = %order.user_id,
                        symbol = %order.symbol,
                        available,
                        requested = order.quantity,
                        "Cancelled unfulfillable sell order."
                    );
                    report.cancelled += 1;
                    self.events.publish(LedgerEvent::OrderCancelled(OrderCancelled {
                        order_id: order.id,
                        user_id: order.user_id,
                        symbol: order.symbol.clone(),
                        reason,
                        cancelled_at: Utc::now(),
                    }));
                }
                Err(database::Error::Conflict(_)) => {
                    tracing::debug!(order_id = %order.id, "Order left pending state before validation.");
                }
                Err(e) => {
                    tracing::error!(order_id = %order.id, error = %e, "Failed to cancel unfulfillable sell order.");
                    report.failed += 1;
                }
            }
        }

        remaining
    }
}
