// In crates/engine/src/trigger.rs

use crate::{CyclePrices, CycleReport, Engine};
use core_types::{Order, Side};
use execution::FillRequest;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Whether a limit order triggers at `current`.
///
/// A BUY triggers at or below its limit, a SELL at or above it.
pub fn should_fill(side: Side, limit: Decimal, current: Decimal) -> bool {
    match side {
        Side::Buy => current <= limit,
        Side::Sell => current >= limit,
    }
}

impl Engine {
    /// Prices every symbol with a pending order and fills the triggered ones at
    /// the current market price.
    pub(crate) async fn fill_triggered_orders(
        &self,
        orders: Vec<Order>,
        prices: &mut CyclePrices,
        report: &mut CycleReport,
    ) {
        if orders.is_empty() {
            return;
        }

        let symbols: BTreeSet<_> = orders.iter().map(|o| o.symbol.clone()).collect();
        self.fetch_missing(&symbols, prices).await;

        for order in orders {
            let Some(limit) = order.limit_price else {
                tracing::error!(order_id = %order.id, "Pending limit order has no limit price; skipped.");
                report.failed += 1;
                continue;
            };

            let Some(quote) = prices.get(&order.symbol).and_then(Option::as_ref) else {
                // The fetch failure was already logged once for the symbol.
                report.pending += 1;
                continue;
            };
            let current = quote.price_in_display;

            if !should_fill(order.side, limit, current) {
                tracing::debug!(order_id = %order.id, %limit, %current, "Limit not reached.");
                report.pending += 1;
                continue;
            }

            let order_id = order.id;
            match self.executor.execute(&FillRequest::pending(order, current)).await {
                Ok(outcome) => {
                    tracing::info!(
                        order_id = %order_id,
                        %limit,
                        price = %current,
                        total = %outcome.fill.total_price,
                        "Limit order triggered and filled."
                    );
                    report.executed += 1;
                }
                Err(e) => {
                    tracing::error!(
                        order_id = %order_id,
                        kind = e.kind(),
                        error = %e,
                        "Failed to fill triggered order; it stays pending."
                    );
                    report.failed += 1;
                }
            }
        }
    }
}
