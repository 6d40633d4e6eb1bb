// In crates/engine/src/revaluation.rs

use crate::{CyclePrices, CycleReport, Engine};
use chrono::Utc;
use core_types::HoldingStatus;
use database::Valuation;
use events::{HoldingRevalued, LedgerEvent};
use std::collections::BTreeSet;

impl Engine {
    /// Marks every open holding to the current price and stores its unrealized P&L.
    pub(crate) async fn revalue_holdings(&self, prices: &mut CyclePrices, report: &mut CycleReport) {
        let holdings = match self.store.open_holdings().await {
            Ok(holdings) => holdings,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load holdings; skipping revaluation.");
                return;
            }
        };
        if holdings.is_empty() {
            return;
        }

        let symbols: BTreeSet<_> = holdings.iter().map(|h| h.symbol.clone()).collect();
        self.fetch_missing(&symbols, prices).await;

        for snapshot in holdings {
            let Some(quote) = prices.get(&snapshot.symbol).and_then(Option::as_ref) else {
                continue;
            };

            // Fills on this position wait until the mark is written.
            let _guard = self.locks.lock(snapshot.user_id, &snapshot.symbol).await;
            let holding = match self.store.holding(snapshot.id).await {
                Ok(Some(holding)) => holding,
                // Sold out since it was loaded.
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(holding_id = %snapshot.id, error = %e, "Failed to reload holding.");
                    continue;
                }
            };

            let Some(profit_loss) = holding.checked_unrealized_pnl(quote.price_in_display) else {
                tracing::error!(holding_id = %holding.id, "Unrealized P&L overflowed; holding not revalued.");
                continue;
            };
            let valuation = Valuation {
                expected_version: holding.version,
                last_price: quote.price_in_display,
                profit_loss,
                status: HoldingStatus::from_pnl(profit_loss),
                updated_at: Utc::now(),
            };

            match self.store.update_holding_valuation(holding.id, &valuation).await {
                Ok(true) => {
                    report.revalued += 1;
                    self.events.publish(LedgerEvent::HoldingRevalued(HoldingRevalued {
                        holding_id: holding.id,
                        user_id: holding.user_id,
                        symbol: holding.symbol.clone(),
                        last_price: valuation.last_price,
                        profit_loss: valuation.profit_loss,
                        status: valuation.status,
                    }));
                }
                // Written to by another process since the reload; next cycle marks it.
                Ok(false) => {
                    tracing::debug!(holding_id = %holding.id, "Holding changed under revaluation; skipped.");
                }
                Err(e) => {
                    tracing::error!(holding_id = %holding.id, error = %e, "Failed to revalue holding.");
                }
            }
        }
    }
}
