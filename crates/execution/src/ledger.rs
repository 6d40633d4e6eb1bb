// In crates/execution/src/ledger.rs

use crate::locks::KeyedLocks;
use crate::planner::{FillPlan, plan_buy, plan_sell};
use crate::types::{FillOutcome, FillRequest};
use crate::{Error, Executor, Result};
use async_trait::async_trait;
use chrono::Utc;
use core_types::Side;
use database::LedgerStore;
use events::{EventBus, LedgerEvent, OrderExecuted};
use std::sync::Arc;

/// Fills orders by planning against the stored position and committing the
/// plan in one atomic ledger write.
pub struct LedgerExecutor {
    store: Arc<dyn LedgerStore>,
    locks: Arc<KeyedLocks>,
    events: EventBus,
}

impl LedgerExecutor {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<KeyedLocks>, events: EventBus) -> Self {
        Self { store, locks, events }
    }

    /// Reads the position, plans the fill and commits it. Caller holds the position lock.
    async fn fill(&self, request: &FillRequest) -> Result<FillOutcome> {
        let now = Utc::now();
        let holding = self.store.find_holding(request.user_id, &request.symbol).await?;

        let plan = match request.side {
            Side::Buy => {
                let account = self
                    .store
                    .account(request.user_id)
                    .await?
                    .ok_or(Error::AccountNotFound(request.user_id))?;
                plan_buy(request, &account, holding.as_ref(), now)?
            }
            Side::Sell => {
                let lots = self.store.find_open_lots(request.user_id, &request.symbol).await?;
                plan_sell(request, holding.as_ref(), &lots, now)?
            }
        };

        let FillPlan { commit, order, fill, holding_after, realized_pnl } = plan;
        let receipt = self.store.commit(commit).await?;
        let transaction = receipt.transaction.ok_or_else(|| {
            Error::Store(database::Error::Corrupt("fill committed without a transaction".into()))
        })?;

        Ok(FillOutcome {
            order,
            fill,
            holding: holding_after,
            transaction,
            realized_pnl,
        })
    }
}

#[async_trait]
impl Executor for LedgerExecutor {
    fn name(&self) -> &'static str {
        "LedgerExecutor"
    }

    async fn execute(&self, request: &FillRequest) -> Result<FillOutcome> {
        let _guard = self.locks.lock(request.user_id, &request.symbol).await;

        let outcome = self.fill(request).await?;

        tracing::info!(
            user_id = %request.user_id,
            order_id = %outcome.order.id,
            symbol = %request.symbol,
            side = %request.side,
            quantity = request.quantity,
            price = %request.price,
            balance = %outcome.balance_after(),
            "Order filled."
        );

        self.events.publish(LedgerEvent::OrderExecuted(OrderExecuted {
            order_id: outcome.order.id,
            user_id: request.user_id,
            symbol: request.symbol.clone(),
            side: request.side,
            mode: outcome.order.mode,
            quantity: request.quantity,
            price: request.price,
            total: outcome.fill.total_price,
            realized_pnl: outcome.realized_pnl,
            balance_after: outcome.balance_after(),
            holding_quantity: outcome.holding.as_ref().map_or(0, |h| h.quantity),
            executed_at: outcome.fill.executed_at,
        }));

        Ok(outcome)
    }
}
