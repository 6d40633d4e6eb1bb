// In crates/execution/src/service.rs

use crate::locks::KeyedLocks;
use crate::stats::{StatsPeriod, TransactionStats};
use crate::types::{
    FillRequest, HoldingAllocation, PortfolioOverview, TradeOutcome, TradeRequest, WatchedSymbol,
};
use crate::{Error, Executor, Result};
use app_config::types::TradingSettings;
use chrono::Utc;
use core_types::{
    Account, Fill, Holding, Order, OrderId, OrderMode, OrderStatus, Side, Symbol, Transaction,
    TransactionId, TransactionKind, UserId, WatchlistEntry, validate_amount, validate_price,
    validate_quantity,
};
use database::{BalanceChange, LedgerCommit, LedgerStore, OrderWrite, TransactionDraft};
use events::{EventBus, LedgerEvent, OrderCancelled};
use pricing::PriceSource;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;

pub const USER_CANCEL_REASON: &str = "cancelled by user";

/// The synchronous trading operations: accounts, cash, orders and queries.
pub struct TradingService {
    store: Arc<dyn LedgerStore>,
    prices: Arc<PriceSource>,
    executor: Arc<dyn Executor>,
    locks: Arc<KeyedLocks>,
    events: EventBus,
    settings: TradingSettings,
}

impl TradingService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        prices: Arc<PriceSource>,
        executor: Arc<dyn Executor>,
        locks: Arc<KeyedLocks>,
        events: EventBus,
        settings: TradingSettings,
    ) -> Self {
        Self {
            store,
            prices,
            executor,
            locks,
            events,
            settings,
        }
    }

    pub fn prices(&self) -> &Arc<PriceSource> {
        &self.prices
    }

    // --- Accounts and cash ---

    /// Opens an empty account. Opening an existing account returns it unchanged.
    pub async fn open_account(&self, user_id: UserId, username: &str) -> Result<Account> {
        let account = Account::open(user_id, username, self.prices.display_currency());
        let stored = self.store.create_account(&account).await?;
        tracing::info!(user_id = %user_id, "Account opened.");
        Ok(stored)
    }

    pub async fn account(&self, user_id: UserId) -> Result<Account> {
        self.store
            .account(user_id)
            .await?
            .ok_or(Error::AccountNotFound(user_id))
    }

    pub async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<Transaction> {
        validate_amount(amount)?;
        let draft = TransactionDraft::cash(TransactionKind::Deposit, format!("Deposit of {}", amount));
        self.move_cash(user_id, amount, draft).await
    }

    /// Fails with [`Error::InsufficientBalance`] rather than overdrawing.
    pub async fn withdraw(&self, user_id: UserId, amount: Decimal) -> Result<Transaction> {
        validate_amount(amount)?;
        let draft =
            TransactionDraft::cash(TransactionKind::Withdrawal, format!("Withdrawal of {}", amount));
        self.move_cash(user_id, -amount, draft).await
    }

    async fn move_cash(
        &self,
        user_id: UserId,
        delta: Decimal,
        transaction: TransactionDraft,
    ) -> Result<Transaction> {
        let commit = LedgerCommit::new(user_id).with_balance(BalanceChange { delta, transaction });
        let receipt = self.store.commit(commit).await?;
        let transaction = receipt.transaction.ok_or_else(|| {
            Error::Store(database::Error::Corrupt("cash movement recorded no transaction".into()))
        })?;
        tracing::info!(
            user_id = %user_id,
            kind = %transaction.kind,
            amount = %delta,
            balance = %transaction.balance_after,
            "Cash moved."
        );
        Ok(transaction)
    }

    // --- Orders ---

    /// A MARKET buy fills now; a LIMIT buy is queued once the balance covers its notional.
    pub async fn buy(&self, user_id: UserId, request: TradeRequest) -> Result<TradeOutcome> {
        self.submit(user_id, Side::Buy, request).await
    }

    /// A MARKET sell fills now; a LIMIT sell is queued once the holding covers it.
    pub async fn sell(&self, user_id: UserId, request: TradeRequest) -> Result<TradeOutcome> {
        self.submit(user_id, Side::Sell, request).await
    }

    async fn submit(&self, user_id: UserId, side: Side, request: TradeRequest) -> Result<TradeOutcome> {
        let symbol = Symbol::new(&request.symbol)?;
        validate_quantity(request.quantity)?;
        let name = request.name.clone().unwrap_or_else(|| symbol.to_string());
        let account = self.account(user_id).await?;

        match request.mode {
            OrderMode::Market => {
                let price = match request.price {
                    Some(price) => {
                        validate_price(price)?;
                        price
                    }
                    None => self.prices.price(&symbol).await?.price_in_display,
                };
                let fill = FillRequest::market(user_id, symbol, name, side, request.quantity, price);
                let outcome = self
                    .with_retries("market order", || self.executor.execute(&fill))
                    .await?;
                Ok(TradeOutcome::Executed(outcome))
            }
            OrderMode::Limit => {
                let limit_price = request.limit_price.ok_or_else(|| {
                    Error::InvalidOrder("a LIMIT order needs a limit_price".into())
                })?;
                let order = Order::limit(
                    user_id,
                    symbol,
                    name,
                    side,
                    request.quantity,
                    limit_price,
                    request.price,
                )?;
                self.queue_limit(&account, order).await.map(TradeOutcome::Queued)
            }
        }
    }

    /// Checks a limit order against the current account or holding and stores it as pending.
    /// No cash moves until the engine fills it.
    async fn queue_limit(&self, account: &Account, order: Order) -> Result<Order> {
        let _guard = self.locks.lock(order.user_id, &order.symbol).await;

        match order.side {
            Side::Buy => {
                if account.virtual_balance < order.total_price {
                    return Err(Error::InsufficientBalance {
                        required: order.total_price,
                        available: account.virtual_balance,
                    });
                }
            }
            Side::Sell => {
                let holding = self
                    .store
                    .find_holding(order.user_id, &order.symbol)
                    .await?
                    .ok_or_else(|| Error::HoldingNotFound(order.symbol.clone()))?;
                if holding.quantity < order.quantity {
                    return Err(Error::InsufficientQuantity {
                        requested: order.quantity,
                        available: holding.quantity,
                    });
                }
            }
        }

        let commit = LedgerCommit::new(order.user_id).with_order(OrderWrite::Insert(order.clone()));
        self.store.commit(commit).await?;

        tracing::info!(
            user_id = %order.user_id,
            order_id = %order.id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity,
            limit = ?order.limit_price,
            "Limit order queued."
        );
        Ok(order)
    }

    /// Cancels one of the user's pending orders.
    pub async fn cancel_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .order(order_id)
            .await?
            .filter(|o| o.user_id == user_id && o.status == OrderStatus::Pending)
            .ok_or(Error::OrderNotFound(order_id))?;

        let _guard = self.locks.lock(user_id, &order.symbol).await;
        match self
            .store
            .update_order_status(
                user_id,
                order_id,
                OrderStatus::Cancelled,
                None,
                Some(USER_CANCEL_REASON.to_string()),
            )
            .await
        {
            Ok(()) => {}
            // Filled or cancelled by someone else in the meantime.
            Err(database::Error::Conflict(_)) => return Err(Error::OrderNotFound(order_id)),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user_id, order_id = %order_id, "Order cancelled by user.");
        self.events.publish(LedgerEvent::OrderCancelled(OrderCancelled {
            order_id,
            user_id,
            symbol: order.symbol.clone(),
            reason: USER_CANCEL_REASON.to_string(),
            cancelled_at: Utc::now(),
        }));

        Ok(Order {
            status: OrderStatus::Cancelled,
            cancellation_reason: Some(USER_CANCEL_REASON.to_string()),
            ..order
        })
    }

    // --- Queries ---

    pub async fn pending_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.orders(user_id, Some(OrderStatus::Pending)).await
    }

    pub async fn orders(&self, user_id: UserId, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_user(user_id, status).await?)
    }

    pub async fn holdings(&self, user_id: UserId) -> Result<Vec<Holding>> {
        Ok(self.store.holdings_for_user(user_id).await?)
    }

    pub async fn fills(&self, user_id: UserId) -> Result<Vec<Fill>> {
        Ok(self.store.fills_for_user(user_id).await?)
    }

    pub async fn transactions(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        Ok(self.store.transactions_for_user(user_id).await?)
    }

    /// One of the user's transactions. Another user's id is reported as not found.
    pub async fn transaction(&self, user_id: UserId, transaction_id: TransactionId) -> Result<Transaction> {
        self.store
            .transaction(transaction_id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or(Error::TransactionNotFound(transaction_id))
    }

    /// Counts, totals and net cash flow over the last `period`.
    pub async fn transaction_stats(&self, user_id: UserId, period: StatsPeriod) -> Result<TransactionStats> {
        self.account(user_id).await?;
        let transactions = self.store.transactions_for_user(user_id).await?;
        TransactionStats::compute(period, Utc::now(), &transactions)
            .ok_or_else(|| core_types::Error::Overflow("transaction totals").into())
    }

    // --- Watchlist ---

    /// The user's watched symbols with a fresh quote each.
    pub async fn watchlist(&self, user_id: UserId) -> Result<Vec<WatchedSymbol>> {
        let entries = self.store.watchlist(user_id).await?;
        let mut quotes = self.prices.prices(entries.iter().map(|e| &e.symbol)).await;
        Ok(entries
            .into_iter()
            .map(|entry| WatchedSymbol {
                quote: quotes.remove(&entry.symbol).flatten(),
                symbol: entry.symbol,
                added_at: entry.added_at,
            })
            .collect())
    }

    pub async fn watch(&self, user_id: UserId, symbol: &str) -> Result<WatchlistEntry> {
        let symbol = Symbol::new(symbol)?;
        let entry = WatchlistEntry { user_id, symbol, added_at: Utc::now() };
        if !self.store.add_to_watchlist(&entry).await? {
            return Err(Error::AlreadyWatched(entry.symbol));
        }
        tracing::info!(user_id = %user_id, symbol = %entry.symbol, "Symbol added to watchlist.");
        Ok(entry)
    }

    pub async fn unwatch(&self, user_id: UserId, symbol: &str) -> Result<()> {
        let symbol = Symbol::new(symbol)?;
        if !self.store.remove_from_watchlist(user_id, &symbol).await? {
            return Err(Error::NotWatched(symbol));
        }
        tracing::info!(user_id = %user_id, symbol = %symbol, "Symbol removed from watchlist.");
        Ok(())
    }

    /// Cash, cost basis and market value of the user's portfolio at the last marked prices.
    pub async fn overview(&self, user_id: UserId) -> Result<PortfolioOverview> {
        let account = self.account(user_id).await?;
        let holdings = self.store.holdings_for_user(user_id).await?;

        let values = holdings
            .iter()
            .map(Holding::market_value)
            .collect::<core_types::Result<Vec<Decimal>>>()?;
        let invested = checked_sum(holdings.iter().map(|h| h.total_price))?;
        let current_value = checked_sum(values.iter().copied())?;
        let total_value = account
            .virtual_balance
            .checked_add(current_value)
            .ok_or(core_types::Error::Overflow("portfolio value"))?;

        let allocations = holdings
            .iter()
            .zip(values)
            .map(|(h, value)| {
                let allocation_pct = if current_value.is_zero() {
                    Decimal::ZERO
                } else {
                    (value / current_value * Decimal::ONE_HUNDRED).round_dp(2)
                };
                HoldingAllocation {
                    symbol: h.symbol.clone(),
                    name: h.name.clone(),
                    quantity: h.quantity,
                    avg_price: h.avg_price.round_dp(2),
                    last_price: h.last_price,
                    invested: h.total_price.round_dp(2),
                    current_value: value.round_dp(2),
                    profit_loss: h.profit_loss.round_dp(2),
                    allocation_pct,
                }
            })
            .collect();

        Ok(PortfolioOverview {
            currency: account.currency,
            cash: account.virtual_balance,
            invested: invested.round_dp(2),
            current_value: current_value.round_dp(2),
            unrealized_pnl: (current_value - invested).round_dp(2),
            total_value: total_value.round_dp(2),
            total_deposited: account.total_deposited,
            total_withdrawn: account.total_withdrawn,
            holdings: allocations,
        })
    }

    /// Runs `attempt` again while it fails with a conflict, up to the configured limit.
    async fn with_retries<T, F, Fut>(&self, what: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_conflict() && retries < self.settings.max_conflict_retries => {
                    retries += 1;
                    tracing::warn!(what, retries, error = %e, "Concurrent write; re-planning.");
                }
                result => return result,
            }
        }
    }
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(|| core_types::Error::Overflow("portfolio value").into())
}
