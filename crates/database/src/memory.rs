// In crates/database/src/memory.rs

use crate::commit::{
    BalanceChange, CommitReceipt, HoldingWrite, LedgerCommit, LotWrite, OrderWrite, Valuation,
};
use crate::{Error, LedgerStore, Result};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{
    Account, Fill, Holding, HoldingId, OpenLot, Order, OrderId, OrderStatus, Symbol, Transaction,
    TransactionId, TransactionKind, UserId, WatchlistEntry,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: HashMap<UserId, Account>,
    // Vectors keep insertion order, which breaks ties between equal timestamps.
    orders: Vec<Order>,
    holdings: Vec<Holding>,
    fills: Vec<Fill>,
    lots: Vec<OpenLot>,
    transactions: Vec<Transaction>,
    watchlist: Vec<WatchlistEntry>,
}

/// A ledger kept in process memory.
///
/// A commit is applied to a copy of the state under one lock and swapped in
/// only if every write succeeded. Each commit copies the whole ledger, so
/// this backend is meant for tests and local demos, not for real load.
/// Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    failing_commits: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with [`Error::Unavailable`] before touching state.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_account(&self, account: &Account) -> Result<Account> {
        let mut state = self.state.lock().await;
        let stored = state
            .accounts
            .entry(account.user_id)
            .or_insert_with(|| account.clone());
        Ok(stored.clone())
    }

    async fn account(&self, user_id: UserId) -> Result<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&user_id).cloned())
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id && status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn find_pending_limit_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> =
            state.orders.iter().filter(|o| o.is_pending_limit()).cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn find_holding(&self, user_id: UserId, symbol: &Symbol) -> Result<Option<Holding>> {
        let state = self.state.lock().await;
        Ok(state
            .holdings
            .iter()
            .find(|h| h.user_id == user_id && &h.symbol == symbol)
            .cloned())
    }

    async fn holding(&self, holding_id: HoldingId) -> Result<Option<Holding>> {
        let state = self.state.lock().await;
        Ok(state.holdings.iter().find(|h| h.id == holding_id).cloned())
    }

    async fn holdings_for_user(&self, user_id: UserId) -> Result<Vec<Holding>> {
        let state = self.state.lock().await;
        Ok(state.holdings.iter().filter(|h| h.user_id == user_id).cloned().collect())
    }

    async fn open_holdings(&self) -> Result<Vec<Holding>> {
        Ok(self.state.lock().await.holdings.clone())
    }

    async fn update_holding_valuation(
        &self,
        holding_id: HoldingId,
        valuation: &Valuation,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .holdings
            .iter_mut()
            .find(|h| h.id == holding_id && h.version == valuation.expected_version)
        {
            Some(holding) => {
                holding.last_price = valuation.last_price;
                holding.profit_loss = valuation.profit_loss;
                holding.status = valuation.status;
                holding.updated_at = valuation.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_open_lots(&self, user_id: UserId, symbol: &Symbol) -> Result<Vec<OpenLot>> {
        let state = self.state.lock().await;
        let mut lots: Vec<OpenLot> = state
            .lots
            .iter()
            .filter(|l| l.user_id == user_id && &l.symbol == symbol)
            .cloned()
            .collect();
        lots.sort_by_key(|l| l.opened_at);
        Ok(lots)
    }

    async fn fills_for_user(&self, user_id: UserId) -> Result<Vec<Fill>> {
        let state = self.state.lock().await;
        Ok(state.fills.iter().filter(|f| f.user_id == user_id).cloned().collect())
    }

    async fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().find(|t| t.id == transaction_id).cloned())
    }

    async fn watchlist(&self, user_id: UserId) -> Result<Vec<WatchlistEntry>> {
        let state = self.state.lock().await;
        Ok(state.watchlist.iter().filter(|w| w.user_id == user_id).cloned().collect())
    }

    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&entry.user_id) {
            return Err(Error::AccountNotFound(entry.user_id));
        }
        if state
            .watchlist
            .iter()
            .any(|w| w.user_id == entry.user_id && w.symbol == entry.symbol)
        {
            return Ok(false);
        }
        state.watchlist.push(entry.clone());
        Ok(true)
    }

    async fn remove_from_watchlist(&self, user_id: UserId, symbol: &Symbol) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.watchlist.len();
        state.watchlist.retain(|w| !(w.user_id == user_id && &w.symbol == symbol));
        Ok(state.watchlist.len() < before)
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt> {
        if self.take_injected_failure() {
            return Err(Error::Unavailable("injected commit failure".into()));
        }

        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let receipt = apply(&mut next, commit)?;
        *state = next;
        Ok(receipt)
    }
}

/// Applies a commit to `state`, stopping at the first failed precondition.
/// The caller discards `state` on error.
fn apply(state: &mut LedgerState, commit: LedgerCommit) -> Result<CommitReceipt> {
    let user_id = commit.user_id;

    if let Some(write) = commit.order {
        apply_order(state, user_id, write)?;
    }

    let transaction = match commit.balance {
        Some(change) => Some(apply_balance(state, user_id, change)?),
        None => None,
    };

    for fill in commit.fills {
        if state.fills.iter().any(|f| f.id == fill.id) {
            return Err(Error::Conflict(format!("fill {} already recorded", fill.id)));
        }
        state.fills.push(fill);
    }

    for write in commit.lots {
        apply_lot(state, write)?;
    }

    if let Some(write) = commit.holding {
        apply_holding(state, write)?;
    }

    Ok(CommitReceipt { transaction })
}

fn apply_order(state: &mut LedgerState, user_id: UserId, write: OrderWrite) -> Result<()> {
    match write {
        OrderWrite::Insert(order) => {
            if state.orders.iter().any(|o| o.id == order.id) {
                return Err(Error::Conflict(format!("order {} already exists", order.id)));
            }
            state.orders.push(order);
        }
        OrderWrite::Transition { order_id, from, to, execution, reason } => {
            let order = state
                .orders
                .iter_mut()
                .find(|o| o.id == order_id && o.user_id == user_id && o.status == from)
                .ok_or_else(|| Error::Conflict(format!("order {} is no longer {}", order_id, from)))?;
            order.status = to;
            if let Some(reason) = reason {
                order.cancellation_reason = Some(reason);
            }
            if let Some(execution) = execution {
                order.executed_price = Some(execution.price);
                order.executed_at = Some(execution.executed_at);
                order.profit_loss = execution.profit_loss;
            }
        }
    }
    Ok(())
}

fn apply_balance(
    state: &mut LedgerState,
    user_id: UserId,
    change: BalanceChange,
) -> Result<Transaction> {
    let account = state
        .accounts
        .get_mut(&user_id)
        .ok_or(Error::AccountNotFound(user_id))?;

    let balance_before = account.virtual_balance;
    let balance_after = balance_before
        .checked_add(change.delta)
        .ok_or_else(|| Error::OutOfRange(format!("balance of account {}", user_id)))?;
    if balance_after < Decimal::ZERO {
        return Err(Error::InsufficientFunds {
            available: balance_before,
            requested: -change.delta,
        });
    }

    let out_of_range = || Error::OutOfRange(format!("cash totals of account {}", user_id));
    match change.transaction.kind {
        TransactionKind::Deposit => {
            account.total_deposited =
                account.total_deposited.checked_add(change.delta).ok_or_else(out_of_range)?;
        }
        TransactionKind::Withdrawal => {
            account.total_withdrawn =
                account.total_withdrawn.checked_sub(change.delta).ok_or_else(out_of_range)?;
        }
        TransactionKind::TradeBuy | TransactionKind::TradeSell => {}
    }
    account.virtual_balance = balance_after;

    let draft = change.transaction;
    let transaction = Transaction {
        id: TransactionId::new(),
        user_id,
        kind: draft.kind,
        amount: change.delta,
        currency: account.currency.clone(),
        symbol: draft.symbol,
        quantity: draft.quantity,
        price: draft.price,
        total_value: draft.total_value,
        balance_before,
        balance_after,
        profit_loss: draft.profit_loss,
        description: draft.description,
        created_at: Utc::now(),
    };
    state.transactions.push(transaction.clone());
    Ok(transaction)
}

fn apply_lot(state: &mut LedgerState, write: LotWrite) -> Result<()> {
    match write {
        LotWrite::Open(lot) => {
            if state.lots.iter().any(|l| l.fill_id == lot.fill_id) {
                return Err(Error::Conflict(format!("lot {} already open", lot.fill_id)));
            }
            state.lots.push(lot);
        }
        LotWrite::Reduce { fill_id, expected_remaining, remaining } => {
            let index = state
                .lots
                .iter()
                .position(|l| l.fill_id == fill_id && l.remaining == expected_remaining)
                .ok_or_else(|| Error::Conflict(format!("lot {} changed", fill_id)))?;
            if remaining == 0 {
                state.lots.remove(index);
            } else {
                state.lots[index].remaining = remaining;
            }
        }
    }
    Ok(())
}

fn apply_holding(state: &mut LedgerState, write: HoldingWrite) -> Result<()> {
    match write {
        HoldingWrite::Create(holding) => {
            if state
                .holdings
                .iter()
                .any(|h| h.user_id == holding.user_id && h.symbol == holding.symbol)
            {
                return Err(Error::Conflict(format!("holding in {} already exists", holding.symbol)));
            }
            state.holdings.push(holding);
        }
        HoldingWrite::Update { holding, expected_version } => {
            let stored = state
                .holdings
                .iter_mut()
                .find(|h| h.id == holding.id && h.version == expected_version)
                .ok_or_else(|| Error::Conflict(format!("holding {} changed", holding.id)))?;
            *stored = Holding { version: expected_version + 1, ..holding };
        }
        HoldingWrite::Delete { id, expected_version } => {
            let index = state
                .holdings
                .iter()
                .position(|h| h.id == id && h.version == expected_version)
                .ok_or_else(|| Error::Conflict(format!("holding {} changed", id)))?;
            state.holdings.remove(index);
        }
    }
    Ok(())
}
