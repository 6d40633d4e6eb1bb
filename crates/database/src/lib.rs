// In crates/database/src/lib.rs

use app_config::types::{DatabaseBackend, DatabaseSettings};
use async_trait::async_trait;
use core_types::{
    Account, Fill, Holding, HoldingId, OpenLot, Order, OrderId, OrderStatus, Symbol, Transaction,
    TransactionId, UserId, WatchlistEntry,
};
use rust_decimal::Decimal;
use std::sync::Arc;

pub mod commit;
pub mod error;
pub mod memory;
pub mod postgres;

// Re-export the most important types for easy access.
pub use commit::{
    BalanceChange, CommitReceipt, ExecutionDetails, HoldingWrite, LedgerCommit, LotWrite,
    OrderWrite, TransactionDraft, Valuation,
};
pub use error::{Error, Result};
pub use memory::MemoryLedger;
pub use postgres::PgLedger;

/// The persisted ledger shared by the trading service and the engine.
///
/// Reads are plain queries. Every mutation that touches more than one record
/// goes through [`LedgerStore::commit`], which applies a [`LedgerCommit`]
/// atomically or not at all.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Stores `account` unless the user already has one. Returns the stored account.
    async fn create_account(&self, account: &Account) -> Result<Account>;
    async fn account(&self, user_id: UserId) -> Result<Option<Account>>;

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>>;
    /// A user's orders, newest first.
    async fn orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>>;
    /// Every pending LIMIT order across all users, oldest first.
    async fn find_pending_limit_orders(&self) -> Result<Vec<Order>>;

    async fn find_holding(&self, user_id: UserId, symbol: &Symbol) -> Result<Option<Holding>>;
    async fn holding(&self, holding_id: HoldingId) -> Result<Option<Holding>>;
    async fn holdings_for_user(&self, user_id: UserId) -> Result<Vec<Holding>>;
    /// Every holding across all users.
    async fn open_holdings(&self) -> Result<Vec<Holding>>;
    /// Refreshes mark-to-market fields. Returns `false` if the holding no longer exists
    /// or has moved past `valuation.expected_version`.
    async fn update_holding_valuation(
        &self,
        holding_id: HoldingId,
        valuation: &Valuation,
    ) -> Result<bool>;

    /// The unsold lots of a position, oldest first.
    async fn find_open_lots(&self, user_id: UserId, symbol: &Symbol) -> Result<Vec<OpenLot>>;
    /// A user's fill log, oldest first.
    async fn fills_for_user(&self, user_id: UserId) -> Result<Vec<Fill>>;
    /// A user's cash movements, oldest first.
    async fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>>;
    async fn transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>>;

    /// A user's watched symbols, oldest first.
    async fn watchlist(&self, user_id: UserId) -> Result<Vec<WatchlistEntry>>;
    /// Returns `false` if the user already watches the symbol.
    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<bool>;
    /// Returns `false` if the symbol was not watched.
    async fn remove_from_watchlist(&self, user_id: UserId, symbol: &Symbol) -> Result<bool>;

    /// Applies every write in `commit` in one atomic unit.
    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt>;

    // --- Single-record helpers, each one commit ---

    /// Moves a pending order to `to`.
    async fn update_order_status(
        &self,
        user_id: UserId,
        order_id: OrderId,
        to: OrderStatus,
        execution: Option<ExecutionDetails>,
        reason: Option<String>,
    ) -> Result<()> {
        let write = OrderWrite::Transition {
            order_id,
            from: OrderStatus::Pending,
            to,
            execution,
            reason,
        };
        self.commit(LedgerCommit::new(user_id).with_order(write)).await?;
        Ok(())
    }

    /// Applies a signed cash delta with its audit entry. Returns the new balance.
    async fn adjust_balance(
        &self,
        user_id: UserId,
        delta: Decimal,
        transaction: TransactionDraft,
    ) -> Result<Decimal> {
        let receipt = self
            .commit(LedgerCommit::new(user_id).with_balance(BalanceChange { delta, transaction }))
            .await?;
        receipt
            .balance_after()
            .ok_or_else(|| Error::Corrupt("balance change produced no transaction".into()))
    }

    async fn upsert_holding(&self, user_id: UserId, write: HoldingWrite) -> Result<()> {
        self.commit(LedgerCommit::new(user_id).with_holding(write)).await?;
        Ok(())
    }

    async fn delete_holding(&self, holding: &Holding) -> Result<()> {
        let write = HoldingWrite::Delete {
            id: holding.id,
            expected_version: holding.version,
        };
        self.upsert_holding(holding.user_id, write).await
    }

    /// Appends a fill to the log. A BUY fill also opens a lot.
    async fn append_position_fill(&self, fill: Fill) -> Result<()> {
        let mut commit = LedgerCommit::new(fill.user_id);
        if fill.side == core_types::Side::Buy {
            commit = commit.with_lot(LotWrite::Open(OpenLot::from_fill(&fill)));
        }
        self.commit(commit.with_fill(fill)).await?;
        Ok(())
    }
}

/// Opens the ledger backend selected in the settings.
///
/// The PostgreSQL backend connects and runs pending migrations first.
pub async fn open(settings: &DatabaseSettings) -> Result<Arc<dyn LedgerStore>> {
    let store: Arc<dyn LedgerStore> = match settings.backend {
        DatabaseBackend::Postgres => Arc::new(PgLedger::connect(settings).await?),
        DatabaseBackend::Memory => {
            tracing::warn!(
                "Using the in-memory ledger: state is lost on exit and every commit copies the whole ledger. Use it for tests and demos only."
            );
            Arc::new(MemoryLedger::new())
        }
    };
    tracing::info!(backend = store.name(), "Ledger store ready.");
    Ok(store)
}
