// In crates/execution/src/lib.rs

use async_trait::async_trait;

pub mod error;
pub mod ledger;
pub mod locks;
pub mod planner;
pub mod service;
pub mod stats;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use ledger::LedgerExecutor;
pub use locks::KeyedLocks;
pub use service::TradingService;
pub use stats::{KindSummary, StatsPeriod, TransactionStats};
pub use types::{
    FillOutcome, FillRequest, HoldingAllocation, OrderOrigin, PortfolioOverview, TradeOutcome,
    TradeRequest, WatchedSymbol,
};

/// The universal interface for filling an order against the ledger.
///
/// Both the trading service (market orders) and the engine (triggered limit
/// orders) go through an `Executor`, so every fill follows the same path.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The name of the executor, for logs.
    fn name(&self) -> &'static str;

    /// Executes a fill.
    ///
    /// # Arguments
    ///
    /// * `request`: The position, side, quantity and price to fill at.
    ///
    /// # Returns
    ///
    /// The resulting ledger state on success. On any error nothing was written;
    /// a pending order stays pending.
    async fn execute(&self, request: &FillRequest) -> Result<FillOutcome>;
}
