// In crates/engine/src/lib.rs

pub mod revaluation;
pub mod trigger;
pub mod validation;

use app_config::types::EngineSettings;
use database::LedgerStore;
use events::{EventBus, LedgerEvent};
use execution::{Executor, KeyedLocks};
use pricing::{PriceQuote, PriceSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{MissedTickBehavior, interval};

pub use events::CycleReport;

/// Prices fetched during one cycle. `None` marks a symbol whose fetch failed.
pub(crate) type CyclePrices = BTreeMap<core_types::Symbol, Option<PriceQuote>>;

/// The order execution engine: a timer-driven sweep over pending limit orders
/// and open holdings.
///
/// Each cycle runs three passes in order:
/// 1. cancel pending SELL orders the holding no longer covers,
/// 2. fill pending orders whose trigger price the market has reached,
/// 3. mark every open holding to market.
pub struct Engine {
    store: Arc<dyn LedgerStore>,
    prices: Arc<PriceSource>,
    executor: Arc<dyn Executor>,
    locks: Arc<KeyedLocks>,
    events: EventBus,
    settings: EngineSettings,
    cycles: AtomicU64,
}

impl Engine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        prices: Arc<PriceSource>,
        executor: Arc<dyn Executor>,
        locks: Arc<KeyedLocks>,
        events: EventBus,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            prices,
            executor,
            locks,
            events,
            settings,
            cycles: AtomicU64::new(0),
        }
    }

    /// The main loop. Runs one cycle immediately, then one per poll interval.
    ///
    /// A cycle is awaited before the next tick is taken, so cycles never overlap;
    /// a slow cycle delays the schedule instead of queueing catch-up cycles.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            interval_secs = self.settings.poll_interval_secs,
            executor = self.executor.name(),
            store = self.store.name(),
            "Order execution engine started."
        );

        let mut ticker = interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Runs the three passes once. Never fails: per-item errors are logged and
    /// counted in the report.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = CycleReport::default();
        let mut prices = CyclePrices::new();

        // --- Step 1: Load pending limit orders ---
        let pending = match self.store.find_pending_limit_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(cycle, error = %e, "Failed to load pending orders; skipping fills this cycle.");
                Vec::new()
            }
        };

        // --- Step 2: Sell-order validation pass ---
        let pending = self.validate_pending_sells(pending, &mut report).await;

        // --- Step 3: Trigger-and-fill pass ---
        self.fill_triggered_orders(pending, &mut prices, &mut report).await;

        // --- Step 4: Mark-to-market pass ---
        self.revalue_holdings(&mut prices, &mut report).await;

        report.price_failures = prices.values().filter(|quote| quote.is_none()).count();

        tracing::info!(
            cycle,
            cancelled = report.cancelled,
            executed = report.executed,
            pending = report.pending,
            failed = report.failed,
            revalued = report.revalued,
            price_failures = report.price_failures,
            "Engine cycle completed."
        );
        self.events.publish(LedgerEvent::CycleCompleted(report.clone()));

        report
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Fetches any symbol not yet priced this cycle.
    async fn fetch_missing<'a, I>(&self, symbols: I, prices: &mut CyclePrices)
    where
        I: IntoIterator<Item = &'a core_types::Symbol>,
    {
        let missing: Vec<&core_types::Symbol> =
            symbols.into_iter().filter(|s| !prices.contains_key(*s)).collect();
        if missing.is_empty() {
            return;
        }
        prices.extend(self.prices.prices(missing).await);
    }
}
