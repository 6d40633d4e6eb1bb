// In crates/execution/src/stats.rs

use chrono::{DateTime, Duration, Months, Utc};
use core_types::{Transaction, TransactionKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How many of the newest transactions a summary carries.
pub const RECENT_TRANSACTIONS: usize = 10;

/// The look-back window of a transaction summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl StatsPeriod {
    /// The start of the window ending at `now`.
    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            StatsPeriod::Day => now.checked_sub_signed(Duration::days(1)),
            StatsPeriod::Week => now.checked_sub_signed(Duration::days(7)),
            StatsPeriod::Month => now.checked_sub_months(Months::new(1)),
            StatsPeriod::Year => now.checked_sub_months(Months::new(12)),
        };
        start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindSummary {
    pub kind: TransactionKind,
    pub count: usize,
    /// Sum of the absolute amounts.
    pub total: Decimal,
}

/// Cash movements of one user over a [`StatsPeriod`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionStats {
    pub period: StatsPeriod,
    pub since: DateTime<Utc>,
    /// One entry per kind, zero counts included.
    pub by_kind: Vec<KindSummary>,
    /// Deposits and sale proceeds.
    pub total_inflow: Decimal,
    /// Withdrawals and purchase costs.
    pub total_outflow: Decimal,
    pub net_flow: Decimal,
    /// Newest first.
    pub recent: Vec<Transaction>,
}

impl TransactionStats {
    /// Summarizes the transactions created at or after `period.since(now)`.
    ///
    /// `None` if a total does not fit in a `Decimal`.
    pub fn compute(period: StatsPeriod, now: DateTime<Utc>, transactions: &[Transaction]) -> Option<Self> {
        let since = period.since(now);
        let in_window: Vec<&Transaction> =
            transactions.iter().filter(|t| t.created_at >= since).collect();

        let kinds = [
            TransactionKind::Deposit,
            TransactionKind::Withdrawal,
            TransactionKind::TradeBuy,
            TransactionKind::TradeSell,
        ];
        let mut by_kind = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let mut summary = KindSummary { kind, count: 0, total: Decimal::ZERO };
            for t in in_window.iter().filter(|t| t.kind == kind) {
                summary.count += 1;
                summary.total = summary.total.checked_add(t.amount.abs())?;
            }
            by_kind.push(summary);
        }

        let mut total_inflow = Decimal::ZERO;
        let mut total_outflow = Decimal::ZERO;
        for t in &in_window {
            if t.amount > Decimal::ZERO {
                total_inflow = total_inflow.checked_add(t.amount)?;
            } else {
                total_outflow = total_outflow.checked_sub(t.amount)?;
            }
        }

        let mut recent: Vec<Transaction> = in_window.into_iter().cloned().collect();
        // Stable, so equal timestamps keep their reverse insertion order.
        recent.reverse();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(RECENT_TRANSACTIONS);

        Some(Self {
            period,
            since,
            by_kind,
            total_inflow,
            total_outflow,
            net_flow: total_inflow.checked_sub(total_outflow)?,
            recent,
        })
    }
}
