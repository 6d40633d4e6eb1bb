// In crates/database/tests/postgres_ledger.rs
//
// Runs against a live server: `DATABASE_URL=postgres://... cargo test -p database -- --ignored`.
// Each test gets a fresh database with the migrations applied.

use chrono::Utc;
use core_types::{
    Account, Holding, HoldingId, HoldingStatus, Symbol, TransactionKind, UserId, WatchlistEntry,
};
use database::{
    BalanceChange, Error, HoldingWrite, LedgerCommit, LedgerStore, PgLedger, TransactionDraft,
    Valuation,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;

fn acme() -> Symbol {
    Symbol::new("ACME").unwrap()
}

async fn funded(ledger: &PgLedger, amount: Decimal) -> UserId {
    let user = UserId::new();
    ledger.create_account(&Account::open(user, "trader", "INR")).await.unwrap();
    ledger
        .adjust_balance(user, amount, TransactionDraft::cash(TransactionKind::Deposit, "deposit"))
        .await
        .unwrap();
    user
}

fn holding(user: UserId, quantity: i64, avg: Decimal) -> Holding {
    let now = Utc::now();
    Holding {
        id: HoldingId::new(),
        user_id: user,
        symbol: acme(),
        name: "Acme".into(),
        quantity,
        avg_price: avg,
        last_price: avg,
        total_price: avg * Decimal::from(quantity),
        profit_loss: Decimal::ZERO,
        status: HoldingStatus::Neutral,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs DATABASE_URL pointing at PostgreSQL"]
async fn stale_holding_version_rolls_back_the_balance(pool: PgPool) {
    let ledger = PgLedger::from_pool(pool);
    let user = funded(&ledger, dec!(1000)).await;
    ledger.upsert_holding(user, HoldingWrite::Create(holding(user, 10, dec!(100)))).await.unwrap();

    let commit = LedgerCommit::new(user)
        .with_balance(BalanceChange {
            delta: dec!(-100),
            transaction: TransactionDraft::cash(TransactionKind::TradeBuy, "buy"),
        })
        .with_holding(HoldingWrite::Update {
            holding: holding(user, 11, dec!(100)),
            expected_version: 3,
        });
    assert!(ledger.commit(commit).await.unwrap_err().is_conflict());

    let account = ledger.account(user).await.unwrap().unwrap();
    assert_eq!(account.virtual_balance, dec!(1000));
    assert_eq!(ledger.transactions_for_user(user).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs DATABASE_URL pointing at PostgreSQL"]
async fn concurrent_debits_never_overdraw(pool: PgPool) {
    let ledger = PgLedger::from_pool(pool);
    let user = funded(&ledger, dec!(100)).await;
    let withdraw = || {
        ledger.adjust_balance(user, dec!(-60), TransactionDraft::cash(TransactionKind::Withdrawal, "w"))
    };

    let (first, second) = tokio::join!(withdraw(), withdraw());

    assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let rejected = if first.is_err() { first } else { second };
    assert!(matches!(rejected, Err(Error::InsufficientFunds { .. })));
    let account = ledger.account(user).await.unwrap().unwrap();
    assert_eq!(account.virtual_balance, dec!(40));
    assert_eq!(account.total_withdrawn, dec!(60));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs DATABASE_URL pointing at PostgreSQL"]
async fn valuation_only_lands_on_the_version_it_read(pool: PgPool) {
    let ledger = PgLedger::from_pool(pool);
    let user = funded(&ledger, dec!(0)).await;
    let position = holding(user, 10, dec!(100));
    ledger.upsert_holding(user, HoldingWrite::Create(position.clone())).await.unwrap();
    ledger
        .upsert_holding(
            user,
            HoldingWrite::Update { holding: Holding { quantity: 20, ..position.clone() }, expected_version: 0 },
        )
        .await
        .unwrap();

    let stale = Valuation {
        expected_version: 0,
        last_price: dec!(150),
        profit_loss: dec!(500),
        status: HoldingStatus::Profit,
        updated_at: Utc::now(),
    };
    assert!(!ledger.update_holding_valuation(position.id, &stale).await.unwrap());

    let current = Valuation { expected_version: 1, profit_loss: dec!(1000), ..stale };
    assert!(ledger.update_holding_valuation(position.id, &current).await.unwrap());
    let stored = ledger.holding(position.id).await.unwrap().unwrap();
    assert_eq!((stored.quantity, stored.last_price, stored.profit_loss), (20, dec!(150), dec!(1000)));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs DATABASE_URL pointing at PostgreSQL"]
async fn watchlist_and_transaction_lookups(pool: PgPool) {
    let ledger = PgLedger::from_pool(pool);
    let user = funded(&ledger, dec!(10)).await;
    let entry = WatchlistEntry { user_id: user, symbol: acme(), added_at: Utc::now() };

    assert!(ledger.add_to_watchlist(&entry).await.unwrap());
    assert!(!ledger.add_to_watchlist(&entry).await.unwrap());
    let watched = ledger.watchlist(user).await.unwrap();
    assert_eq!(watched.iter().map(|w| &w.symbol).collect::<Vec<_>>(), vec![&entry.symbol]);
    assert!(ledger.remove_from_watchlist(user, &acme()).await.unwrap());
    assert!(ledger.watchlist(user).await.unwrap().is_empty());

    let deposit = ledger.transactions_for_user(user).await.unwrap().remove(0);
    assert_eq!(ledger.transaction(deposit.id).await.unwrap().map(|t| t.amount), Some(dec!(10)));
}

