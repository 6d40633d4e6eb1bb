// In crates/database/src/postgres.rs

use crate::commit::{
    BalanceChange, CommitReceipt, HoldingWrite, LedgerCommit, LotWrite, OrderWrite, Valuation,
};
use crate::{Error, LedgerStore, Result};
use app_config::types::DatabaseSettings;
use async_trait::async_trait;
use chrono::Utc;
use core_types::{
    Account, Fill, FillId, Holding, HoldingId, OpenLot, Order, OrderId, OrderMode, OrderStatus,
    Symbol, Transaction, TransactionId, TransactionKind, UserId, WatchlistEntry,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "user_id, username, virtual_balance, total_deposited, \
     total_withdrawn, currency, created_at";
const ORDER_COLUMNS: &str = "id, user_id, symbol, name, side, mode, quantity, price, \
     limit_price, total_price, status, cancellation_reason, executed_price, executed_at, \
     profit_loss, created_at";
const HOLDING_COLUMNS: &str = "id, user_id, symbol, name, quantity, avg_price, last_price, \
     total_price, profit_loss, status, version, created_at, updated_at";
const FILL_COLUMNS: &str = "id, user_id, order_id, holding_id, symbol, side, quantity, price, \
     total_price, realized_pnl, executed_at";
const LOT_COLUMNS: &str = "fill_id, user_id, holding_id, symbol, remaining, price, opened_at";
const TRANSACTION_COLUMNS: &str = "id, user_id, kind, amount, currency, symbol, quantity, price, \
     total_value, balance_before, balance_after, profit_loss, description, created_at";
const WATCHLIST_COLUMNS: &str = "user_id, symbol, added_at";

/// A ledger stored in PostgreSQL. Each commit runs in one database transaction.
#[derive(Debug, Clone)]
pub struct PgLedger(PgPool);

impl PgLedger {
    /// Establishes a connection pool to the PostgreSQL database and runs migrations.
    ///
    /// # Arguments
    ///
    /// * `settings`: The database configuration settings.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.url)
            .await?;

        // Run database migrations. This ensures the database schema is up-to-date.
        sqlx::migrate!("../../migrations").run(&pool).await?;

        Ok(PgLedger(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgLedger(pool)
    }

    pub fn pool(&self) -> &PgPool {
        &self.0
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create_account(&self, account: &Account) -> Result<Account> {
        sqlx::query(
            "INSERT INTO accounts (user_id, username, virtual_balance, total_deposited, \
             total_withdrawn, currency, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(account.user_id.0)
        .bind(&account.username)
        .bind(account.virtual_balance)
        .bind(account.total_deposited)
        .bind(account.total_withdrawn)
        .bind(&account.currency)
        .bind(account.created_at)
        .execute(&self.0)
        .await
        .map_err(Error::OperationFailed)?;

        self.account(account.user_id)
            .await?
            .ok_or(Error::AccountNotFound(account.user_id))
    }

    async fn account(&self, user_id: UserId) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1");
        let row = sqlx::query(&sql)
            .bind(user_id.0)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.0)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, seq DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.0)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        rows.iter().map(order_from_row).collect()
    }

    async fn find_pending_limit_orders(&self) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND mode = $2 \
             ORDER BY created_at, seq"
        );
        let rows = sqlx::query(&sql)
            .bind(OrderStatus::Pending.as_str())
            .bind(OrderMode::Limit.as_str())
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        rows.iter().map(order_from_row).collect()
    }

    async fn find_holding(&self, user_id: UserId, symbol: &Symbol) -> Result<Option<Holding>> {
        let sql = format!("SELECT {HOLDING_COLUMNS} FROM holdings WHERE user_id = $1 AND symbol = $2");
        let row = sqlx::query(&sql)
            .bind(user_id.0)
            .bind(symbol.as_str())
            .fetch_optional(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        row.as_ref().map(holding_from_row).transpose()
    }

    async fn holding(&self, holding_id: HoldingId) -> Result<Option<Holding>> {
        let sql = format!("SELECT {HOLDING_COLUMNS} FROM holdings WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(holding_id.0)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        row.as_ref().map(holding_from_row).transpose()
    }

    async fn holdings_for_user(&self, user_id: UserId) -> Result<Vec<Holding>> {
        let sql = format!("SELECT {HOLDING_COLUMNS} FROM holdings WHERE user_id = $1 ORDER BY created_at");
        let rows = sqlx::query(&sql)
            .bind(user_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        rows.iter().map(holding_from_row).collect()
    }

    async fn open_holdings(&self) -> Result<Vec<Holding>> {
        let sql = format!("SELECT {HOLDING_COLUMNS} FROM holdings ORDER BY created_at");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        rows.iter().map(holding_from_row).collect()
    }

    async fn update_holding_valuation(
        &self,
        holding_id: HoldingId,
        valuation: &Valuation,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE holdings SET last_price = $2, profit_loss = $3, status = $4, updated_at = $5 \
             WHERE id = $1 AND version = $6",
        )
        .bind(holding_id.0)
        .bind(valuation.last_price)
        .bind(valuation.profit_loss)
        .bind(valuation.status.as_str())
        .bind(valuation.updated_at)
        .bind(valuation.expected_version)
        .execute(&self.0)
        .await
        .map_err(Error::OperationFailed)?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_open_lots(&self, user_id: UserId, symbol: &Symbol) -> Result<Vec<OpenLot>> {
        let sql = format!(
            "SELECT {LOT_COLUMNS} FROM open_lots WHERE user_id = $1 AND symbol = $2 \
             ORDER BY opened_at, seq"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.0)
            .bind(symbol.as_str())
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        rows.iter().map(lot_from_row).collect()
    }

    async fn fills_for_user(&self, user_id: UserId) -> Result<Vec<Fill>> {
        let sql = format!("SELECT {FILL_COLUMNS} FROM fills WHERE user_id = $1 ORDER BY seq");
        let rows = sqlx::query(&sql)
            .bind(user_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        rows.iter().map(fill_from_row).collect()
    }

    async fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = $1 ORDER BY seq"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(transaction_id.0)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn watchlist(&self, user_id: UserId) -> Result<Vec<WatchlistEntry>> {
        let sql = format!("SELECT {WATCHLIST_COLUMNS} FROM watchlist WHERE user_id = $1 ORDER BY seq");
        let rows = sqlx::query(&sql)
            .bind(user_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        rows.iter().map(watchlist_from_row).collect()
    }

    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<bool> {
        if self.account(entry.user_id).await?.is_none() {
            return Err(Error::AccountNotFound(entry.user_id));
        }
        let result = sqlx::query(
            "INSERT INTO watchlist (user_id, symbol, added_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, symbol) DO NOTHING",
        )
        .bind(entry.user_id.0)
        .bind(entry.symbol.as_str())
        .bind(entry.added_at)
        .execute(&self.0)
        .await
        .map_err(Error::OperationFailed)?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_from_watchlist(&self, user_id: UserId, symbol: &Symbol) -> Result<bool> {
        let result = sqlx::query("DELETE FROM watchlist WHERE user_id = $1 AND symbol = $2")
            .bind(user_id.0)
            .bind(symbol.as_str())
            .execute(&self.0)
            .await
            .map_err(Error::OperationFailed)?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt> {
        let mut tx = self.0.begin().await.map_err(Error::OperationFailed)?;
        let user_id = commit.user_id;

        // --- Step 1: Order insert or compare-and-swap transition ---
        if let Some(write) = &commit.order {
            apply_order(&mut *tx, user_id, write).await?;
        }

        // --- Step 2: Balance, under a row lock ---
        let transaction = match &commit.balance {
            Some(change) => Some(apply_balance(&mut *tx, user_id, change).await?),
            None => None,
        };

        // --- Step 3: Fill log and lot index ---
        for fill in &commit.fills {
            insert_fill(&mut *tx, fill).await?;
        }
        for write in &commit.lots {
            apply_lot(&mut *tx, write).await?;
        }

        // --- Step 4: Holding, checked against its version ---
        if let Some(write) = &commit.holding {
            apply_holding(&mut *tx, write).await?;
        }

        // Dropping `tx` on any early return above rolls everything back.
        tx.commit().await.map_err(Error::OperationFailed)?;
        Ok(CommitReceipt { transaction })
    }
}

async fn apply_order(conn: &mut PgConnection, user_id: UserId, write: &OrderWrite) -> Result<()> {
    match write {
        OrderWrite::Insert(order) => {
            let result = sqlx::query(
                "INSERT INTO orders (id, user_id, symbol, name, side, mode, quantity, price, \
                 limit_price, total_price, status, cancellation_reason, executed_price, \
                 executed_at, profit_loss, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(order.id.0)
            .bind(order.user_id.0)
            .bind(order.symbol.as_str())
            .bind(&order.name)
            .bind(order.side.as_str())
            .bind(order.mode.as_str())
            .bind(order.quantity)
            .bind(order.price)
            .bind(order.limit_price)
            .bind(order.total_price)
            .bind(order.status.as_str())
            .bind(&order.cancellation_reason)
            .bind(order.executed_price)
            .bind(order.executed_at)
            .bind(order.profit_loss)
            .bind(order.created_at)
            .execute(&mut *conn)
            .await
            .map_err(Error::OperationFailed)?;
            if result.rows_affected() == 0 {
                return Err(Error::Conflict(format!("order {} already exists", order.id)));
            }
        }
        OrderWrite::Transition { order_id, from, to, execution, reason } => {
            let result = sqlx::query(
                "UPDATE orders SET status = $4, \
                 cancellation_reason = COALESCE($5, cancellation_reason), \
                 executed_price = COALESCE($6, executed_price), \
                 executed_at = COALESCE($7, executed_at), \
                 profit_loss = COALESCE($8, profit_loss) \
                 WHERE id = $1 AND user_id = $2 AND status = $3",
            )
            .bind(order_id.0)
            .bind(user_id.0)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(reason.as_deref())
            .bind(execution.as_ref().map(|e| e.price))
            .bind(execution.as_ref().map(|e| e.executed_at))
            .bind(execution.as_ref().and_then(|e| e.profit_loss))
            .execute(&mut *conn)
            .await
            .map_err(Error::OperationFailed)?;
            if result.rows_affected() == 0 {
                return Err(Error::Conflict(format!("order {} is no longer {}", order_id, from)));
            }
        }
    }
    Ok(())
}

async fn apply_balance(
    conn: &mut PgConnection,
    user_id: UserId,
    change: &BalanceChange,
) -> Result<Transaction> {
    let row = sqlx::query("SELECT virtual_balance, currency FROM accounts WHERE user_id = $1 FOR UPDATE")
        .bind(user_id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::OperationFailed)?
        .ok_or(Error::AccountNotFound(user_id))?;
    let balance_before: Decimal = col(&row, "virtual_balance")?;
    let currency: String = col(&row, "currency")?;

    let balance_after = balance_before
        .checked_add(change.delta)
        .ok_or_else(|| Error::OutOfRange(format!("balance of account {}", user_id)))?;
    if balance_after < Decimal::ZERO {
        return Err(Error::InsufficientFunds {
            available: balance_before,
            requested: -change.delta,
        });
    }

    let (deposited, withdrawn) = match change.transaction.kind {
        TransactionKind::Deposit => (change.delta, Decimal::ZERO),
        TransactionKind::Withdrawal => (Decimal::ZERO, -change.delta),
        TransactionKind::TradeBuy | TransactionKind::TradeSell => (Decimal::ZERO, Decimal::ZERO),
    };
    sqlx::query(
        "UPDATE accounts SET virtual_balance = $2, total_deposited = total_deposited + $3, \
         total_withdrawn = total_withdrawn + $4 WHERE user_id = $1",
    )
    .bind(user_id.0)
    .bind(balance_after)
    .bind(deposited)
    .bind(withdrawn)
    .execute(&mut *conn)
    .await
    .map_err(Error::OperationFailed)?;

    let draft = &change.transaction;
    let transaction = Transaction {
        id: TransactionId::new(),
        user_id,
        kind: draft.kind,
        amount: change.delta,
        currency,
        symbol: draft.symbol.clone(),
        quantity: draft.quantity,
        price: draft.price,
        total_value: draft.total_value,
        balance_before,
        balance_after,
        profit_loss: draft.profit_loss,
        description: draft.description.clone(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO transactions (id, user_id, kind, amount, currency, symbol, quantity, price, \
         total_value, balance_before, balance_after, profit_loss, description, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(transaction.id.0)
    .bind(transaction.user_id.0)
    .bind(transaction.kind.as_str())
    .bind(transaction.amount)
    .bind(&transaction.currency)
    .bind(transaction.symbol.as_ref().map(|s| s.as_str()))
    .bind(transaction.quantity)
    .bind(transaction.price)
    .bind(transaction.total_value)
    .bind(transaction.balance_before)
    .bind(transaction.balance_after)
    .bind(transaction.profit_loss)
    .bind(&transaction.description)
    .bind(transaction.created_at)
    .execute(&mut *conn)
    .await
    .map_err(Error::OperationFailed)?;

    Ok(transaction)
}

async fn insert_fill(conn: &mut PgConnection, fill: &Fill) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO fills (id, user_id, order_id, holding_id, symbol, side, quantity, price, \
         total_price, realized_pnl, executed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) ON CONFLICT (id) DO NOTHING",
    )
    .bind(fill.id.0)
    .bind(fill.user_id.0)
    .bind(fill.order_id.0)
    .bind(fill.holding_id.0)
    .bind(fill.symbol.as_str())
    .bind(fill.side.as_str())
    .bind(fill.quantity)
    .bind(fill.price)
    .bind(fill.total_price)
    .bind(fill.realized_pnl)
    .bind(fill.executed_at)
    .execute(&mut *conn)
    .await
    .map_err(Error::OperationFailed)?;
    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!("fill {} already recorded", fill.id)));
    }
    Ok(())
}

async fn apply_lot(conn: &mut PgConnection, write: &LotWrite) -> Result<()> {
    let result = match write {
        LotWrite::Open(lot) => sqlx::query(
            "INSERT INTO open_lots (fill_id, user_id, holding_id, symbol, remaining, price, opened_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (fill_id) DO NOTHING",
        )
        .bind(lot.fill_id.0)
        .bind(lot.user_id.0)
        .bind(lot.holding_id.0)
        .bind(lot.symbol.as_str())
        .bind(lot.remaining)
        .bind(lot.price)
        .bind(lot.opened_at)
        .execute(&mut *conn)
        .await,
        LotWrite::Reduce { fill_id, expected_remaining, remaining: 0 } => {
            sqlx::query("DELETE FROM open_lots WHERE fill_id = $1 AND remaining = $2")
                .bind(fill_id.0)
                .bind(*expected_remaining)
                .execute(&mut *conn)
                .await
        }
        LotWrite::Reduce { fill_id, expected_remaining, remaining } => {
            sqlx::query("UPDATE open_lots SET remaining = $3 WHERE fill_id = $1 AND remaining = $2")
                .bind(fill_id.0)
                .bind(*expected_remaining)
                .bind(*remaining)
                .execute(&mut *conn)
                .await
        }
    }
    .map_err(Error::OperationFailed)?;

    if result.rows_affected() == 0 {
        let fill_id = match write {
            LotWrite::Open(lot) => lot.fill_id,
            LotWrite::Reduce { fill_id, .. } => *fill_id,
        };
        return Err(Error::Conflict(format!("lot {} changed", fill_id)));
    }
    Ok(())
}

async fn apply_holding(conn: &mut PgConnection, write: &HoldingWrite) -> Result<()> {
    let (result, id) = match write {
        HoldingWrite::Create(h) => {
            let result = sqlx::query(
                "INSERT INTO holdings (id, user_id, symbol, name, quantity, avg_price, last_price, \
                 total_price, profit_loss, status, version, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
                 ON CONFLICT (user_id, symbol) DO NOTHING",
            )
            .bind(h.id.0)
            .bind(h.user_id.0)
            .bind(h.symbol.as_str())
            .bind(&h.name)
            .bind(h.quantity)
            .bind(h.avg_price)
            .bind(h.last_price)
            .bind(h.total_price)
            .bind(h.profit_loss)
            .bind(h.status.as_str())
            .bind(h.version)
            .bind(h.created_at)
            .bind(h.updated_at)
            .execute(&mut *conn)
            .await;
            (result, h.id)
        }
        HoldingWrite::Update { holding: h, expected_version } => {
            let result = sqlx::query(
                "UPDATE holdings SET name = $3, quantity = $4, avg_price = $5, last_price = $6, \
                 total_price = $7, profit_loss = $8, status = $9, updated_at = $10, \
                 version = version + 1 \
                 WHERE id = $1 AND version = $2",
            )
            .bind(h.id.0)
            .bind(*expected_version)
            .bind(&h.name)
            .bind(h.quantity)
            .bind(h.avg_price)
            .bind(h.last_price)
            .bind(h.total_price)
            .bind(h.profit_loss)
            .bind(h.status.as_str())
            .bind(h.updated_at)
            .execute(&mut *conn)
            .await;
            (result, h.id)
        }
        HoldingWrite::Delete { id, expected_version } => {
            let result = sqlx::query("DELETE FROM holdings WHERE id = $1 AND version = $2")
                .bind(id.0)
                .bind(*expected_version)
                .execute(&mut *conn)
                .await;
            (result, *id)
        }
    };

    if result.map_err(Error::OperationFailed)?.rows_affected() == 0 {
        return Err(Error::Conflict(format!("holding {} changed", id)));
    }
    Ok(())
}

// --- Row mappers ---

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(Error::OperationFailed)
}

fn symbol(row: &PgRow, name: &str) -> Result<Symbol> {
    Ok(Symbol(col::<String>(row, name)?))
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        user_id: UserId(col::<Uuid>(row, "user_id")?),
        username: col(row, "username")?,
        virtual_balance: col(row, "virtual_balance")?,
        total_deposited: col(row, "total_deposited")?,
        total_withdrawn: col(row, "total_withdrawn")?,
        currency: col(row, "currency")?,
        created_at: col(row, "created_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId(col::<Uuid>(row, "id")?),
        user_id: UserId(col::<Uuid>(row, "user_id")?),
        symbol: symbol(row, "symbol")?,
        name: col(row, "name")?,
        side: col::<String>(row, "side")?.parse()?,
        mode: col::<String>(row, "mode")?.parse()?,
        quantity: col(row, "quantity")?,
        price: col(row, "price")?,
        limit_price: col(row, "limit_price")?,
        total_price: col(row, "total_price")?,
        status: col::<String>(row, "status")?.parse()?,
        cancellation_reason: col(row, "cancellation_reason")?,
        executed_price: col(row, "executed_price")?,
        executed_at: col(row, "executed_at")?,
        profit_loss: col(row, "profit_loss")?,
        created_at: col(row, "created_at")?,
    })
}

fn holding_from_row(row: &PgRow) -> Result<Holding> {
    Ok(Holding {
        id: HoldingId(col::<Uuid>(row, "id")?),
        user_id: UserId(col::<Uuid>(row, "user_id")?),
        symbol: symbol(row, "symbol")?,
        name: col(row, "name")?,
        quantity: col(row, "quantity")?,
        avg_price: col(row, "avg_price")?,
        last_price: col(row, "last_price")?,
        total_price: col(row, "total_price")?,
        profit_loss: col(row, "profit_loss")?,
        status: col::<String>(row, "status")?.parse()?,
        version: col(row, "version")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn fill_from_row(row: &PgRow) -> Result<Fill> {
    Ok(Fill {
        id: FillId(col::<Uuid>(row, "id")?),
        user_id: UserId(col::<Uuid>(row, "user_id")?),
        order_id: OrderId(col::<Uuid>(row, "order_id")?),
        holding_id: HoldingId(col::<Uuid>(row, "holding_id")?),
        symbol: symbol(row, "symbol")?,
        side: col::<String>(row, "side")?.parse()?,
        quantity: col(row, "quantity")?,
        price: col(row, "price")?,
        total_price: col(row, "total_price")?,
        realized_pnl: col(row, "realized_pnl")?,
        executed_at: col(row, "executed_at")?,
    })
}

fn lot_from_row(row: &PgRow) -> Result<OpenLot> {
    Ok(OpenLot {
        fill_id: FillId(col::<Uuid>(row, "fill_id")?),
        user_id: UserId(col::<Uuid>(row, "user_id")?),
        holding_id: HoldingId(col::<Uuid>(row, "holding_id")?),
        symbol: symbol(row, "symbol")?,
        remaining: col(row, "remaining")?,
        price: col(row, "price")?,
        opened_at: col(row, "opened_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    Ok(Transaction {
        id: TransactionId(col::<Uuid>(row, "id")?),
        user_id: UserId(col::<Uuid>(row, "user_id")?),
        kind: col::<String>(row, "kind")?.parse()?,
        amount: col(row, "amount")?,
        currency: col(row, "currency")?,
        symbol: col::<Option<String>>(row, "symbol")?.map(Symbol),
        quantity: col(row, "quantity")?,
        price: col(row, "price")?,
        total_value: col(row, "total_value")?,
        balance_before: col(row, "balance_before")?,
        balance_after: col(row, "balance_after")?,
        profit_loss: col(row, "profit_loss")?,
        description: col(row, "description")?,
        created_at: col(row, "created_at")?,
    })
}

fn watchlist_from_row(row: &PgRow) -> Result<WatchlistEntry> {
    Ok(WatchlistEntry {
        user_id: UserId(col::<Uuid>(row, "user_id")?),
        symbol: symbol(row, "symbol")?,
        added_at: col(row, "added_at")?,
    })
}
