// In crates/execution/src/planner.rs

use crate::types::{FillRequest, OrderOrigin};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use core_types::{
    Account, Fill, FillId, Holding, HoldingId, HoldingStatus, OpenLot, Order, OrderStatus, Side,
    TransactionKind, checked_total, validate_price, validate_quantity,
};
use database::{
    BalanceChange, ExecutionDetails, HoldingWrite, LedgerCommit, LotWrite, OrderWrite,
    TransactionDraft,
};
use rust_decimal::Decimal;

/// A fill worked out against a snapshot of the position, ready to commit.
#[derive(Debug, Clone)]
pub struct FillPlan {
    pub commit: LedgerCommit,
    pub order: Order,
    pub fill: Fill,
    pub holding_after: Option<Holding>,
    pub realized_pnl: Option<Decimal>,
}

/// Plans a BUY: debit the cash, grow the position at a new average cost,
/// log the fill and open a lot for it.
pub fn plan_buy(
    request: &FillRequest,
    account: &Account,
    holding: Option<&Holding>,
    now: DateTime<Utc>,
) -> Result<FillPlan> {
    validate_quantity(request.quantity)?;
    validate_price(request.price)?;
    // --- 1. Check the cash ---
    let cost = checked_total(request.price, request.quantity)?;
    if account.virtual_balance < cost {
        return Err(Error::InsufficientBalance {
            required: cost,
            available: account.virtual_balance,
        });
    }

    // --- 2. Grow or open the position ---
    let (holding_after, holding_write) = match holding {
        Some(existing) => {
            let new_quantity = existing
                .quantity
                .checked_add(request.quantity)
                .ok_or_else(|| out_of_range("position size"))?;
            let total_price = existing
                .total_price
                .checked_add(cost)
                .ok_or_else(|| out_of_range("position cost"))?;
            let avg_price = total_price / Decimal::from(new_quantity);
            let profit_loss = pnl(request.price, avg_price, new_quantity)?;
            let updated = Holding {
                name: request.name.clone(),
                quantity: new_quantity,
                avg_price,
                last_price: request.price,
                total_price,
                profit_loss,
                status: HoldingStatus::from_pnl(profit_loss),
                version: existing.version + 1,
                updated_at: now,
                ..existing.clone()
            };
            let write = HoldingWrite::Update {
                holding: updated.clone(),
                expected_version: existing.version,
            };
            (updated, write)
        }
        None => {
            let created = Holding {
                id: HoldingId::new(),
                user_id: request.user_id,
                symbol: request.symbol.clone(),
                name: request.name.clone(),
                quantity: request.quantity,
                avg_price: request.price,
                last_price: request.price,
                total_price: cost,
                profit_loss: Decimal::ZERO,
                status: HoldingStatus::Neutral,
                version: 0,
                created_at: now,
                updated_at: now,
            };
            (created.clone(), HoldingWrite::Create(created))
        }
    };

    // --- 3. Accept the order, log the fill, open a lot ---
    let (order, order_write) = accept_order(request, now, None)?;
    let fill = Fill {
        id: FillId::new(),
        user_id: request.user_id,
        order_id: order.id,
        holding_id: holding_after.id,
        symbol: request.symbol.clone(),
        side: Side::Buy,
        quantity: request.quantity,
        price: request.price,
        total_price: cost,
        realized_pnl: None,
        executed_at: now,
    };

    // --- 4. Debit the account ---
    let balance = BalanceChange {
        delta: -cost,
        transaction: TransactionDraft {
            kind: TransactionKind::TradeBuy,
            symbol: Some(request.symbol.clone()),
            quantity: Some(request.quantity),
            price: Some(request.price),
            total_value: Some(cost),
            profit_loss: None,
            description: format!("Bought {} {} @ {}", request.quantity, request.symbol, request.price),
        },
    };

    let commit = LedgerCommit::new(request.user_id)
        .with_order(order_write)
        .with_balance(balance)
        .with_fill(fill.clone())
        .with_lot(LotWrite::Open(OpenLot::from_fill(&fill)))
        .with_holding(holding_write);

    Ok(FillPlan {
        commit,
        order,
        fill,
        holding_after: Some(holding_after),
        realized_pnl: None,
    })
}

fn out_of_range(what: &str) -> Error {
    Error::InvalidOrder(format!("{} would be out of range", what))
}

/// `(price - cost) × quantity`, failing instead of overflowing.
fn pnl(price: Decimal, cost: Decimal, quantity: i64) -> Result<Decimal> {
    price
        .checked_sub(cost)
        .and_then(|per_share| per_share.checked_mul(Decimal::from(quantity)))
        .ok_or_else(|| out_of_range("profit/loss"))
}

/// Plans a SELL: credit the proceeds, shrink or close the position, log the
/// fill and consume lots oldest first.
///
/// Realized P&L is measured against the position's average cost, which a sell
/// leaves unchanged.
pub fn plan_sell(
    request: &FillRequest,
    holding: Option<&Holding>,
    lots: &[OpenLot],
    now: DateTime<Utc>,
) -> Result<FillPlan> {
    validate_quantity(request.quantity)?;
    validate_price(request.price)?;

    // --- 1. Check the position ---
    let holding = holding.ok_or_else(|| Error::HoldingNotFound(request.symbol.clone()))?;
    if request.quantity > holding.quantity {
        return Err(Error::InsufficientQuantity {
            requested: request.quantity,
            available: holding.quantity,
        });
    }

    let proceeds = checked_total(request.price, request.quantity)?;
    let realized_pnl = pnl(request.price, holding.avg_price, request.quantity)?;

    // --- 2. Consume lots FIFO ---
    let lot_writes = consume_lots(lots, request.quantity)?;

    // --- 3. Shrink or close the position ---
    let remaining = holding.quantity - request.quantity;
    let (holding_after, holding_write) = if remaining == 0 {
        let write = HoldingWrite::Delete {
            id: holding.id,
            expected_version: holding.version,
        };
        (None, write)
    } else {
        let profit_loss = pnl(request.price, holding.avg_price, remaining)?;
        let updated = Holding {
            quantity: remaining,
            total_price: checked_total(holding.avg_price, remaining)?,
            last_price: request.price,
            profit_loss,
            status: HoldingStatus::from_pnl(profit_loss),
            version: holding.version + 1,
            updated_at: now,
            ..holding.clone()
        };
        let write = HoldingWrite::Update {
            holding: updated.clone(),
            expected_version: holding.version,
        };
        (Some(updated), write)
    };

    // --- 4. Accept the order and log the fill ---
    let (order, order_write) = accept_order(request, now, Some(realized_pnl))?;
    let fill = Fill {
        id: FillId::new(),
        user_id: request.user_id,
        order_id: order.id,
        holding_id: holding.id,
        symbol: request.symbol.clone(),
        side: Side::Sell,
        quantity: request.quantity,
        price: request.price,
        total_price: proceeds,
        realized_pnl: Some(realized_pnl),
        executed_at: now,
    };

    // --- 5. Credit the account ---
    let balance = BalanceChange {
        delta: proceeds,
        transaction: TransactionDraft {
            kind: TransactionKind::TradeSell,
            symbol: Some(request.symbol.clone()),
            quantity: Some(request.quantity),
            price: Some(request.price),
            total_value: Some(proceeds),
            profit_loss: Some(realized_pnl),
            description: format!("Sold {} {} @ {}", request.quantity, request.symbol, request.price),
        },
    };

    let mut commit = LedgerCommit::new(request.user_id)
        .with_order(order_write)
        .with_balance(balance)
        .with_fill(fill.clone())
        .with_holding(holding_write);
    commit.lots = lot_writes;

    Ok(FillPlan {
        commit,
        order,
        fill,
        holding_after,
        realized_pnl: Some(realized_pnl),
    })
}

/// Takes `quantity` shares from `lots` in order, returning one write per lot touched.
fn consume_lots(lots: &[OpenLot], quantity: i64) -> Result<Vec<LotWrite>> {
    let mut left = quantity;
    let mut writes = Vec::new();

    for lot in lots {
        if left == 0 {
            break;
        }
        let take = left.min(lot.remaining);
        writes.push(LotWrite::Reduce {
            fill_id: lot.fill_id,
            expected_remaining: lot.remaining,
            remaining: lot.remaining - take,
        });
        left -= take;
    }

    if left > 0 {
        return Err(Error::Store(database::Error::Corrupt(format!(
            "open lots cover {} fewer shares than the holding",
            left
        ))));
    }
    Ok(writes)
}

/// Builds the accepted order record and the write that produces it.
fn accept_order(
    request: &FillRequest,
    now: DateTime<Utc>,
    profit_loss: Option<Decimal>,
) -> Result<(Order, OrderWrite)> {
    let execution = ExecutionDetails {
        price: request.price,
        executed_at: now,
        profit_loss,
    };

    match &request.origin {
        OrderOrigin::Market => {
            let mut order = Order::market(
                request.user_id,
                request.symbol.clone(),
                request.name.clone(),
                request.side,
                request.quantity,
                request.price,
            )?;
            order.status = OrderStatus::Accepted;
            order.executed_price = Some(execution.price);
            order.executed_at = Some(now);
            order.profit_loss = profit_loss;
            order.created_at = now;
            Ok((order.clone(), OrderWrite::Insert(order)))
        }
        OrderOrigin::Pending(pending) => {
            if pending.status != OrderStatus::Pending {
                return Err(Error::OrderNotFound(pending.id));
            }
            let order = Order {
                status: OrderStatus::Accepted,
                executed_price: Some(execution.price),
                executed_at: Some(now),
                profit_loss,
                ..pending.clone()
            };
            let write = OrderWrite::Transition {
                order_id: pending.id,
                from: OrderStatus::Pending,
                to: OrderStatus::Accepted,
                execution: Some(execution),
                reason: None,
            };
            Ok((order, write))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Symbol, UserId};
    use rust_decimal_macros::dec;

    fn acme() -> Symbol {
        Symbol::new("ACME").unwrap()
    }

    fn account(balance: Decimal) -> Account {
        let mut account = Account::open(UserId::new(), "trader", "INR");
        account.virtual_balance = balance;
        account
    }

    fn lot(holding: &Holding, remaining: i64, price: Decimal, offset_secs: i64) -> OpenLot {
        OpenLot {
            fill_id: FillId::new(),
            user_id: holding.user_id,
            holding_id: holding.id,
            symbol: holding.symbol.clone(),
            remaining,
            price,
            opened_at: holding.created_at + chrono::Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn first_buy_opens_position_at_fill_price() {
        let account = account(dec!(10000));
        let request = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 10, dec!(100));

        let plan = plan_buy(&request, &account, None, Utc::now()).unwrap();

        let holding = plan.holding_after.unwrap();
        assert_eq!(holding.quantity, 10);
        assert_eq!(holding.avg_price, dec!(100));
        assert_eq!(plan.order.status, OrderStatus::Accepted);
        assert_eq!(plan.commit.balance.as_ref().unwrap().delta, dec!(-1000));
        assert!(matches!(plan.commit.holding, Some(HoldingWrite::Create(_))));
        assert_eq!(plan.commit.lots.len(), 1);
    }

    #[test]
    fn second_buy_reaverages_cost() {
        let account = account(dec!(9000));
        let first = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 10, dec!(100));
        let existing = plan_buy(&first, &account, None, Utc::now()).unwrap().holding_after.unwrap();

        let second = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 5, dec!(120));
        let plan = plan_buy(&second, &account, Some(&existing), Utc::now()).unwrap();

        let holding = plan.holding_after.unwrap();
        assert_eq!(holding.quantity, 15);
        assert_eq!(holding.avg_price.round_dp(2), dec!(106.67));
        assert_eq!(holding.total_price, dec!(1600));
        match plan.commit.holding {
            Some(HoldingWrite::Update { expected_version, .. }) => assert_eq!(expected_version, 0),
            other => panic!("unexpected holding write: {:?}", other),
        }
    }

    #[test]
    fn buy_beyond_balance_is_rejected() {
        let account = account(dec!(999.99));
        let request = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 10, dec!(100));

        match plan_buy(&request, &account, None, Utc::now()) {
            Err(Error::InsufficientBalance { required, available }) => {
                assert_eq!(required, dec!(1000));
                assert_eq!(available, dec!(999.99));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn buy_that_would_overflow_the_position_is_invalid() {
        let account = account(dec!(10000));
        let first = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 1, dec!(1));
        let mut existing = plan_buy(&first, &account, None, Utc::now()).unwrap().holding_after.unwrap();
        existing.quantity = i64::MAX - 1;

        let second = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 10, dec!(1));
        let result = plan_buy(&second, &account, Some(&existing), Utc::now());

        assert!(matches!(result, Err(Error::InvalidOrder(msg)) if msg.contains("position size")));
    }

    #[test]
    fn oversized_fill_is_rejected_before_any_arithmetic() {
        let account = account(Decimal::MAX);
        let request =
            FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, i64::MAX, dec!(100000000000));

        assert!(matches!(
            plan_buy(&request, &account, None, Utc::now()),
            Err(Error::InvalidOrder(_))
        ));
    }

    #[test]
    fn partial_sell_consumes_oldest_lots_first() {
        let account = account(dec!(10000));
        let buy = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 15, dec!(100));
        let holding = plan_buy(&buy, &account, None, Utc::now()).unwrap().holding_after.unwrap();
        let lots = vec![lot(&holding, 10, dec!(100), 0), lot(&holding, 5, dec!(120), 1)];

        let sell = FillRequest::market(account.user_id, acme(), "Acme", Side::Sell, 12, dec!(110));
        let plan = plan_sell(&sell, Some(&holding), &lots, Utc::now()).unwrap();

        assert_eq!(plan.commit.lots.len(), 2);
        match (&plan.commit.lots[0], &plan.commit.lots[1]) {
            (
                LotWrite::Reduce { remaining: first, .. },
                LotWrite::Reduce { remaining: second, .. },
            ) => assert_eq!((*first, *second), (0, 3)),
            other => panic!("unexpected lot writes: {:?}", other),
        }

        let after = plan.holding_after.unwrap();
        assert_eq!(after.quantity, 3);
        assert_eq!(after.avg_price, dec!(100));
        assert_eq!(after.total_price, dec!(300));
        assert_eq!(plan.realized_pnl, Some(dec!(120)));
        assert_eq!(plan.commit.balance.unwrap().delta, dec!(1320));
    }

    #[test]
    fn selling_everything_deletes_the_holding() {
        let account = account(dec!(1000));
        let buy = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 10, dec!(100));
        let holding = plan_buy(&buy, &account, None, Utc::now()).unwrap().holding_after.unwrap();
        let lots = vec![lot(&holding, 10, dec!(100), 0)];

        let sell = FillRequest::market(account.user_id, acme(), "Acme", Side::Sell, 10, dec!(90));
        let plan = plan_sell(&sell, Some(&holding), &lots, Utc::now()).unwrap();

        assert!(plan.holding_after.is_none());
        assert!(matches!(plan.commit.holding, Some(HoldingWrite::Delete { .. })));
        assert_eq!(plan.realized_pnl, Some(dec!(-100)));
        assert_eq!(plan.order.profit_loss, Some(dec!(-100)));
    }

    #[test]
    fn oversell_is_rejected() {
        let account = account(dec!(1000));
        let buy = FillRequest::market(account.user_id, acme(), "Acme", Side::Buy, 5, dec!(100));
        let holding = plan_buy(&buy, &account, None, Utc::now()).unwrap().holding_after.unwrap();

        let sell = FillRequest::market(account.user_id, acme(), "Acme", Side::Sell, 6, dec!(100));
        assert!(matches!(
            plan_sell(&sell, Some(&holding), &[], Utc::now()),
            Err(Error::InsufficientQuantity { requested: 6, available: 5 })
        ));
        assert!(matches!(
            plan_sell(&sell, None, &[], Utc::now()),
            Err(Error::HoldingNotFound(_))
        ));
    }

    #[test]
    fn pending_order_is_transitioned_not_inserted() {
        let account = account(dec!(1000));
        let order = Order::limit(account.user_id, acme(), "Acme", Side::Buy, 10, dec!(50), Some(dec!(55)))
            .unwrap();
        let request = FillRequest::pending(order.clone(), dec!(49));

        let plan = plan_buy(&request, &account, None, Utc::now()).unwrap();

        assert_eq!(plan.order.id, order.id);
        assert_eq!(plan.order.executed_price, Some(dec!(49)));
        assert_eq!(plan.order.limit_price, Some(dec!(50)));
        assert!(matches!(
            plan.commit.order,
            Some(OrderWrite::Transition { from: OrderStatus::Pending, to: OrderStatus::Accepted, .. })
        ));
        assert_eq!(plan.commit.balance.unwrap().delta, dec!(-490));
    }
}
