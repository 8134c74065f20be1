use tokio_postgres::GenericClient;

use oms_domain::{AccountId, Deal, DealId, ExchangeTradeId, OrderId, PositionId, StrategyId};

use super::{order_side_from_sql, order_side_to_sql};
use crate::error::Result;

pub async fn insert_position_deal(client: &impl GenericClient, deal: &Deal) -> Result<DealId> {
    let row = client
        .query_one(
            "INSERT INTO deals (account_id, order_id, position_id, symbol, side, qty, price, fee, \
             fee_currency, pnl, strategy_id, reason, reconciled, exchange_trade_id) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14) RETURNING id",
            &[
                &deal.account_id.get(),
                &deal.order_id.map(|id| id.get()),
                &deal.position_id.get(),
                &deal.symbol,
                &order_side_to_sql(deal.side),
                &deal.qty,
                &deal.price,
                &deal.fee,
                &deal.fee_currency,
                &deal.pnl,
                &deal.strategy_id.get(),
                &deal.reason,
                &deal.reconciled,
                &deal.exchange_trade_id.as_ref().map(|id| id.as_str()),
            ],
        )
        .await?;
    Ok(DealId::from(row.get::<_, i64>("id")))
}

/// Dedup check for `(account_id, exchange_trade_id)` (spec.md §3 Deal
/// invariants, §4.6 step 1 "If a deal with this exchange_trade_id already
/// exists, return").
pub async fn deal_exists_by_exchange_trade_id(
    client: &impl GenericClient,
    account_id: AccountId,
    exchange_trade_id: &ExchangeTradeId,
) -> Result<bool> {
    let row = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM deals WHERE account_id = $1 AND exchange_trade_id = $2) AS exists_",
            &[&account_id.get(), &exchange_trade_id.as_str()],
        )
        .await?;
    Ok(row.get("exists_"))
}

/// `oms_query{deals}` (spec.md §6).
pub async fn list_deals_for_account(client: &impl GenericClient, account_id: AccountId, limit: i64) -> Result<Vec<Deal>> {
    let rows = client
        .query(
            "SELECT id, account_id, order_id, position_id, symbol, side, qty, price, fee, fee_currency, pnl, \
             strategy_id, reason, reconciled, exchange_trade_id FROM deals WHERE account_id = $1 ORDER BY id DESC LIMIT $2",
            &[&account_id.get(), &limit],
        )
        .await?;
    rows.iter().map(map_deal).collect()
}

fn map_deal(row: &tokio_postgres::Row) -> Result<Deal> {
    let side: String = row.get("side");
    Ok(Deal {
        id: DealId::from(row.get::<_, i64>("id")),
        account_id: AccountId::from(row.get::<_, i64>("account_id")),
        order_id: row.get::<_, Option<i64>>("order_id").map(OrderId::from),
        position_id: PositionId::from(row.get::<_, i64>("position_id")),
        symbol: row.get("symbol"),
        side: order_side_from_sql(&side).ok_or(crate::error::DbError::Decode {
            field: "side",
            reason: side.clone(),
        })?,
        qty: row.get("qty"),
        price: row.get("price"),
        fee: row.get("fee"),
        fee_currency: row.get("fee_currency"),
        pnl: row.get("pnl"),
        strategy_id: StrategyId::from(row.get::<_, i64>("strategy_id")),
        reason: row.get("reason"),
        reconciled: row.get("reconciled"),
        exchange_trade_id: row.get::<_, Option<String>>("exchange_trade_id").map(ExchangeTradeId::new),
    })
}

/// `change_order`'s orphan-adoption branch carries the replaced order's
/// strategy onto any deals already recorded against the orphan (spec.md
/// §4.5 `change_order` consolidation: "adopt the orphan... reassign its
/// deals to the original order's strategy").
pub async fn reassign_deals_strategy_by_order_ids(
    client: &impl GenericClient,
    order_ids: &[OrderId],
    strategy_id: StrategyId,
) -> Result<u64> {
    if order_ids.is_empty() {
        return Ok(0);
    }
    let ids: Vec<i64> = order_ids.iter().map(|id| id.get()).collect();
    client
        .execute("UPDATE deals SET strategy_id = $1 WHERE order_id = ANY($2)", &[&strategy_id.get(), &ids])
        .await
        .map_err(Into::into)
}
