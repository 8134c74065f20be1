use tokio_postgres::{GenericClient, Row};

use oms_domain::order::EXTERNAL_STRATEGY_ID;
use oms_domain::{AccountId, Amount, OrderSide, Position, PositionId, Price, StrategyId};

use super::{order_side_from_sql, order_side_to_sql, position_state_from_sql};
use crate::error::{DbError, Result};

const POSITION_COLUMNS: &str =
    "id, account_id, strategy_id, symbol, side, qty, avg_price, state, stop_loss, stop_gain, reason, \
     opened_at, closed_at";

fn map_position(row: &Row) -> Result<Position> {
    let side: String = row.get("side");
    let state: String = row.get("state");
    Ok(Position {
        id: PositionId::from(row.get::<_, i64>("id")),
        account_id: AccountId::from(row.get::<_, i64>("account_id")),
        strategy_id: StrategyId::from(row.get::<_, i64>("strategy_id")),
        symbol: row.get("symbol"),
        side: order_side_from_sql(&side).ok_or(DbError::Decode {
            field: "side",
            reason: side.clone(),
        })?,
        qty: row.get("qty"),
        avg_price: row.get("avg_price"),
        state: position_state_from_sql(&state).ok_or(DbError::Decode {
            field: "state",
            reason: state.clone(),
        })?,
        stop_loss: row.get("stop_loss"),
        stop_gain: row.get("stop_gain"),
        reason: row.get("reason"),
        opened_at: row.get("opened_at"),
        closed_at: row.get("closed_at"),
    })
}

pub async fn fetch_open_position(client: &impl GenericClient, position_id: PositionId) -> Result<Option<Position>> {
    let row = client
        .query_opt(
            &format!("SELECT {POSITION_COLUMNS} FROM positions WHERE id = $1 AND state = 'open'"),
            &[&position_id.get()],
        )
        .await?;
    row.as_ref().map(map_position).transpose()
}

/// Hedge-mode lookup: at most one open position per `(account, symbol,
/// side)` (spec.md §3 invariants, §4.6 hedge projection).
pub async fn fetch_open_position_for_symbol(
    client: &impl GenericClient,
    account_id: AccountId,
    symbol: &str,
    side: OrderSide,
) -> Result<Option<Position>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {POSITION_COLUMNS} FROM positions WHERE account_id = $1 AND symbol = $2 AND side = $3 \
                 AND state = 'open'"
            ),
            &[&account_id.get(), &symbol, &order_side_to_sql(side)],
        )
        .await?;
    row.as_ref().map(map_position).transpose()
}

/// Netting-mode lookup: at most one open net position per `(account,
/// symbol)`, regardless of side (spec.md §3 invariants, §4.6 netting
/// projection).
pub async fn fetch_open_net_position_by_symbol(
    client: &impl GenericClient,
    account_id: AccountId,
    symbol: &str,
) -> Result<Option<Position>> {
    let row = client
        .query_opt(
            &format!("SELECT {POSITION_COLUMNS} FROM positions WHERE account_id = $1 AND symbol = $2 AND state = 'open'"),
            &[&account_id.get(), &symbol],
        )
        .await?;
    row.as_ref().map(map_position).transpose()
}

/// Hedge-mode lookup excluding isolated-external positions (spec.md §4.6
/// hedge branch: "reuse an existing opposite-side non-external position
/// before creating a new one").
pub async fn fetch_open_position_for_symbol_non_external(
    client: &impl GenericClient,
    account_id: AccountId,
    symbol: &str,
    side: OrderSide,
) -> Result<Option<Position>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {POSITION_COLUMNS} FROM positions WHERE account_id = $1 AND symbol = $2 AND side = $3 \
                 AND state = 'open' AND strategy_id <> $4"
            ),
            &[&account_id.get(), &symbol, &order_side_to_sql(side), &EXTERNAL_STRATEGY_ID.get()],
        )
        .await?;
    row.as_ref().map(map_position).transpose()
}

/// Netting-mode lookup excluding isolated-external positions (spec.md §4.6
/// netting branch).
pub async fn fetch_open_net_position_by_symbol_non_external(
    client: &impl GenericClient,
    account_id: AccountId,
    symbol: &str,
) -> Result<Option<Position>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {POSITION_COLUMNS} FROM positions WHERE account_id = $1 AND symbol = $2 AND state = 'open' \
                 AND strategy_id <> $3"
            ),
            &[&account_id.get(), &symbol, &EXTERNAL_STRATEGY_ID.get()],
        )
        .await?;
    row.as_ref().map(map_position).transpose()
}

/// `strategy_netting` lookup: one net position per `(account, symbol,
/// strategy)` rather than per `(account, symbol)` (SPEC_FULL.md §3,
/// generalizing `worker_position.py`'s two-mode `mode == "hedge"` branch).
pub async fn fetch_open_net_position_by_symbol_strategy(
    client: &impl GenericClient,
    account_id: AccountId,
    symbol: &str,
    strategy_id: StrategyId,
) -> Result<Option<Position>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {POSITION_COLUMNS} FROM positions WHERE account_id = $1 AND symbol = $2 AND state = 'open' \
                 AND strategy_id = $3"
            ),
            &[&account_id.get(), &symbol, &strategy_id.get()],
        )
        .await?;
    row.as_ref().map(map_position).transpose()
}

/// `oms_query{positions_open}` (spec.md §6).
pub async fn list_open_positions_for_account(client: &impl GenericClient, account_id: AccountId) -> Result<Vec<Position>> {
    let rows = client
        .query(
            &format!("SELECT {POSITION_COLUMNS} FROM positions WHERE account_id = $1 AND state = 'open' ORDER BY id DESC"),
            &[&account_id.get()],
        )
        .await?;
    rows.iter().map(map_position).collect()
}

/// `oms_query{positions_history}` (spec.md §6).
pub async fn list_position_history_for_account(client: &impl GenericClient, account_id: AccountId, limit: i64) -> Result<Vec<Position>> {
    let rows = client
        .query(
            &format!(
                "SELECT {POSITION_COLUMNS} FROM positions WHERE account_id = $1 AND state = 'closed' \
                 ORDER BY closed_at DESC LIMIT $2"
            ),
            &[&account_id.get(), &limit],
        )
        .await?;
    rows.iter().map(map_position).collect()
}

/// Fallback symbol universe when a bulk `fetch_my_trades(symbol=None)` call
/// fails and the reconciler must retry per-symbol (spec.md §4.6 "Fetch
/// trades... on failure, fall back to iterating recently active symbols").
pub async fn list_recent_symbols_for_account(
    client: &impl GenericClient,
    account_id: AccountId,
    limit: i64,
) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT symbol FROM positions WHERE account_id = $1 \
             UNION \
             SELECT symbol FROM orders WHERE account_id = $1 \
             ORDER BY symbol LIMIT $2",
            &[&account_id.get(), &limit],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get("symbol")).collect())
}

#[allow(clippy::too_many_arguments)]
pub async fn create_position_open(
    client: &impl GenericClient,
    account_id: AccountId,
    strategy_id: StrategyId,
    symbol: &str,
    side: OrderSide,
    qty: Amount,
    avg_price: Price,
    reason: &str,
) -> Result<Position> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO positions (account_id, strategy_id, symbol, side, qty, avg_price, state, reason) \
                 VALUES ($1,$2,$3,$4,$5,$6,'open',$7) RETURNING {POSITION_COLUMNS}"
            ),
            &[
                &account_id.get(),
                &strategy_id.get(),
                &symbol,
                &order_side_to_sql(side),
                &qty,
                &avg_price,
                &reason,
            ],
        )
        .await?;
    map_position(&row)
}

pub async fn update_position_open_qty_price(
    client: &impl GenericClient,
    position_id: PositionId,
    qty: Amount,
    avg_price: Price,
) -> Result<()> {
    client
        .execute(
            "UPDATE positions SET qty = $1, avg_price = $2 WHERE id = $3",
            &[&qty, &avg_price, &position_id.get()],
        )
        .await?;
    Ok(())
}

/// Closes a position when quantity reaches zero (spec.md §3 Position
/// invariants: `qty = 0` and `closed_at` non-null when closed).
pub async fn close_position(client: &impl GenericClient, position_id: PositionId) -> Result<()> {
    client
        .execute(
            "UPDATE positions SET state = 'closed', qty = 0, closed_at = now() WHERE id = $1",
            &[&position_id.get()],
        )
        .await?;
    Ok(())
}

/// Closes the source side of a `merge_positions` command (spec.md §4.5.1
/// step 6 "Mark S as closed (merged)"). Distinguished from `close_position`
/// only by its caller's intent; the row shape is identical.
pub async fn close_position_merged(client: &impl GenericClient, position_id: PositionId) -> Result<()> {
    close_position(client, position_id).await
}

/// §4.5.1 step 4: reassign all of S's open orders to T.
pub async fn reassign_open_orders_position(
    client: &impl GenericClient,
    source_position_id: PositionId,
    target_position_id: PositionId,
) -> Result<u64> {
    super::orders::reassign_orders(client, source_position_id, target_position_id).await
}

/// §4.5.1 step 5: reassign all of S's deals to T.
pub async fn reassign_deals_position(
    client: &impl GenericClient,
    source_position_id: PositionId,
    target_position_id: PositionId,
) -> Result<u64> {
    client
        .execute(
            "UPDATE deals SET position_id = $1 WHERE position_id = $2",
            &[&target_position_id.get(), &source_position_id.get()],
        )
        .await
        .map_err(Into::into)
}

pub async fn update_position_targets_comment(
    client: &impl GenericClient,
    position_id: PositionId,
    stop_loss: Option<Price>,
    stop_gain: Option<Price>,
) -> Result<()> {
    client
        .execute(
            "UPDATE positions SET stop_loss = $1, stop_gain = $2 WHERE id = $3",
            &[&stop_loss, &stop_gain, &position_id.get()],
        )
        .await?;
    Ok(())
}
