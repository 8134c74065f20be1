use tokio_postgres::{GenericClient, Row};

use oms_domain::order::{EditReplaceState, EXTERNAL_REASON, EXTERNAL_STRATEGY_ID};
use oms_domain::{
    AccountId, Amount, ClientOrderId, CommandId, ExchangeOrderId, Order, OrderId, OrderSide, OrderStatus, OrderType,
    Price, PositionId, StrategyId,
};

use super::{
    edit_replace_state_from_sql, edit_replace_state_to_sql, order_side_from_sql, order_side_to_sql, order_status_from_sql,
    order_status_to_sql, order_type_from_sql, order_type_to_sql,
};
use crate::error::{DbError, Result};

fn map_order(row: &Row) -> Result<Order> {
    let status: String = row.get("status");
    let side: String = row.get("side");
    let order_type: String = row.get("order_type");
    let edit_replace_state: Option<String> = row.get("edit_replace_state");
    Ok(Order {
        id: OrderId::from(row.get::<_, i64>("id")),
        account_id: AccountId::from(row.get::<_, i64>("account_id")),
        command_id: row.get::<_, Option<i64>>("command_id").map(CommandId::from),
        strategy_id: StrategyId::from(row.get::<_, i64>("strategy_id")),
        position_id: row.get::<_, Option<i64>>("position_id").map(PositionId::from),
        symbol: row.get("symbol"),
        side: order_side_from_sql(&side).ok_or(DbError::Decode {
            field: "side",
            reason: side.clone(),
        })?,
        order_type: order_type_from_sql(&order_type).ok_or(DbError::Decode {
            field: "order_type",
            reason: order_type.clone(),
        })?,
        qty: row.get("qty"),
        price: row.get("price"),
        filled_qty: row.get("filled_qty"),
        avg_fill_price: row.get("avg_fill_price"),
        status: order_status_from_sql(&status).ok_or(DbError::Decode {
            field: "status",
            reason: status.clone(),
        })?,
        client_order_id: row.get::<_, Option<String>>("client_order_id").map(ClientOrderId::new),
        exchange_order_id: row
            .get::<_, Option<String>>("exchange_order_id")
            .map(ExchangeOrderId::new),
        stop_loss: row.get("stop_loss"),
        stop_gain: row.get("stop_gain"),
        reason: row.get("reason"),
        comment: row.get("comment"),
        edit_replace_state: edit_replace_state
            .map(|s| edit_replace_state_from_sql(&s).ok_or(DbError::Decode { field: "edit_replace_state", reason: s }))
            .transpose()?,
    })
}

const ORDER_COLUMNS: &str = "id, account_id, command_id, strategy_id, position_id, symbol, side, order_type, \
     qty, price, filled_qty, avg_fill_price, status, client_order_id, exchange_order_id, stop_loss, \
     stop_gain, reason, comment, edit_replace_state";

/// Pre-creates a `PENDING_SUBMIT` order for `send_order` intake (spec.md
/// §4.3 step 2).
pub async fn insert_position_order_pending_submit(
    client: &impl GenericClient,
    order: &Order,
) -> Result<Order> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO orders (account_id, command_id, strategy_id, position_id, symbol, side, \
                 order_type, qty, price, status, client_order_id, stop_loss, stop_gain, reason, comment) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15) RETURNING {ORDER_COLUMNS}"
            ),
            &[
                &order.account_id.get(),
                &order.command_id.map(|id| id.get()),
                &order.strategy_id.get(),
                &order.position_id.map(|id| id.get()),
                &order.symbol,
                &order_side_to_sql(order.side),
                &order_type_to_sql(order.order_type),
                &order.qty,
                &order.price,
                &order_status_to_sql(OrderStatus::PendingSubmit),
                &order.client_order_id.as_ref().map(|id| id.as_str()),
                &order.stop_loss,
                &order.stop_gain,
                &order.reason,
                &order.comment,
            ],
        )
        .await?;
    map_order(&row)
}

pub async fn fetch_order_by_id(client: &impl GenericClient, order_id: OrderId) -> Result<Option<Order>> {
    let row = client
        .query_opt(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"),
            &[&order_id.get()],
        )
        .await?;
    row.as_ref().map(map_order).transpose()
}

/// Loads the pre-created order bound to a `send_order` command (spec.md
/// §4.5 `send_order` "Load the pre-created order").
pub async fn fetch_order_for_command_send(
    client: &impl GenericClient,
    command_id: CommandId,
) -> Result<Option<Order>> {
    let row = client
        .query_opt(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE command_id = $1"),
            &[&command_id.get()],
        )
        .await?;
    row.as_ref().map(map_order).transpose()
}

pub async fn mark_order_submitted_exchange(
    client: &impl GenericClient,
    order_id: OrderId,
    exchange_order_id: &ExchangeOrderId,
) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET status = $1, exchange_order_id = $2 WHERE id = $3",
            &[&order_status_to_sql(OrderStatus::Submitted), &exchange_order_id.as_str(), &order_id.get()],
        )
        .await?;
    Ok(())
}

/// Same as `mark_order_submitted_exchange` but also records the fill values
/// an exchange may echo back immediately on `create_order`.
pub async fn mark_order_submitted_exchange_with_values(
    client: &impl GenericClient,
    order_id: OrderId,
    exchange_order_id: &ExchangeOrderId,
    filled_qty: rust_decimal::Decimal,
    avg_fill_price: Option<rust_decimal::Decimal>,
) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET status = $1, exchange_order_id = $2, filled_qty = $3, avg_fill_price = $4 \
             WHERE id = $5",
            &[
                &order_status_to_sql(OrderStatus::Submitted),
                &exchange_order_id.as_str(),
                &filled_qty,
                &avg_fill_price,
                &order_id.get(),
            ],
        )
        .await?;
    Ok(())
}

/// `change_order`'s in-place edit success path (spec.md §4.5 `change_order`:
/// "update local order values").
pub async fn update_order_qty_price(
    client: &impl GenericClient,
    order_id: OrderId,
    qty: Amount,
    price: Option<Price>,
) -> Result<()> {
    client
        .execute("UPDATE orders SET qty = $1, price = $2 WHERE id = $3", &[&qty, &price, &order_id.get()])
        .await?;
    Ok(())
}

/// `change_order`'s cancel-and-replace success path when no orphan order was
/// found (spec.md §4.5 `change_order`: "update the local order with the new
/// exchange_order_id and values").
pub async fn mark_order_replaced(
    client: &impl GenericClient,
    order_id: OrderId,
    exchange_order_id: &ExchangeOrderId,
    qty: Amount,
    price: Option<Price>,
) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET status = $1, exchange_order_id = $2, qty = $3, price = $4, edit_replace_state = NULL \
             WHERE id = $5",
            &[
                &order_status_to_sql(OrderStatus::Submitted),
                &exchange_order_id.as_str(),
                &qty,
                &price,
                &order_id.get(),
            ],
        )
        .await?;
    Ok(())
}

pub async fn mark_order_rejected(client: &impl GenericClient, order_id: OrderId, reason: &str) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET status = $1, closed_at = now(), comment = $2 WHERE id = $3",
            &[&order_status_to_sql(OrderStatus::Rejected), &reason, &order_id.get()],
        )
        .await?;
    Ok(())
}

pub async fn mark_order_canceled(client: &impl GenericClient, order_id: OrderId) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET status = $1, closed_at = now() WHERE id = $2",
            &[&order_status_to_sql(OrderStatus::Canceled), &order_id.get()],
        )
        .await?;
    Ok(())
}

/// `change_order` cancel-and-replace path (spec.md §4.5 `change_order`):
/// the old order is marked canceled but awaiting a replacement fill, not
/// terminally closed.
pub async fn mark_order_canceled_edit_pending(client: &impl GenericClient, order_id: OrderId) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET status = $1, edit_replace_state = $2 WHERE id = $3",
            &[
                &order_status_to_sql(OrderStatus::CanceledEditPending),
                &edit_replace_state_to_sql(EditReplaceState::Pending),
                &order_id.get(),
            ],
        )
        .await?;
    Ok(())
}

/// Consolidation step of `change_order`'s orphan-adoption branch (spec.md
/// §4.5 `change_order`, §3 Order lifecycle): the replaced order points at
/// the orphan it was consolidated into, purely for audit.
pub async fn mark_order_consolidated_to_orphan(
    client: &impl GenericClient,
    order_id: OrderId,
    orphan_order_id: OrderId,
) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET edit_replace_state = $1, consolidated_into = $2 WHERE id = $3",
            &[
                &edit_replace_state_to_sql(EditReplaceState::Consolidated),
                &orphan_order_id.get(),
                &order_id.get(),
            ],
        )
        .await?;
    Ok(())
}

/// `oms_query{orders_open}` (spec.md §6).
pub async fn list_open_orders_for_account(client: &impl GenericClient, account_id: AccountId) -> Result<Vec<Order>> {
    let rows = client
        .query(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 AND status IN \
                 ('PENDING_SUBMIT','SUBMITTED','PARTIALLY_FILLED','CANCELED_EDIT_PENDING') ORDER BY id DESC"
            ),
            &[&account_id.get()],
        )
        .await?;
    rows.iter().map(map_order).collect()
}

/// `oms_query{orders_history}` (spec.md §6).
pub async fn list_order_history_for_account(client: &impl GenericClient, account_id: AccountId, limit: i64) -> Result<Vec<Order>> {
    let rows = client
        .query(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 AND status IN \
                 ('FILLED','CANCELED','REJECTED') ORDER BY id DESC LIMIT $2"
            ),
            &[&account_id.get(), &limit],
        )
        .await?;
    rows.iter().map(map_order).collect()
}

pub async fn list_cancelable_orders(
    client: &impl GenericClient,
    account_id: AccountId,
    strategy_ids: Option<&[StrategyId]>,
) -> Result<Vec<Order>> {
    let rows = match strategy_ids {
        Some(ids) if !ids.is_empty() => {
            let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
            client
                .query(
                    &format!(
                        "SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 AND status IN \
                         ('PENDING_SUBMIT','SUBMITTED','PARTIALLY_FILLED') AND strategy_id = ANY($2)"
                    ),
                    &[&account_id.get(), &ids],
                )
                .await?
        }
        _ => {
            client
                .query(
                    &format!(
                        "SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 AND status IN \
                         ('PENDING_SUBMIT','SUBMITTED','PARTIALLY_FILLED')"
                    ),
                    &[&account_id.get()],
                )
                .await?
        }
    };
    rows.iter().map(map_order).collect()
}

/// Probes whether the reconciler already adopted an "external unmatched"
/// order for the exchange order a `change_order` replace just created
/// (spec.md §4.5 `change_order` consolidation branch).
pub async fn find_external_orphan_order_for_replace(
    client: &impl GenericClient,
    account_id: AccountId,
    exchange_order_id: Option<&ExchangeOrderId>,
    client_order_id: Option<&ClientOrderId>,
) -> Result<Option<Order>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 AND strategy_id = $2 AND reason = $3 \
                 AND (($4::text IS NOT NULL AND exchange_order_id = $4) OR ($5::text IS NOT NULL AND client_order_id = $5)) \
                 LIMIT 1"
            ),
            &[
                &account_id.get(),
                &EXTERNAL_STRATEGY_ID.get(),
                &EXTERNAL_REASON,
                &exchange_order_id.map(|id| id.as_str()),
                &client_order_id.map(|id| id.as_str()),
            ],
        )
        .await?;
    row.as_ref().map(map_order).transpose()
}

/// Adopts an orphan order by copying the originating order's
/// strategy/reason/comment onto it (spec.md §4.5 `change_order`
/// consolidation: "adopt the orphan by copying the original's strategy_id,
/// reason, comment").
pub async fn adopt_external_orphan_order(
    client: &impl GenericClient,
    orphan_order_id: OrderId,
    strategy_id: StrategyId,
    reason: &str,
    comment: Option<&str>,
) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET strategy_id = $1, reason = $2, comment = $3 WHERE id = $4",
            &[&strategy_id.get(), &reason, &comment, &orphan_order_id.get()],
        )
        .await?;
    Ok(())
}

pub async fn reassign_orders(
    client: &impl GenericClient,
    from_position_id: PositionId,
    to_position_id: PositionId,
) -> Result<u64> {
    client
        .execute(
            "UPDATE orders SET position_id = $1 WHERE position_id = $2",
            &[&to_position_id.get(), &from_position_id.get()],
        )
        .await
        .map_err(Into::into)
}

pub async fn update_order_position_link(
    client: &impl GenericClient,
    order_id: OrderId,
    position_id: PositionId,
) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET position_id = $1 WHERE id = $2",
            &[&position_id.get(), &order_id.get()],
        )
        .await?;
    Ok(())
}

/// `oms_reassign`'s order-only corrective reassignment (spec.md §6
/// `oms_reassign`), grounded in `repository_mysql.py::reassign_orders`:
/// moves the given orders' `strategy_id` (and, if supplied, `position_id`)
/// within one account. Scoped by `account_id` so a caller can never touch
/// another account's orders by guessing ids.
pub async fn reassign_orders_strategy(
    client: &impl GenericClient,
    account_id: AccountId,
    order_ids: &[OrderId],
    strategy_id: StrategyId,
    position_id: Option<PositionId>,
) -> Result<u64> {
    if order_ids.is_empty() {
        return Ok(0);
    }
    let ids: Vec<i64> = order_ids.iter().map(|id| id.get()).collect();
    let rows = match position_id {
        Some(position_id) => {
            client
                .execute(
                    "UPDATE orders SET strategy_id = $1, position_id = $2 WHERE account_id = $3 AND id = ANY($4)",
                    &[&strategy_id.get(), &position_id.get(), &account_id.get(), &ids],
                )
                .await?
        }
        None => {
            client
                .execute(
                    "UPDATE orders SET strategy_id = $1 WHERE account_id = $2 AND id = ANY($3)",
                    &[&strategy_id.get(), &account_id.get(), &ids],
                )
                .await?
        }
    };
    Ok(rows)
}

/// Reconciler's `linked_order` lookup, exchange-id side (spec.md §4.6 step 2
/// "find the order this trade belongs to by `exchange_order_id`").
pub async fn fetch_order_by_exchange_order_id(
    client: &impl GenericClient,
    account_id: AccountId,
    exchange_order_id: &ExchangeOrderId,
) -> Result<Option<Order>> {
    let row = client
        .query_opt(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 AND exchange_order_id = $2"),
            &[&account_id.get(), &exchange_order_id.as_str()],
        )
        .await?;
    row.as_ref().map(map_order).transpose()
}

/// Reconciler's `linked_order` lookup, client-id side (spec.md §4.6 step 2
/// "...then by `client_order_id`").
pub async fn fetch_order_by_client_order_id(
    client: &impl GenericClient,
    account_id: AccountId,
    client_order_id: &ClientOrderId,
) -> Result<Option<Order>> {
    let row = client
        .query_opt(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 AND client_order_id = $2"),
            &[&account_id.get(), &client_order_id.as_str()],
        )
        .await?;
    row.as_ref().map(map_order).transpose()
}

/// Synthesizes an order row for a trade the reconciler cannot link to
/// anything the OMS submitted (spec.md §4.6 step 2 "adopt it as an
/// isolated external order", `EXTERNAL_STRATEGY_ID`/`EXTERNAL_REASON`).
#[allow(clippy::too_many_arguments)]
pub async fn get_or_create_external_unmatched_order(
    client: &impl GenericClient,
    account_id: AccountId,
    symbol: &str,
    side: OrderSide,
    qty: Amount,
    price: Amount,
    exchange_order_id: Option<&ExchangeOrderId>,
    client_order_id: Option<&ClientOrderId>,
) -> Result<Order> {
    if let Some(id) = exchange_order_id {
        if let Some(existing) = fetch_order_by_exchange_order_id(client, account_id, id).await? {
            return Ok(existing);
        }
    }
    if let Some(id) = client_order_id {
        if let Some(existing) = fetch_order_by_client_order_id(client, account_id, id).await? {
            return Ok(existing);
        }
    }
    let row = client
        .query_one(
            &format!(
                "INSERT INTO orders (account_id, strategy_id, symbol, side, order_type, qty, price, \
                 filled_qty, avg_fill_price, status, client_order_id, exchange_order_id, reason) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13) RETURNING {ORDER_COLUMNS}"
            ),
            &[
                &account_id.get(),
                &EXTERNAL_STRATEGY_ID.get(),
                &symbol,
                &order_side_to_sql(side),
                &order_type_to_sql(OrderType::Market),
                &qty,
                &price,
                &qty,
                &price,
                &order_status_to_sql(OrderStatus::Filled),
                &client_order_id.map(|id| id.as_str()),
                &exchange_order_id.map(|id| id.as_str()),
                &EXTERNAL_REASON,
            ],
        )
        .await?;
    map_order(&row)
}

/// `change_order`'s cancel-and-replace failure branch (spec.md §4.5
/// `change_order`: "mark the old order `edit_replace_state = failed`").
pub async fn mark_order_edit_replace_failed(client: &impl GenericClient, order_id: OrderId, reason: &str) -> Result<()> {
    client
        .execute(
            "UPDATE orders SET edit_replace_state = $1, comment = $2 WHERE id = $3",
            &[&edit_replace_state_to_sql(EditReplaceState::Failed), &reason, &order_id.get()],
        )
        .await?;
    Ok(())
}
