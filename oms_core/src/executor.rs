//! Command execution (spec.md §4.5), grounded on
//! `command_executor.py::execute_command_by_id` and its
//! `_merge_open_positions_keep_target` helper: given a claimed
//! `PositionCommand`, run its domain-specific branch, then apply the shared
//! error-model recovery (order rejection, close-lock release, position
//! reopen) if that branch failed. The queue worker owns the transaction
//! boundary and the command/queue row status; this module only touches
//! orders, positions, deals and the event outbox.

use serde_json::Value;
use tokio_postgres::GenericClient;

use oms_database::{deals, events, locks, orders, positions};
use oms_domain::event::EventNamespace;
use oms_domain::{
    Account, AccountId, Amount, CommandId, CommandPayload, ExchangeOrderId, Order, OrderExecutionHints, OrderId,
    OrderStatus, OrderType, Position, PositionCommand, PositionId, Price, StopMode, StrategyId,
};
use oms_utils::decimal::GetOrErr;

use crate::exchange::adapter::ExchangeAdapter;
use crate::exchange::client::ExchangeCredentials;
use crate::error::ExecutorError;

/// Runs one claimed command against the exchange and the store. Returns the
/// error the queue worker should classify (permanent vs. retryable); domain
/// state rollback for a failed command is handled here, before returning.
pub async fn execute_command(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    account: &Account,
    credentials: &ExchangeCredentials,
    command: &PositionCommand,
) -> Result<(), ExecutorError> {
    let outcome = dispatch(client, adapter, account, credentials, command).await;
    if let Err(ref err) = outcome {
        handle_failure(client, command, err).await?;
    }
    outcome
}

async fn dispatch(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    account: &Account,
    credentials: &ExchangeCredentials,
    command: &PositionCommand,
) -> Result<(), ExecutorError> {
    let exchange_id = account
        .parsed_exchange_id()
        .map_err(|_| ExecutorError::permanent("unsupported exchange_id"))?;
    let session_key = format!("account:{}", account.id.get());

    match &command.payload {
        CommandPayload::SendOrder {
            hints, client_order_id, ..
        } => {
            send_order(
                client,
                adapter,
                &exchange_id,
                &session_key,
                credentials,
                account.id,
                command.id,
                hints,
                client_order_id.as_deref(),
            )
            .await
        }
        CommandPayload::CancelOrder { order_id, order_ids } => {
            cancel_order(client, adapter, &exchange_id, &session_key, credentials, account.id, *order_id, order_ids.clone()).await
        }
        CommandPayload::CancelAllOrders { strategy_ids, .. } => {
            cancel_all_orders(client, adapter, &exchange_id, &session_key, credentials, account.id, strategy_ids.clone()).await
        }
        CommandPayload::ChangeOrder { order_id, new_price, new_qty } => {
            change_order(
                client,
                adapter,
                &exchange_id,
                &session_key,
                credentials,
                account.id,
                *order_id,
                *new_price,
                *new_qty,
            )
            .await
        }
        CommandPayload::ClosePosition {
            position_id,
            order_type,
            price,
            strategy_id,
            ..
        } => {
            close_position(
                client,
                adapter,
                &exchange_id,
                &session_key,
                credentials,
                account.id,
                command.id,
                *position_id,
                *order_type,
                *price,
                *strategy_id,
            )
            .await
        }
        CommandPayload::CloseBy {
            position_id_a,
            position_id_b,
            qty,
            strategy_id,
        } => close_by(client, account.id, *position_id_a, *position_id_b, *qty, *strategy_id).await,
        CommandPayload::MergePositions {
            source_position_id,
            target_position_id,
            stop_mode,
            oms_stop_loss,
            oms_stop_gain,
        } => {
            merge_positions(
                client,
                account.id,
                *source_position_id,
                *target_position_id,
                *stop_mode,
                *oms_stop_loss,
                *oms_stop_gain,
            )
            .await
        }
        CommandPayload::PositionChange {
            position_id,
            oms_stop_loss,
            oms_stop_gain,
            comment,
        } => position_change(client, account.id, *position_id, *oms_stop_loss, *oms_stop_gain, comment.clone()).await,
    }
}

/// Error-model recovery (spec.md §4.5): a close-lock is always released when
/// the failed command was `close_position`, whether the error was permanent
/// or retryable. Order rejection and position reopen only apply to
/// `PermanentCommandError`.
async fn handle_failure(client: &impl GenericClient, command: &PositionCommand, err: &ExecutorError) -> Result<(), ExecutorError> {
    if let CommandPayload::ClosePosition { position_id, .. } = &command.payload {
        locks::release_close_position_lock(client, *position_id).await?;
    }
    if let ExecutorError::Permanent(reason) = err {
        if let Some(order) = orders::fetch_order_for_command_send(client, command.id).await? {
            if !order.status.is_terminal() {
                orders::mark_order_rejected(client, order.id, reason).await?;
            }
        }
        if let CommandPayload::ClosePosition { position_id, .. } = &command.payload {
            positions::reopen_position_if_close_requested(client, *position_id).await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn send_order(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    exchange_id: &oms_domain::ExchangeId,
    session_key: &str,
    credentials: &ExchangeCredentials,
    account_id: AccountId,
    command_id: CommandId,
    hints: &OrderExecutionHints,
    client_order_id: Option<&str>,
) -> Result<(), ExecutorError> {
    let order = orders::fetch_order_for_command_send(client, command_id)
        .await?
        .ok_or_else(|| ExecutorError::permanent("no pending order for send_order command"))?;
    submit_order_to_exchange(client, adapter, exchange_id, session_key, credentials, account_id, &order, hints, client_order_id).await
}

/// Shared by `send_order` and `close_position`: both submit a freshly
/// inserted `PENDING_SUBMIT` order to the exchange and record the fill it
/// echoes back (spec.md §4.5 `send_order`, DESIGN.md Open Question 4).
#[allow(clippy::too_many_arguments)]
async fn submit_order_to_exchange(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    exchange_id: &oms_domain::ExchangeId,
    session_key: &str,
    credentials: &ExchangeCredentials,
    account_id: AccountId,
    order: &Order,
    hints: &OrderExecutionHints,
    client_order_id: Option<&str>,
) -> Result<(), ExecutorError> {
    let default_client_order_id = client_order_id.map(str::to_owned).unwrap_or_else(|| order.id.get().to_string());
    let params = build_order_params(hints, default_client_order_id);
    let response = adapter
        .create_order(
            exchange_id,
            session_key,
            credentials,
            &order.symbol,
            order.side.as_str(),
            order_type_str(order.order_type),
            decimal_value(order.qty),
            order.price.map(decimal_value),
            params,
        )
        .await?;

    let exchange_order_id = ExchangeOrderId::new(response.get_as_str("id")?);
    let filled_qty = response.get_as_decimal("filled").unwrap_or(Amount::ZERO);
    let avg_fill_price = response.get_as_decimal("average").or_else(|| response.get_as_decimal("price"));

    orders::mark_order_submitted_exchange_with_values(client, order.id, &exchange_order_id, filled_qty, avg_fill_price).await?;
    events::insert_ccxt_order_raw(client, account_id, &response).await?;
    events::insert_event(
        client,
        account_id,
        EventNamespace::Ccxt.as_str(),
        "order_submitted",
        &serde_json::json!({
            "order_id": order.id.get(),
            "exchange_order_id": exchange_order_id.as_str(),
            "symbol": order.symbol,
            "side": order.side,
            "qty": order.qty,
        }),
    )
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cancel_order(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    exchange_id: &oms_domain::ExchangeId,
    session_key: &str,
    credentials: &ExchangeCredentials,
    account_id: AccountId,
    order_id: Option<OrderId>,
    order_ids: Option<Vec<OrderId>>,
) -> Result<(), ExecutorError> {
    let mut ids = Vec::new();
    ids.extend(order_id);
    ids.extend(order_ids.into_iter().flatten());

    let mut candidates = Vec::new();
    for id in ids {
        if let Some(order) = orders::fetch_order_by_id(client, id).await? {
            if order.account_id == account_id && order.status.is_cancelable() {
                candidates.push(order);
            }
        }
    }
    cancel_orders_and_emit(client, adapter, exchange_id, session_key, credentials, account_id, candidates).await
}

async fn cancel_all_orders(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    exchange_id: &oms_domain::ExchangeId,
    session_key: &str,
    credentials: &ExchangeCredentials,
    account_id: AccountId,
    strategy_ids: Option<Vec<StrategyId>>,
) -> Result<(), ExecutorError> {
    let candidates = orders::list_cancelable_orders(client, account_id, strategy_ids.as_deref()).await?;
    cancel_orders_and_emit(client, adapter, exchange_id, session_key, credentials, account_id, candidates).await
}

/// Shared tail of `cancel_order`/`cancel_all_orders` (spec.md §4.5
/// "Failures are skipped, not fatal. If zero cancellations succeed, raise
/// PermanentCommandError").
async fn cancel_orders_and_emit(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    exchange_id: &oms_domain::ExchangeId,
    session_key: &str,
    credentials: &ExchangeCredentials,
    account_id: AccountId,
    candidates: Vec<Order>,
) -> Result<(), ExecutorError> {
    let mut canceled = Vec::new();
    let mut failed = Vec::new();

    for order in candidates {
        let Some(exchange_order_id) = order.exchange_order_id.clone() else {
            failed.push(order.id.get());
            continue;
        };
        match adapter
            .cancel_order(exchange_id, session_key, credentials, exchange_order_id.as_str(), &order.symbol, Value::Null)
            .await
        {
            Ok(response) => {
                orders::mark_order_canceled(client, order.id).await?;
                events::insert_ccxt_order_raw(client, account_id, &response).await?;
                events::insert_event(
                    client,
                    account_id,
                    EventNamespace::Ccxt.as_str(),
                    "order_canceled",
                    &serde_json::json!({"order_id": order.id.get(), "exchange_order_id": exchange_order_id.as_str(), "symbol": order.symbol}),
                )
                .await?;
                canceled.push(order.id.get());
            }
            Err(_) => failed.push(order.id.get()),
        }
    }

    if canceled.is_empty() {
        return Err(ExecutorError::permanent("no orders canceled"));
    }

    events::insert_event(
        client,
        account_id,
        EventNamespace::Ccxt.as_str(),
        "cancel_batch_summary",
        &serde_json::json!({"canceled_order_ids": canceled, "failed_order_ids": failed}),
    )
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn change_order(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    exchange_id: &oms_domain::ExchangeId,
    session_key: &str,
    credentials: &ExchangeCredentials,
    account_id: AccountId,
    order_id: OrderId,
    new_price: Option<Price>,
    new_qty: Option<Amount>,
) -> Result<(), ExecutorError> {
    let order = orders::fetch_order_by_id(client, order_id)
        .await?
        .ok_or_else(|| ExecutorError::permanent("order not found for change_order"))?;
    let exchange_order_id = order
        .exchange_order_id
        .clone()
        .ok_or_else(|| ExecutorError::permanent("order has no exchange_order_id to change"))?;

    let qty = new_qty.unwrap_or(order.qty);
    let price = new_price.or(order.price);
    let client_order_id = order.default_client_order_id();
    let order_type = order_type_str(order.order_type);
    let side = order.side.as_str();
    let params = build_order_params(&OrderExecutionHints::default(), client_order_id.as_str().to_owned());

    // Inlines `ExchangeAdapter::edit_or_replace_order`'s branches rather than
    // calling it directly: the replace path here needs to persist distinct
    // `order_change_replace_pending`/`order_change_replace_failed` states
    // between the cancel and the create, which a single adapter call can't
    // surface a hook for.
    let edited = adapter
        .edit_order_if_supported(
            exchange_id,
            session_key,
            credentials,
            exchange_order_id.as_str(),
            &order.symbol,
            order_type,
            side,
            decimal_value(qty),
            price.map(decimal_value),
            params.clone(),
        )
        .await?;

    if let Some(response) = edited {
        orders::update_order_qty_price(client, order.id, qty, price).await?;
        events::insert_ccxt_order_raw(client, account_id, &response).await?;
        events::insert_event(
            client,
            account_id,
            EventNamespace::Ccxt.as_str(),
            "order_changed",
            &serde_json::json!({"order_id": order.id.get(), "qty": qty, "price": price}),
        )
        .await?;
        return Ok(());
    }

    // Cancel-and-replace path: the exchange does not support in-place edit.
    adapter
        .cancel_order(exchange_id, session_key, credentials, exchange_order_id.as_str(), &order.symbol, Value::Null)
        .await?;
    orders::mark_order_canceled_edit_pending(client, order.id).await?;
    events::insert_event(
        client,
        account_id,
        EventNamespace::Ccxt.as_str(),
        "order_change_replace_pending",
        &serde_json::json!({"order_id": order.id.get()}),
    )
    .await?;

    let create_result = adapter
        .create_order(exchange_id, session_key, credentials, &order.symbol, side, order_type, decimal_value(qty), price.map(decimal_value), params)
        .await;

    let response = match create_result {
        Ok(response) => response,
        Err(err) => {
            orders::mark_order_edit_replace_failed(client, order.id, &err.to_string()).await?;
            events::insert_event(
                client,
                account_id,
                EventNamespace::Ccxt.as_str(),
                "order_change_replace_failed",
                &serde_json::json!({"order_id": order.id.get(), "reason": err.to_string()}),
            )
            .await?;
            return Err(ExecutorError::permanent("change_order_replace_create_failed"));
        }
    };

    let new_exchange_order_id = ExchangeOrderId::new(response.get_as_str("id")?);
    events::insert_ccxt_order_raw(client, account_id, &response).await?;

    let orphan =
        orders::find_external_orphan_order_for_replace(client, account_id, Some(&new_exchange_order_id), Some(&client_order_id)).await?;

    match orphan {
        None => {
            orders::mark_order_replaced(client, order.id, &new_exchange_order_id, qty, price).await?;
            events::insert_event(
                client,
                account_id,
                EventNamespace::Ccxt.as_str(),
                "order_changed",
                &serde_json::json!({"order_id": order.id.get(), "exchange_order_id": new_exchange_order_id.as_str()}),
            )
            .await?;
        }
        Some(orphan_order) => consolidate_replace_into_orphan(client, account_id, &order, &orphan_order).await?,
    }

    Ok(())
}

/// `change_order`'s orphan-adoption branch (spec.md §4.5 `change_order`
/// "consolidate"): the reconciler already adopted the new exchange order as
/// an external unmatched order before this transaction committed, so the
/// replace folds into that row instead of creating a duplicate.
async fn consolidate_replace_into_orphan(
    client: &impl GenericClient,
    account_id: AccountId,
    order: &Order,
    orphan_order: &Order,
) -> Result<(), ExecutorError> {
    orders::mark_order_consolidated_to_orphan(client, order.id, orphan_order.id).await?;
    orders::adopt_external_orphan_order(client, orphan_order.id, order.strategy_id, &order.reason, order.comment.as_deref()).await?;
    deals::reassign_deals_strategy_by_order_ids(client, &[orphan_order.id], order.strategy_id).await?;

    match (orphan_order.position_id, order.position_id) {
        (Some(orphan_position_id), Some(kept_position_id)) if orphan_position_id != kept_position_id => {
            merge_positions_core(client, account_id, orphan_position_id, kept_position_id).await?;
            orders::update_order_position_link(client, orphan_order.id, kept_position_id).await?;
        }
        (Some(_), Some(_)) => {}
        (_, Some(kept_position_id)) => {
            orders::update_order_position_link(client, orphan_order.id, kept_position_id).await?;
        }
        (_, None) => {}
    }

    events::insert_event(
        client,
        account_id,
        EventNamespace::Ccxt.as_str(),
        "order_change_replace_consolidated",
        &serde_json::json!({"order_id": order.id.get(), "orphan_order_id": orphan_order.id.get()}),
    )
    .await?;
    Ok(())
}

async fn close_by(
    client: &impl GenericClient,
    account_id: AccountId,
    position_id_a: PositionId,
    position_id_b: PositionId,
    qty: Option<Amount>,
    strategy_id: StrategyId,
) -> Result<(), ExecutorError> {
    let a = positions::fetch_open_position(client, position_id_a)
        .await?
        .ok_or_else(|| ExecutorError::permanent("close_by position_a is not open"))?;
    let b = positions::fetch_open_position(client, position_id_b)
        .await?
        .ok_or_else(|| ExecutorError::permanent("close_by position_b is not open"))?;
    if a.symbol != b.symbol || a.side == b.side {
        return Err(ExecutorError::permanent("close_by requires opposite-side positions of the same symbol"));
    }

    let mut close_qty = a.qty.min(b.qty);
    if let Some(requested) = qty {
        close_qty = close_qty.min(requested);
    }
    if close_qty <= Amount::ZERO {
        return Err(ExecutorError::permanent("close_by qty must be positive"));
    }

    deals::insert_position_deal(client, &oms_domain::Deal::internal_transfer(account_id, &a, close_qty, strategy_id, "close_by_internal"))
        .await?;
    deals::insert_position_deal(client, &oms_domain::Deal::internal_transfer(account_id, &b, close_qty, strategy_id, "close_by_internal"))
        .await?;

    reduce_or_close(client, &a, close_qty).await?;
    reduce_or_close(client, &b, close_qty).await?;

    events::insert_event(
        client,
        account_id,
        EventNamespace::Position.as_str(),
        "close_by_executed",
        &serde_json::json!({"position_id_a": a.id.get(), "position_id_b": b.id.get(), "qty": close_qty}),
    )
    .await?;
    Ok(())
}

async fn reduce_or_close(client: &impl GenericClient, position: &Position, qty: Amount) -> Result<(), ExecutorError> {
    let remaining = position.qty - qty;
    if remaining <= Amount::ZERO {
        positions::close_position(client, position.id).await?;
    } else {
        positions::update_position_open_qty_price(client, position.id, remaining, position.avg_price).await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn close_position(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    exchange_id: &oms_domain::ExchangeId,
    session_key: &str,
    credentials: &ExchangeCredentials,
    account_id: AccountId,
    command_id: CommandId,
    position_id: PositionId,
    order_type: OrderType,
    price: Option<Price>,
    strategy_id: StrategyId,
) -> Result<(), ExecutorError> {
    let position = positions::fetch_open_position(client, position_id)
        .await?
        .ok_or_else(|| ExecutorError::permanent("position not open for close_position"))?;

    let order = Order {
        id: OrderId::from(0),
        account_id,
        command_id: Some(command_id),
        strategy_id,
        position_id: Some(position_id),
        symbol: position.symbol.clone(),
        side: position.side.opposite(),
        order_type,
        qty: position.qty,
        price,
        filled_qty: Amount::ZERO,
        avg_fill_price: None,
        status: OrderStatus::PendingSubmit,
        client_order_id: None,
        exchange_order_id: None,
        stop_loss: None,
        stop_gain: None,
        reason: "close_position".to_owned(),
        comment: None,
        edit_replace_state: None,
    };
    let inserted = orders::insert_position_order_pending_submit(client, &order).await?;

    submit_order_to_exchange(client, adapter, exchange_id, session_key, credentials, account_id, &inserted, &OrderExecutionHints::default(), None)
        .await?;

    locks::release_close_position_lock(client, position_id).await?;
    Ok(())
}

async fn merge_positions(
    client: &impl GenericClient,
    account_id: AccountId,
    source_position_id: PositionId,
    target_position_id: PositionId,
    stop_mode: StopMode,
    oms_stop_loss: Option<Price>,
    oms_stop_gain: Option<Price>,
) -> Result<(), ExecutorError> {
    merge_positions_core(client, account_id, source_position_id, target_position_id).await?;

    match stop_mode {
        StopMode::Keep => {}
        StopMode::Clear => {
            positions::update_position_targets_comment(client, target_position_id, None, None).await?;
        }
        StopMode::Set => {
            positions::update_position_targets_comment(client, target_position_id, oms_stop_loss, oms_stop_gain).await?;
        }
    }

    events::insert_event(
        client,
        account_id,
        EventNamespace::Position.as_str(),
        "positions_merged",
        &serde_json::json!({"source_position_id": source_position_id.get(), "target_position_id": target_position_id.get()}),
    )
    .await?;
    Ok(())
}

/// Position merge algorithm (spec.md §4.5.1): `T` absorbs `S`'s quantity at
/// the weighted-average price, inherits its open orders and deals, and `S`
/// is closed. Shared by the public `merge_positions` command and
/// `change_order`'s orphan-consolidation branch.
async fn merge_positions_core(
    client: &impl GenericClient,
    account_id: AccountId,
    source_position_id: PositionId,
    target_position_id: PositionId,
) -> Result<(), ExecutorError> {
    let source = positions::fetch_open_position(client, source_position_id)
        .await?
        .ok_or_else(|| ExecutorError::permanent("merge source position is not open"))?;
    let target = positions::fetch_open_position(client, target_position_id)
        .await?
        .ok_or_else(|| ExecutorError::permanent("merge target position is not open"))?;
    if source.account_id != account_id || target.account_id != account_id {
        return Err(ExecutorError::permanent("merge positions do not belong to this account"));
    }
    if !source.same_symbol_side(&target) {
        return Err(ExecutorError::permanent("merge positions are not same symbol/side"));
    }

    let (new_qty, new_avg) = target.weighted_avg_with(source.qty, source.avg_price);
    positions::update_position_open_qty_price(client, target.id, new_qty, new_avg).await?;
    positions::reassign_open_orders_position(client, source.id, target.id).await?;
    positions::reassign_deals_position(client, source.id, target.id).await?;
    positions::close_position_merged(client, source.id).await?;
    Ok(())
}

async fn position_change(
    client: &impl GenericClient,
    account_id: AccountId,
    position_id: PositionId,
    oms_stop_loss: Option<Price>,
    oms_stop_gain: Option<Price>,
    comment: Option<String>,
) -> Result<(), ExecutorError> {
    let position = positions::fetch_open_position(client, position_id)
        .await?
        .ok_or_else(|| ExecutorError::permanent("position not open for position_change"))?;
    positions::update_position_targets_comment(
        client,
        position.id,
        oms_stop_loss.or(position.stop_loss),
        oms_stop_gain.or(position.stop_gain),
    )
    .await?;
    events::insert_event(
        client,
        account_id,
        EventNamespace::Position.as_str(),
        "position_changed",
        &serde_json::json!({"position_id": position.id.get(), "stop_loss": oms_stop_loss, "stop_gain": oms_stop_gain, "comment": comment}),
    )
    .await?;
    Ok(())
}

/// Builds ccxt-style `params` from execution hints (spec.md §4.5
/// `send_order` "Build exchange params from payload hints"). Caller-supplied
/// `extra` params are preserved but never override the fields named here.
fn build_order_params(hints: &OrderExecutionHints, client_order_id: String) -> Value {
    let mut params = match &hints.extra {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Some(post_only) = hints.post_only {
        params.insert("postOnly".to_owned(), Value::Bool(post_only));
    }
    if let Some(tif) = &hints.time_in_force {
        params.insert("timeInForce".to_owned(), Value::String(tif.clone()));
    }
    if let Some(trigger_price) = hints.trigger_price {
        params.insert("triggerPrice".to_owned(), decimal_value(trigger_price));
    }
    if let Some(stop_price) = hints.stop_price {
        params.insert("stopPrice".to_owned(), decimal_value(stop_price));
    }
    if let Some(take_profit_price) = hints.take_profit_price {
        params.insert("takeProfitPrice".to_owned(), decimal_value(take_profit_price));
    }
    if let Some(trailing_amount) = hints.trailing_amount {
        params.insert("trailingAmount".to_owned(), decimal_value(trailing_amount));
    }
    if let Some(trailing_percent) = hints.trailing_percent {
        params.insert("trailingPercent".to_owned(), decimal_value(trailing_percent));
    }
    if hints.reduce_only {
        params.insert("reduceOnly".to_owned(), Value::Bool(true));
    }
    params.insert("clientOrderId".to_owned(), Value::String(client_order_id));
    Value::Object(params)
}

fn decimal_value(value: Amount) -> Value {
    Value::String(value.to_string())
}

fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn build_order_params_carries_hints_and_client_order_id() {
        let hints = OrderExecutionHints {
            post_only: Some(true),
            reduce_only: true,
            trigger_price: Some(dec!(100)),
            ..Default::default()
        };
        let params = build_order_params(&hints, "abc".to_owned());
        assert_eq!(params["postOnly"], Value::Bool(true));
        assert_eq!(params["reduceOnly"], Value::Bool(true));
        assert_eq!(params["triggerPrice"], Value::String("100".to_owned()));
        assert_eq!(params["clientOrderId"], Value::String("abc".to_owned()));
    }

    #[test]
    fn build_order_params_preserves_caller_extra_fields() {
        let mut hints = OrderExecutionHints::default();
        hints.extra = serde_json::json!({"leverage": 5});
        let params = build_order_params(&hints, "abc".to_owned());
        assert_eq!(params["leverage"], Value::from(5));
    }

    #[test]
    fn order_type_strings() {
        assert_eq!(order_type_str(OrderType::Market), "market");
        assert_eq!(order_type_str(OrderType::Limit), "limit");
    }
}
