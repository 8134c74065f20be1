//! Command intake and validation (spec.md §4.3), grounded on
//! `command_executor.py`'s sibling `dispatcher_server.py::_execute`
//! `oms_command` branch and `service.py::process_single_command_direct`:
//! resolve permissions, validate the payload shape for the command type,
//! consult risk state, pre-create the `PENDING_SUBMIT` order for
//! `send_order`, acquire the close lock for `close_position`, then enqueue.
//! A batch item never raises out of here — every path returns a
//! `CommandResult`.

use tokio_postgres::GenericClient;

use oms_database::{accounts, commands, locks, orders, positions, risk};
use oms_domain::order::EXTERNAL_STRATEGY_ID;
use oms_domain::{AccountId, ClientOrderId, CommandPayload, Order, OrderId, OrderStatus};
use oms_rpc::{CommandResult, RpcError};

use crate::auth::{require_strategy_permission, AuthContext, Role};
use crate::error::IntakeError;

/// Close-lock TTL (spec.md §3 `PositionCloseLocks`, §9 "timeout rather than
/// permanent"). The lock is released by the executor on completion or
/// failure; this bound only protects against a worker that never returns.
pub const CLOSE_LOCK_TTL_SECONDS: i64 = 300;

pub async fn process_single_command(
    client: &impl GenericClient,
    auth: &AuthContext,
    account_id: AccountId,
    index: usize,
    mut payload: CommandPayload,
    request_id: Option<&str>,
) -> CommandResult {
    match process_single_command_inner(client, auth, account_id, &mut payload, request_id).await {
        Ok((command_id, order_id)) => CommandResult::success(index, command_id, order_id),
        Err(err) => CommandResult::failure(index, RpcError::with_message(err.code(), err.to_string())),
    }
}

async fn process_single_command_inner(
    client: &impl GenericClient,
    auth: &AuthContext,
    account_id: AccountId,
    payload: &mut CommandPayload,
    request_id: Option<&str>,
) -> Result<(oms_domain::CommandId, Option<OrderId>), IntakeError> {
    if matches!(auth.role, Role::Admin) {
        return Err(IntakeError::AdminReadOnly);
    }
    let account = accounts::fetch_active_account(client, account_id)
        .await?
        .ok_or(IntakeError::AccountNotFound)?;
    let perms = oms_database::auth::fetch_api_key_account_permissions(client, auth.api_key_id, account_id).await?;
    let (can_trade, can_read) = perms.unwrap_or((false, false));
    if !can_read {
        return Err(IntakeError::PermissionDenied);
    }
    if !can_trade {
        return Err(IntakeError::PermissionDenied);
    }

    if let CommandPayload::SendOrder { reason, .. } = payload {
        if reason.as_deref().map(str::trim).unwrap_or("").is_empty() {
            *reason = Some(auth.role.default_reason().to_owned());
        }
    }

    validate_payload(payload)?;

    if let Some(strategy_id) = payload_strategy_id(payload) {
        require_strategy_permission(client, auth, strategy_id).await?;
    }

    let mut pending_order: Option<Order> = None;

    match payload {
        CommandPayload::SendOrder {
            symbol,
            side,
            order_type,
            qty,
            price,
            strategy_id,
            position_id,
            client_order_id,
            hints,
            reason,
            comment,
        } => {
            if !hints.reduce_only {
                let account_allows = risk::fetch_account_allow_new_positions(client, account_id).await?;
                let strategy_override = risk::fetch_strategy_allow_new_positions(client, account_id, *strategy_id).await?;
                let allowed = strategy_override.unwrap_or(account_allows);
                if !allowed {
                    return Err(IntakeError::Validation("new positions blocked by risk state".to_owned()));
                }
            }
            if position_id.is_set() {
                let position = positions::fetch_open_position(client, *position_id)
                    .await?
                    .ok_or(IntakeError::PositionNotFound)?;
                if position.account_id != account_id || position.symbol != *symbol {
                    return Err(IntakeError::Validation(
                        "position_id does not belong to this account/symbol".to_owned(),
                    ));
                }
            }
            let order = Order {
                id: OrderId::from(0),
                account_id,
                command_id: None,
                strategy_id: *strategy_id,
                position_id: if position_id.is_set() { Some(*position_id) } else { None },
                symbol: symbol.clone(),
                side: *side,
                order_type: *order_type,
                qty: *qty,
                price: *price,
                filled_qty: rust_decimal::Decimal::ZERO,
                avg_fill_price: None,
                status: OrderStatus::PendingSubmit,
                client_order_id: client_order_id.as_deref().map(ClientOrderId::new),
                exchange_order_id: None,
                stop_loss: None,
                stop_gain: None,
                reason: reason.clone().unwrap_or_default(),
                comment: comment.clone(),
                edit_replace_state: None,
            };
            pending_order = Some(order);
        }
        CommandPayload::ClosePosition { position_id, .. } => {
            let position = positions::fetch_open_position(client, *position_id)
                .await?
                .ok_or(IntakeError::PositionNotFound)?;
            if position.account_id != account_id {
                return Err(IntakeError::Validation("position does not belong to this account".to_owned()));
            }
            let acquired =
                locks::acquire_close_position_lock(client, account_id, *position_id, request_id, CLOSE_LOCK_TTL_SECONDS)
                    .await?;
            if !acquired {
                return Err(IntakeError::CloseLockHeld);
            }
        }
        CommandPayload::CloseBy {
            position_id_a,
            position_id_b,
            ..
        } => {
            for position_id in [*position_id_a, *position_id_b] {
                let position = positions::fetch_open_position(client, position_id)
                    .await?
                    .ok_or(IntakeError::PositionNotFound)?;
                if position.account_id != account_id {
                    return Err(IntakeError::Validation("position does not belong to this account".to_owned()));
                }
            }
        }
        CommandPayload::MergePositions {
            source_position_id,
            target_position_id,
            ..
        } => {
            for position_id in [*source_position_id, *target_position_id] {
                let position = positions::fetch_open_position(client, position_id)
                    .await?
                    .ok_or(IntakeError::PositionNotFound)?;
                if position.account_id != account_id {
                    return Err(IntakeError::Validation("position does not belong to this account".to_owned()));
                }
            }
        }
        CommandPayload::ChangeOrder { order_id, .. } => {
            let order = orders::fetch_order_by_id(client, *order_id)
                .await?
                .ok_or_else(|| IntakeError::Validation("order not found".to_owned()))?;
            if order.account_id != account_id || !order.status.is_cancelable() {
                return Err(IntakeError::Validation("order is not open for this account".to_owned()));
            }
        }
        CommandPayload::CancelOrder { .. } | CommandPayload::CancelAllOrders { .. } | CommandPayload::PositionChange { .. } => {}
    }

    let command = commands::insert_position_command(client, account_id, payload.command_type(), request_id, payload).await?;

    if let Some(mut order) = pending_order {
        order.command_id = Some(command.id);
        let inserted = orders::insert_position_order_pending_submit(client, &order).await?;
        let pool_id = account.parsed_exchange_id().map_err(|_| IntakeError::Validation("unsupported exchange_id".to_owned()))?;
        commands::enqueue_command(client, account_id, pool_id.engine.as_str(), command.id).await?;
        return Ok((command.id, Some(inserted.id)));
    }

    let pool_id = account
        .parsed_exchange_id()
        .map_err(|_| IntakeError::Validation("unsupported exchange_id".to_owned()))?;
    commands::enqueue_command(client, account_id, pool_id.engine.as_str(), command.id).await?;
    Ok((command.id, None))
}

fn payload_strategy_id(payload: &CommandPayload) -> Option<oms_domain::StrategyId> {
    match payload {
        CommandPayload::SendOrder { strategy_id, .. } => Some(*strategy_id),
        CommandPayload::ClosePosition { strategy_id, .. } => Some(*strategy_id),
        CommandPayload::CloseBy { strategy_id, .. } => Some(*strategy_id),
        _ => None,
    }
}

fn validate_payload(payload: &CommandPayload) -> Result<(), IntakeError> {
    match payload {
        CommandPayload::SendOrder {
            symbol, qty, price, order_type, ..
        } => {
            if symbol.trim().is_empty() {
                return Err(IntakeError::Validation("symbol is required".to_owned()));
            }
            if *qty <= rust_decimal::Decimal::ZERO {
                return Err(IntakeError::Validation("qty must be positive".to_owned()));
            }
            if order_type.requires_price() && price.filter(|p| *p > rust_decimal::Decimal::ZERO).is_none() {
                return Err(IntakeError::Validation("price is required for limit orders".to_owned()));
            }
        }
        CommandPayload::CancelOrder { order_id, order_ids } => {
            if order_id.is_none() && order_ids.as_ref().map(|ids| ids.is_empty()).unwrap_or(true) {
                return Err(IntakeError::Validation("order_id or order_ids is required".to_owned()));
            }
        }
        CommandPayload::ChangeOrder { new_price, new_qty, .. } => {
            if new_price.is_none() && new_qty.is_none() {
                return Err(IntakeError::Validation("new_price or new_qty is required".to_owned()));
            }
        }
        CommandPayload::CloseBy { qty, .. } => {
            if let Some(qty) = qty {
                if *qty <= rust_decimal::Decimal::ZERO {
                    return Err(IntakeError::Validation("qty must be positive".to_owned()));
                }
            }
        }
        CommandPayload::MergePositions {
            source_position_id,
            target_position_id,
            ..
        } => {
            if source_position_id == target_position_id {
                return Err(IntakeError::Validation("source and target positions must differ".to_owned()));
            }
        }
        CommandPayload::CancelAllOrders { .. } | CommandPayload::ClosePosition { .. } | CommandPayload::PositionChange { .. } => {}
    }
    Ok(())
}

/// Unused at rest but documents the strategy_id that marks an
/// isolated-external order/position, so callers validating `strategy_id`
/// inputs can reject attempts to address it directly (spec.md §4.3, §4.6).
pub fn is_external_strategy(strategy_id: oms_domain::StrategyId) -> bool {
    strategy_id == EXTERNAL_STRATEGY_ID
}

#[cfg(test)]
mod tests {
    use super::*;
    use oms_domain::{OrderSide, OrderType, PositionId, StrategyId};
    use rust_decimal_macros::dec;

    #[test]
    fn send_order_requires_positive_qty() {
        let payload = CommandPayload::SendOrder {
            symbol: "BTC/USDT".to_owned(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            qty: dec!(0),
            price: None,
            strategy_id: StrategyId::from(1),
            position_id: PositionId::from(0),
            client_order_id: None,
            hints: Default::default(),
            reason: None,
            comment: None,
        };
        assert!(validate_payload(&payload).is_err());
    }

    #[test]
    fn limit_order_without_price_is_rejected() {
        let payload = CommandPayload::SendOrder {
            symbol: "BTC/USDT".to_owned(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            qty: dec!(1),
            price: None,
            strategy_id: StrategyId::from(1),
            position_id: PositionId::from(0),
            client_order_id: None,
            hints: Default::default(),
            reason: None,
            comment: None,
        };
        assert!(validate_payload(&payload).is_err());
    }

    #[test]
    fn merge_positions_rejects_identical_source_and_target() {
        let payload = CommandPayload::MergePositions {
            source_position_id: PositionId::from(1),
            target_position_id: PositionId::from(1),
            stop_mode: oms_domain::command::StopMode::Keep,
            oms_stop_loss: None,
            oms_stop_gain: None,
        };
        assert!(validate_payload(&payload).is_err());
    }
}
