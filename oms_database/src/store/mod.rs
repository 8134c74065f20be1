pub mod accounts;
pub mod admin;
pub mod auth;
pub mod commands;
pub mod deals;
pub mod events;
pub mod locks;
pub mod orders;
pub mod positions;
pub mod risk;
pub mod reconciliation;

use oms_domain::{
    AccountStatus, CommandType, EditReplaceState, OrderSide, OrderStatus, OrderType, PositionCommandStatus,
    PositionMode, PositionState, QueueStatus, StrategyStatus,
};

use crate::error::{DbError, Result};

pub(crate) fn decode<T>(field: &'static str, value: &str, parsed: Option<T>) -> Result<T> {
    parsed.ok_or_else(|| DbError::Decode {
        field,
        reason: format!("unrecognized value `{value}`"),
    })
}

pub(crate) fn order_side_to_sql(side: OrderSide) -> &'static str {
    side.as_str()
}

pub(crate) fn order_side_from_sql(value: &str) -> Option<OrderSide> {
    value.parse().ok()
}

pub(crate) fn order_type_to_sql(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
    }
}

pub(crate) fn order_type_from_sql(value: &str) -> Option<OrderType> {
    match value {
        "market" => Some(OrderType::Market),
        "limit" => Some(OrderType::Limit),
        _ => None,
    }
}

pub(crate) fn order_status_to_sql(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::PendingSubmit => "PENDING_SUBMIT",
        OrderStatus::Submitted => "SUBMITTED",
        OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Canceled => "CANCELED",
        OrderStatus::CanceledEditPending => "CANCELED_EDIT_PENDING",
        OrderStatus::Rejected => "REJECTED",
    }
}

pub(crate) fn order_status_from_sql(value: &str) -> Option<OrderStatus> {
    match value {
        "PENDING_SUBMIT" => Some(OrderStatus::PendingSubmit),
        "SUBMITTED" => Some(OrderStatus::Submitted),
        "PARTIALLY_FILLED" => Some(OrderStatus::PartiallyFilled),
        "FILLED" => Some(OrderStatus::Filled),
        "CANCELED" => Some(OrderStatus::Canceled),
        "CANCELED_EDIT_PENDING" => Some(OrderStatus::CanceledEditPending),
        "REJECTED" => Some(OrderStatus::Rejected),
        _ => None,
    }
}

pub(crate) fn edit_replace_state_to_sql(state: EditReplaceState) -> &'static str {
    match state {
        EditReplaceState::Pending => "pending",
        EditReplaceState::Consolidated => "consolidated",
        EditReplaceState::Failed => "edit_replace_failed",
    }
}

pub(crate) fn edit_replace_state_from_sql(value: &str) -> Option<EditReplaceState> {
    match value {
        "pending" => Some(EditReplaceState::Pending),
        "consolidated" => Some(EditReplaceState::Consolidated),
        "edit_replace_failed" => Some(EditReplaceState::Failed),
        _ => None,
    }
}

pub(crate) fn position_state_to_sql(state: PositionState) -> &'static str {
    match state {
        PositionState::Open => "open",
        PositionState::Closed => "closed",
    }
}

pub(crate) fn position_state_from_sql(value: &str) -> Option<PositionState> {
    match value {
        "open" => Some(PositionState::Open),
        "closed" => Some(PositionState::Closed),
        _ => None,
    }
}

pub(crate) fn position_mode_from_sql(value: &str) -> Option<PositionMode> {
    match value {
        "hedge" => Some(PositionMode::Hedge),
        "netting" => Some(PositionMode::Netting),
        "strategy_netting" => Some(PositionMode::StrategyNetting),
        _ => None,
    }
}

pub(crate) fn account_status_from_sql(value: &str) -> Option<AccountStatus> {
    match value {
        "active" => Some(AccountStatus::Active),
        "blocked" => Some(AccountStatus::Blocked),
        _ => None,
    }
}

pub(crate) fn command_type_to_sql(command_type: CommandType) -> &'static str {
    match command_type {
        CommandType::SendOrder => "send_order",
        CommandType::CancelOrder => "cancel_order",
        CommandType::CancelAllOrders => "cancel_all_orders",
        CommandType::ChangeOrder => "change_order",
        CommandType::ClosePosition => "close_position",
        CommandType::CloseBy => "close_by",
        CommandType::MergePositions => "merge_positions",
        CommandType::PositionChange => "position_change",
    }
}

pub(crate) fn command_type_from_sql(value: &str) -> Option<CommandType> {
    match value {
        "send_order" => Some(CommandType::SendOrder),
        "cancel_order" => Some(CommandType::CancelOrder),
        "cancel_all_orders" => Some(CommandType::CancelAllOrders),
        "change_order" => Some(CommandType::ChangeOrder),
        "close_position" => Some(CommandType::ClosePosition),
        "close_by" => Some(CommandType::CloseBy),
        "merge_positions" => Some(CommandType::MergePositions),
        "position_change" => Some(CommandType::PositionChange),
        _ => None,
    }
}

pub(crate) fn command_status_to_sql(status: PositionCommandStatus) -> &'static str {
    match status {
        PositionCommandStatus::Accepted => "accepted",
        PositionCommandStatus::Completed => "completed",
        PositionCommandStatus::Failed => "failed",
    }
}

pub(crate) fn command_status_from_sql(value: &str) -> Option<PositionCommandStatus> {
    match value {
        "accepted" => Some(PositionCommandStatus::Accepted),
        "completed" => Some(PositionCommandStatus::Completed),
        "failed" => Some(PositionCommandStatus::Failed),
        _ => None,
    }
}

pub(crate) fn queue_status_to_sql(status: QueueStatus) -> &'static str {
    match status {
        QueueStatus::Queued => "queued",
        QueueStatus::Processing => "processing",
        QueueStatus::Done => "done",
        QueueStatus::Failed => "failed",
    }
}

pub(crate) fn queue_status_from_sql(value: &str) -> Option<QueueStatus> {
    match value {
        "queued" => Some(QueueStatus::Queued),
        "processing" => Some(QueueStatus::Processing),
        "done" => Some(QueueStatus::Done),
        "failed" => Some(QueueStatus::Failed),
        _ => None,
    }
}

pub(crate) fn strategy_status_from_sql(value: &str) -> Option<StrategyStatus> {
    match value {
        "active" => Some(StrategyStatus::Active),
        "disabled" => Some(StrategyStatus::Disabled),
        _ => None,
    }
}
