use serde::{Deserialize, Serialize};

use crate::order::OrderExecutionHints;
use crate::{AccountId, Amount, OrderId, OrderSide, OrderType, Price, StrategyId};
use crate::{CommandId, PositionId};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    SendOrder,
    CancelOrder,
    CancelAllOrders,
    ChangeOrder,
    ClosePosition,
    CloseBy,
    MergePositions,
    PositionChange,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionCommandStatus {
    Accepted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    Keep,
    Clear,
    Set,
}

/// Tagged-union representation of the weakly-typed `CommandInput.payload`
/// JSON (spec.md §6), produced by a single validator (SPEC_FULL.md §9
/// "Dynamic typing → typed sum types").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandPayload {
    SendOrder {
        symbol: String,
        side: OrderSide,
        order_type: OrderType,
        qty: Amount,
        #[serde(skip_serializing_if = "Option::is_none")]
        price: Option<Price>,
        strategy_id: StrategyId,
        #[serde(default)]
        position_id: PositionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_order_id: Option<String>,
        #[serde(flatten)]
        hints: OrderExecutionHints,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    CancelOrder {
        #[serde(skip_serializing_if = "Option::is_none")]
        order_id: Option<OrderId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        order_ids: Option<Vec<OrderId>>,
    },
    CancelAllOrders {
        #[serde(skip_serializing_if = "Option::is_none")]
        strategy_ids: Option<Vec<StrategyId>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        strategy_ids_csv: Option<String>,
    },
    ChangeOrder {
        order_id: OrderId,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_price: Option<Price>,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_qty: Option<Amount>,
    },
    ClosePosition {
        position_id: PositionId,
        order_type: OrderType,
        #[serde(skip_serializing_if = "Option::is_none")]
        price: Option<Price>,
        strategy_id: StrategyId,
        #[serde(skip_serializing_if = "Option::is_none")]
        origin_command: Option<String>,
    },
    CloseBy {
        position_id_a: PositionId,
        position_id_b: PositionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        qty: Option<Amount>,
        strategy_id: StrategyId,
    },
    MergePositions {
        source_position_id: PositionId,
        target_position_id: PositionId,
        stop_mode: StopMode,
        #[serde(skip_serializing_if = "Option::is_none")]
        oms_stop_loss: Option<Price>,
        #[serde(skip_serializing_if = "Option::is_none")]
        oms_stop_gain: Option<Price>,
    },
    PositionChange {
        position_id: PositionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        oms_stop_loss: Option<Price>,
        #[serde(skip_serializing_if = "Option::is_none")]
        oms_stop_gain: Option<Price>,
        #[serde(skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
}

impl CommandPayload {
    pub fn command_type(&self) -> CommandType {
        match self {
            CommandPayload::SendOrder { .. } => CommandType::SendOrder,
            CommandPayload::CancelOrder { .. } => CommandType::CancelOrder,
            CommandPayload::CancelAllOrders { .. } => CommandType::CancelAllOrders,
            CommandPayload::ChangeOrder { .. } => CommandType::ChangeOrder,
            CommandPayload::ClosePosition { .. } => CommandType::ClosePosition,
            CommandPayload::CloseBy { .. } => CommandType::CloseBy,
            CommandPayload::MergePositions { .. } => CommandType::MergePositions,
            CommandPayload::PositionChange { .. } => CommandType::PositionChange,
        }
    }
}

/// Materialized, immutable-after-insert command row (spec.md §3
/// `PositionCommand`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCommand {
    pub id: CommandId,
    pub account_id: AccountId,
    pub command_type: CommandType,
    pub request_id: Option<String>,
    pub payload: CommandPayload,
    pub status: PositionCommandStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_order_requires_at_least_one_id_field_at_validation_time() {
        let payload = CommandPayload::CancelOrder {
            order_id: None,
            order_ids: None,
        };
        assert_eq!(payload.command_type(), CommandType::CancelOrder);
    }

    #[test]
    fn change_order_command_type() {
        let payload = CommandPayload::ChangeOrder {
            order_id: OrderId::from(1),
            new_price: Some(rust_decimal_macros::dec!(100)),
            new_qty: None,
        };
        assert_eq!(payload.command_type(), CommandType::ChangeOrder);
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = CommandPayload::MergePositions {
            source_position_id: PositionId::from(1),
            target_position_id: PositionId::from(2),
            stop_mode: StopMode::Clear,
            oms_stop_loss: None,
            oms_stop_gain: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        let back: CommandPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.command_type(), CommandType::MergePositions);
    }
}
