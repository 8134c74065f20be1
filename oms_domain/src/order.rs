use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AccountId, Amount, ClientOrderId, CommandId, ExchangeOrderId, OrderId, OrderSide, Position};
use crate::{PositionId, Price, StrategyId};

/// strategy_id stamped on externally-discovered orders the reconciler adopts
/// (spec.md §3, §4.6 "isolated-external").
pub const EXTERNAL_STRATEGY_ID: StrategyId = StrategyId::new(0);
pub const EXTERNAL_REASON: &str = "external";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn requires_price(self) -> bool {
        matches!(self, OrderType::Limit)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingSubmit,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    CanceledEditPending,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses stamp `closed_at` (spec.md §3 Order invariants).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    pub fn is_cancelable(self) -> bool {
        matches!(
            self,
            OrderStatus::PendingSubmit | OrderStatus::Submitted | OrderStatus::PartiallyFilled
        )
    }
}

/// Outcome of a `change_order` cancel-and-replace attempt when the exchange
/// does not support in-place edit (spec.md §4.5 `change_order`).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditReplaceState {
    Pending,
    Consolidated,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub command_id: Option<CommandId>,
    pub strategy_id: StrategyId,
    pub position_id: Option<PositionId>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Amount,
    pub price: Option<Price>,
    pub filled_qty: Amount,
    pub avg_fill_price: Option<Price>,
    pub status: OrderStatus,
    pub client_order_id: Option<ClientOrderId>,
    pub exchange_order_id: Option<ExchangeOrderId>,
    pub stop_loss: Option<Price>,
    pub stop_gain: Option<Price>,
    pub reason: String,
    pub comment: Option<String>,
    pub edit_replace_state: Option<EditReplaceState>,
}

impl Order {
    /// `reason="external"` and `strategy_id=0` mark an order the reconciler
    /// created from an exchange trade it could not match locally.
    pub fn is_external_unmatched(&self) -> bool {
        self.strategy_id == EXTERNAL_STRATEGY_ID && self.reason == EXTERNAL_REASON
    }

    pub fn default_client_order_id(&self) -> ClientOrderId {
        self.client_order_id
            .clone()
            .unwrap_or_else(|| ClientOrderId::from(self.id.get().to_string().as_str()))
    }
}

/// Hints the command payload may carry through to the exchange call
/// (spec.md §4.5 `send_order`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderExecutionHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_amount: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_percent: Option<Price>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(flatten)]
    pub extra: Value,
}

/// A trade reported by the exchange and normalized by the reconciler
/// (spec.md §4.6 step 4) before it is projected into a position.
#[derive(Debug, Clone)]
pub struct NormalizedTrade {
    pub exchange_trade_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: Amount,
    pub price: Price,
    pub exchange_order_id: Option<ExchangeOrderId>,
    pub client_order_id: Option<ClientOrderId>,
    pub fee_cost: Option<Amount>,
    pub fee_currency: Option<String>,
    pub timestamp_ms: i64,
}

impl NormalizedTrade {
    /// Deterministic fallback id the reconciler assigns when the exchange
    /// supplies neither `exchange_order_id` nor `client_order_id`
    /// (spec.md §4.6 step 2).
    pub fn synthetic_client_order_id(&self) -> ClientOrderId {
        ClientOrderId::from(format!("ext-trade:{}", self.exchange_trade_id).as_str())
    }
}

/// Keeps `Position` in scope so downstream modules can import both from
/// `order` without an extra `use`; no direct coupling beyond re-export.
pub type LinkedPosition = Position;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            id: OrderId::from(7),
            account_id: AccountId::from(1),
            command_id: None,
            strategy_id: EXTERNAL_STRATEGY_ID,
            position_id: None,
            symbol: "BTC/USDT".to_owned(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            qty: rust_decimal_macros::dec!(1),
            price: Some(rust_decimal_macros::dec!(100)),
            filled_qty: rust_decimal_macros::dec!(0),
            avg_fill_price: None,
            status: OrderStatus::PendingSubmit,
            client_order_id: None,
            exchange_order_id: None,
            stop_loss: None,
            stop_gain: None,
            reason: EXTERNAL_REASON.to_owned(),
            comment: None,
            edit_replace_state: None,
        }
    }

    #[test]
    fn external_unmatched_detection() {
        assert!(sample_order().is_external_unmatched());
    }

    #[test]
    fn default_client_order_id_falls_back_to_numeric_id() {
        let order = sample_order();
        assert_eq!(order.default_client_order_id().as_str(), "7");
    }

    #[test]
    fn limit_orders_require_price() {
        assert!(OrderType::Limit.requires_price());
        assert!(!OrderType::Market.requires_price());
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
    }
}
