use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount, ExchangeTradeId, OrderId, OrderSide, Position, PositionId, Price, StrategyId};

/// A fill or a synthetic internal transfer linked to a position (spec.md §3
/// `Deal`, GLOSSARY). `(account_id, exchange_trade_id)` is unique when
/// `exchange_trade_id` is non-null — the reconciler's dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: crate::DealId,
    pub account_id: AccountId,
    pub order_id: Option<OrderId>,
    pub position_id: PositionId,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Amount,
    pub price: Price,
    pub fee: Option<Amount>,
    pub fee_currency: Option<String>,
    pub pnl: Amount,
    pub strategy_id: StrategyId,
    pub reason: String,
    pub reconciled: bool,
    pub exchange_trade_id: Option<ExchangeTradeId>,
}

impl Deal {
    /// `close_by_internal` deals between two positions never carry an
    /// exchange trade id: they are purely local transfers (spec.md §4.5
    /// `close_by`).
    pub fn internal_transfer(
        account_id: AccountId,
        position: &Position,
        qty: Amount,
        strategy_id: StrategyId,
        reason: &str,
    ) -> Self {
        Self {
            id: crate::DealId::default(),
            account_id,
            order_id: None,
            position_id: position.id,
            symbol: position.symbol.clone(),
            side: position.side,
            qty,
            price: position.avg_price,
            fee: None,
            fee_currency: None,
            pnl: Amount::ZERO,
            strategy_id,
            reason: reason.to_owned(),
            reconciled: false,
            exchange_trade_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionState;
    use rust_decimal_macros::dec;

    #[test]
    fn internal_transfer_carries_no_exchange_trade_id() {
        let position = Position {
            id: PositionId::from(1),
            account_id: AccountId::from(1),
            strategy_id: StrategyId::from(1),
            symbol: "BTC/USDT".to_owned(),
            side: OrderSide::Buy,
            qty: dec!(1),
            avg_price: dec!(100),
            state: PositionState::Open,
            stop_loss: None,
            stop_gain: None,
            reason: "trader".to_owned(),
            opened_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            closed_at: None,
        };
        let deal = Deal::internal_transfer(AccountId::from(1), &position, dec!(1), StrategyId::from(2), "close_by_internal");
        assert!(deal.exchange_trade_id.is_none());
        assert_eq!(deal.price, dec!(100));
    }
}
