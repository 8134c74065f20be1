use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount, OrderSide, PositionId, Price, StrategyId};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Open,
    Closed,
}

/// A position container (spec.md §3 `Position`). In hedge mode there is at
/// most one open position per `(account_id, symbol, side)`; in netting mode
/// at most one open net position per `(account_id, symbol)` (and, under
/// `strategy_netting`, per `(account_id, symbol, strategy_id)` — see
/// SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub strategy_id: StrategyId,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Amount,
    pub avg_price: Price,
    pub state: PositionState,
    pub stop_loss: Option<Price>,
    pub stop_gain: Option<Price>,
    pub reason: String,
    pub opened_at: chrono::DateTime<chrono::Utc>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        matches!(self.state, PositionState::Open)
    }

    /// Same `(symbol, side)` — the identity hedge-mode positions are keyed
    /// on (spec.md §3 invariants).
    pub fn same_symbol_side(&self, other: &Position) -> bool {
        self.symbol == other.symbol && self.side == other.side
    }

    /// Average-price update for a same-side fill merging into this position
    /// (spec.md §4.6 step 4 "same side").
    pub fn weighted_avg_with(&self, qty: Amount, price: Price) -> (Amount, Price) {
        let new_qty = self.qty + qty;
        if new_qty <= Amount::ZERO {
            return (new_qty, self.avg_price);
        }
        let new_avg = (self.qty * self.avg_price + qty * price) / new_qty;
        (new_qty, new_avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(side: OrderSide, qty: Amount, avg: Price) -> Position {
        Position {
            id: PositionId::from(1),
            account_id: AccountId::from(1),
            strategy_id: StrategyId::from(1),
            symbol: "BTC/USDT".to_owned(),
            side,
            qty,
            avg_price: avg,
            state: PositionState::Open,
            stop_loss: None,
            stop_gain: None,
            reason: "trader".to_owned(),
            opened_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            closed_at: None,
        }
    }

    #[test]
    fn weighted_avg_merges_same_side() {
        let p = sample(OrderSide::Buy, dec!(1), dec!(100));
        let (qty, avg) = p.weighted_avg_with(dec!(1), dec!(200));
        assert_eq!(qty, dec!(2));
        assert_eq!(avg, dec!(150));
    }

    #[test]
    fn same_symbol_side_identity() {
        let a = sample(OrderSide::Buy, dec!(1), dec!(100));
        let mut b = sample(OrderSide::Buy, dec!(1), dec!(100));
        assert!(a.same_symbol_side(&b));
        b.side = OrderSide::Sell;
        assert!(!a.same_symbol_side(&b));
    }
}
