use serde::{Deserialize, Serialize};

use crate::StrategyId;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Active,
    Disabled,
}

/// A logical grouping of orders/positions/deals within an account (spec.md
/// §3 `Strategy`, GLOSSARY). `(strategy_id, account_id)` links are unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    pub name: String,
    pub client_strategy_id: Option<String>,
    pub status: StrategyStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_status_round_trips() {
        let json = serde_json::to_string(&StrategyStatus::Active).unwrap();
        let back: StrategyStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StrategyStatus::Active);
    }
}
