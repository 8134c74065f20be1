#![deny(
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_must_use
)]

pub mod account;
pub mod command;
pub mod deal;
pub mod event;
pub mod order;
pub mod position;
pub mod queue;
pub mod strategy;

pub use account::{Account, AccountCredentials, AccountStatus};
pub use command::{CommandPayload, CommandType, PositionCommand, PositionCommandStatus, StopMode};
pub use deal::Deal;
pub use event::{EventOutbox, EventPayload};
pub use order::{EditReplaceState, NormalizedTrade, Order, OrderExecutionHints, OrderStatus, OrderType};
pub use position::{Position, PositionState};
pub use queue::{CloseLock, QueueItem, QueueStatus};
pub use strategy::{Strategy, StrategyStatus};

use rust_decimal::Decimal;

/// Price is always a decimal: §9 "Decimal arithmetic".
pub type Price = Decimal;
/// Quantity, average price and PnL share the same decimal representation.
pub type Amount = Decimal;

oms_utils::impl_i64_id!(AccountId);
oms_utils::impl_i64_id!(StrategyId);
oms_utils::impl_i64_id!(OrderId);
oms_utils::impl_i64_id!(PositionId);
oms_utils::impl_i64_id!(DealId);
oms_utils::impl_i64_id!(CommandId);
oms_utils::impl_i64_id!(QueueItemId);
oms_utils::impl_i64_id!(EventId);
oms_utils::impl_i64_id!(UserId);
oms_utils::impl_i64_id!(ApiKeyId);

oms_utils::impl_str_id!(ClientOrderId);
oms_utils::impl_str_id!(ExchangeOrderId);
oms_utils::impl_str_id!(ExchangeTradeId);
oms_utils::impl_str_id!(RequestId);

/// Exchange ids are canonical (`ccxt.<name>` | `ccxtpro.<name>`); spec.md §6.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ExchangeEngine {
    Rest,
    Stream,
}

impl ExchangeEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeEngine::Rest => "ccxt",
            ExchangeEngine::Stream => "ccxtpro",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ExchangeId {
    pub engine: ExchangeEngine,
    pub exchange_class: String,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[error("unsupported_engine")]
pub struct UnsupportedEngine;

impl ExchangeId {
    /// Bare legacy ids default to `ccxt.<name>`; any other dotted form is
    /// rejected (spec.md §3, §6).
    pub fn parse(raw: &str) -> Result<Self, UnsupportedEngine> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UnsupportedEngine);
        }
        let lowered = raw.to_ascii_lowercase();
        if let Some(rest) = lowered.strip_prefix("ccxtpro.") {
            return Self::with_class(ExchangeEngine::Stream, raw, rest);
        }
        if let Some(rest) = lowered.strip_prefix("ccxt.") {
            return Self::with_class(ExchangeEngine::Rest, raw, rest);
        }
        if raw.contains('.') {
            return Err(UnsupportedEngine);
        }
        Ok(Self {
            engine: ExchangeEngine::Rest,
            exchange_class: raw.to_owned(),
        })
    }

    fn with_class(engine: ExchangeEngine, raw: &str, rest: &str) -> Result<Self, UnsupportedEngine> {
        if rest.trim().is_empty() {
            return Err(UnsupportedEngine);
        }
        let dot = raw.find('.').expect("prefix already matched a dot");
        Ok(Self {
            engine,
            exchange_class: raw[dot + 1..].to_owned(),
        })
    }

    pub fn canonical(&self) -> String {
        format!("{}.{}", self.engine.as_str(), self.exchange_class)
    }

    pub fn is_persistent_session(&self) -> bool {
        matches!(self.engine, ExchangeEngine::Stream)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = UnsupportedEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            _ => Err(UnsupportedEngine),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    Hedge,
    Netting,
    StrategyNetting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_legacy_exchange_id() {
        let id = ExchangeId::parse("binance").unwrap();
        assert_eq!(id.engine, ExchangeEngine::Rest);
        assert_eq!(id.canonical(), "ccxt.binance");
    }

    #[test]
    fn parses_ccxtpro_prefixed_id() {
        let id = ExchangeId::parse("ccxtpro.binance").unwrap();
        assert_eq!(id.engine, ExchangeEngine::Stream);
        assert!(id.is_persistent_session());
    }

    #[test]
    fn rejects_unknown_dotted_prefix() {
        assert!(ExchangeId::parse("weird.binance").is_err());
    }

    #[test]
    fn rejects_empty_class() {
        assert!(ExchangeId::parse("ccxt.").is_err());
        assert!(ExchangeId::parse("").is_err());
    }

    #[test]
    fn order_side_opposite_and_parse() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!("SELL".parse::<OrderSide>().unwrap(), OrderSide::Sell);
        assert!("invalid".parse::<OrderSide>().is_err());
    }
}
