use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use oms_domain::ExchangeId;

use crate::error::AdapterError;

/// Concrete method set the executor/reconciler actually call, plus a
/// string-dispatched `call` for `execute_method`/`ccxt_call`/
/// `ccxt_raw_query` forwarding (spec.md §4.2, §9). `RestExchangeClient` and
/// `StreamExchangeClient` (the ccxt/ccxtpro engine families) both implement
/// this trait — "Two concrete implementations (REST and WS) share that
/// interface" (spec.md §9).
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Reflective call by method name (spec.md §4.2 `execute_method`).
    async fn call(&self, method: &str, args: Vec<Value>, kwargs: Value) -> Result<Value, AdapterError>;

    async fn create_order(&self, symbol: &str, side: &str, order_type: &str, qty: Value, price: Option<Value>, params: Value)
        -> Result<Value, AdapterError>;

    async fn cancel_order(&self, exchange_order_id: &str, symbol: &str, params: Value) -> Result<Value, AdapterError>;

    /// `None` when the exchange lacks `editOrder` (spec.md §4.2
    /// `edit_order_if_supported`).
    async fn edit_order(
        &self,
        exchange_order_id: &str,
        symbol: &str,
        order_type: &str,
        side: &str,
        qty: Value,
        price: Option<Value>,
        params: Value,
    ) -> Result<Option<Value>, AdapterError>;

    async fn fetch_my_trades(&self, symbol: Option<&str>, since: i64, limit: u32) -> Result<Vec<Value>, AdapterError>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Value, AdapterError>;

    async fn fetch_balance(&self) -> Result<Value, AdapterError>;

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Value>, AdapterError>;

    async fn fetch_order(&self, exchange_order_id: &str, symbol: &str) -> Result<Value, AdapterError>;

    async fn load_markets(&self) -> Result<(), AdapterError>;

    /// `exchange.has[capability]`: `true`, `"emulated"`, or absent
    /// (spec.md §4.2 "Capability probing").
    fn has(&self, capability: &str) -> HasCapability;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HasCapability {
    No,
    Yes,
    Emulated,
}

impl HasCapability {
    /// Both `true` and `"emulated"` are treated as supported (spec.md §4.2).
    pub fn is_supported(self) -> bool {
        !matches!(self, HasCapability::No)
    }
}

/// Parameters used to build (or look up a cached) exchange handle (spec.md
/// §4.2 "All accept `(exchange_id, use_testnet, api_key, secret,
/// passphrase, extra_config, session_key?)`").
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub use_testnet: bool,
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub passphrase: Option<String>,
    pub extra_config: Value,
}

/// Builds a concrete `ExchangeClient` for a given `ExchangeId` +
/// credentials. Implemented once per process against whatever exchange SDK
/// backs it; injected into `ExchangeAdapter` so the session cache stays
/// independent of how handles are actually constructed.
#[async_trait]
pub trait ExchangeClientFactory: Send + Sync {
    async fn build(
        &self,
        exchange_id: &ExchangeId,
        credentials: &ExchangeCredentials,
    ) -> Result<Arc<dyn ExchangeClient>, AdapterError>;
}
